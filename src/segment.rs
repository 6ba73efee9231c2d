use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use tempfile::NamedTempFile;

use crate::{Message, MessageSender};

/// Identifier of a document, equal to its insertion ordinal.
pub type WebId = u64;

/// Positions of one term per document, keyed by the document id. The map is
/// ordered so serialization is deterministic.
pub type Postings = BTreeMap<WebId, Vec<u64>>;

/// The on-disk half of the index. Every term lives in exactly one segment
/// file, picked by hashing the term, and inside a segment the records are
/// kept sorted so new entries can be merged in with a single pass.
///
/// A segment is a line-oriented text file. Each line is a record, and each
/// record starts with the term, followed by a colon and a list of entries.
/// Every entry is surrounded by brackets and holds one web id plus the
/// positions where the term appears in that website:
///
/// ```text
///     hello:[1|28][13|2,34,5843]
/// ```
pub struct Segments {
    directory: PathBuf,
    num_segments: u64,
    entries_regex: Regex,
    sender: MessageSender,
}

impl Segments {
    pub fn new(directory: &Path, num_segments: u64, sender: MessageSender) -> anyhow::Result<Self> {
        anyhow::ensure!(num_segments > 0, "num_segments must be at least 1");

        Ok(Self {
            directory: directory.to_path_buf(),
            num_segments,
            entries_regex: Regex::new(r"\[([0-9]+)\|([0-9,]+)\]")
                .context("compile entries pattern")?,
            sender,
        })
    }

    pub fn num_segments(&self) -> u64 {
        self.num_segments
    }

    /// The segment a term belongs to: the md5 digest of the term, read as a
    /// big-endian integer, modulo the segment count.
    pub fn route(&self, term: &str) -> u64 {
        let digest = md5::compute(term.as_bytes());
        (u128::from_be_bytes(digest.0) % u128::from(self.num_segments)) as u64
    }

    pub fn path_for(&self, segment_id: u64) -> PathBuf {
        self.directory.join(format!("{segment_id}.index"))
    }

    /// Splits a record line into its term and the raw entries text. Fails on
    /// a line without a colon.
    pub fn parse_record(line: &str) -> anyhow::Result<(&str, &str)> {
        line.trim_end()
            .split_once(':')
            .context("record without a ':' separator")
    }

    fn make_record(term: &str, entries: &str) -> String {
        format!("{term}:{entries}\n")
    }

    /// Parses the entries text of one record. Bytes outside the bracketed
    /// groups are ignored, as are groups whose numbers do not fit.
    pub fn parse_entries(&self, entries: &str) -> Postings {
        let mut result = Postings::new();

        for caps in self.entries_regex.captures_iter(entries) {
            let Ok(web_id) = caps[1].parse::<WebId>() else {
                continue;
            };
            let positions = caps[2]
                .split(',')
                .filter_map(|p| p.parse::<u64>().ok())
                .collect();
            result.insert(web_id, positions);
        }

        result
    }

    /// Renders postings as concatenated `[web_id|p1,p2,...]` groups, in
    /// ascending web id order.
    pub fn serialize_entries(postings: &Postings) -> String {
        let mut entries = String::new();

        for (web_id, positions) in postings {
            let positions = positions
                .iter()
                .map(u64::to_string)
                .collect::<Vec<String>>()
                .join(",");
            entries.push_str(&format!("[{web_id}|{positions}]"));
        }

        entries
    }

    /// Scans the segment a term routes to and returns its postings. A term
    /// that is not on disk yields an empty map. A malformed record is treated
    /// as if the term were absent from the segment.
    pub fn load_term(&self, term: &str) -> anyhow::Result<Postings> {
        let path = self.path_for(self.route(term));

        let file = match File::open(&path) {
            Ok(file) => file,
            // The segment has not been written yet
            Err(_) => return Ok(Postings::new()),
        };

        for line in BufReader::new(file).lines() {
            let line = line.context("read segment line")?;
            let (word, entries) = match Self::parse_record(&line) {
                Ok(parts) => parts,
                Err(_) => {
                    let _ = self.sender.lock().unwrap().send(Message::Warning(format!(
                        "skipping malformed record in {}",
                        path.display()
                    )));
                    continue;
                }
            };

            if word == term {
                return Ok(self.parse_entries(entries));
            }
        }

        Ok(Postings::new())
    }

    /// Merges a batch of `(term, entries)` pairs into one segment, keeping
    /// the records sorted by term. When a term already has a record its new
    /// entries are appended to the existing ones, which is valid because
    /// every entry group is self-delimited.
    ///
    /// The merged segment is written to a temporary file in the index
    /// directory and renamed over the old one, so a crash either leaves the
    /// previous segment intact or the new one complete.
    pub fn merge(&self, segment_id: u64, mut new_entries: Vec<(String, String)>) -> anyhow::Result<()> {
        new_entries.sort_by(|a, b| a.0.cmp(&b.0));

        let path = self.path_for(segment_id);
        let tmp = NamedTempFile::new_in(&self.directory).context("create segment temp file")?;
        let mut writer = BufWriter::new(tmp);
        let mut pending = new_entries.into_iter().peekable();

        if path.exists() {
            let old_segment = File::open(&path).context("open old segment")?;
            for line in BufReader::new(old_segment).lines() {
                let line = line.context("read old segment line")?;
                let (old_term, old_entries) = match Self::parse_record(&line) {
                    Ok(parts) => parts,
                    Err(_) => {
                        let _ = self.sender.lock().unwrap().send(Message::Warning(format!(
                            "dropping malformed record in {}",
                            path.display()
                        )));
                        continue;
                    }
                };

                // New terms that sort before the old record go first
                while let Some((term, entries)) =
                    pending.next_if(|(term, _)| term.as_str() < old_term)
                {
                    writer
                        .write_all(Self::make_record(&term, &entries).as_bytes())
                        .context("write new record")?;
                }

                if let Some((_, entries)) = pending.next_if(|(term, _)| term.as_str() == old_term) {
                    let combined = format!("{old_entries}{entries}");
                    writer
                        .write_all(Self::make_record(old_term, &combined).as_bytes())
                        .context("write merged record")?;
                } else {
                    writer
                        .write_all(Self::make_record(old_term, old_entries).as_bytes())
                        .context("write old record")?;
                }
            }
        }

        for (term, entries) in pending {
            writer
                .write_all(Self::make_record(&term, &entries).as_bytes())
                .context("write remaining record")?;
        }

        let tmp = writer
            .into_inner()
            .map_err(|err| err.into_error())
            .context("flush segment writer")?;
        tmp.persist(&path)
            .map_err(|err| err.error)
            .context("replace segment")?;

        Ok(())
    }
}
