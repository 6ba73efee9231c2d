use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::lexer;
use crate::segment::{Postings, Segments, WebId};
use crate::{Message, MessageSender};

/// Number of buffered tokens that triggers a flush to disk.
const FLUSH_THRESHOLD: u64 = 1_000_000;

/// BM25 tuning variables.
const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Everything we remember about one indexed page. The url is the final one
/// after redirects, and `word_count` is the number of tokens the page text
/// produced.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Website {
    pub url: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub word_count: u64,
}

/// The sidecar holding everything the ranker needs besides the postings.
#[derive(Serialize, Deserialize)]
struct IndexConfig {
    avg_length: f64,
    word_count: u64,
    num_segments: u64,
}

/// The index maps every term to the documents it appears in and the positions
/// it appears at. Websites live in a sequential array, and a website's index
/// in that array is its `web_id`.
///
/// The full postings mapping is never held in memory. Fresh postings collect
/// in `words` and are flushed into the on-disk segments once enough tokens
/// have accumulated, so a query never reads the buffer, it loads the segments
/// of its terms instead.
pub struct Index {
    websites_file: PathBuf,
    config_file: PathBuf,
    pub websites: Vec<Website>,
    words: HashMap<String, Postings>,
    unsaved_words: u64,
    pub word_count: u64,
    avg_length: f64,
    segments: Segments,
    /// Buffered token count that forces a flush. Tests lower this to exercise
    /// threshold flushes without a million tokens.
    pub flush_threshold: u64,
    /// Pretty-print the json sidecars.
    pub development: bool,
    sender: MessageSender,
}

impl Index {
    /// Creates or opens an index directory.
    ///
    /// A directory that does not exist yet is provisioned empty and requires
    /// `num_segments`. An existing directory is loaded from its sidecars and
    /// keeps the segment count it was created with; the segment files
    /// themselves are only read on demand. `delete_existing` wipes the
    /// directory first.
    pub fn open(
        directory: &Path,
        num_segments: Option<u64>,
        delete_existing: bool,
        sender: MessageSender,
    ) -> anyhow::Result<Self> {
        let websites_file = directory.join("websites.json");
        let config_file = directory.join("config.json");

        if delete_existing && directory.exists() {
            let _ = sender
                .lock()
                .unwrap()
                .send(Message::Info("deleting existing index".to_string()));
            fs::remove_dir_all(directory).context("delete existing index")?;
        }

        let (websites, avg_length, word_count, num_segments) = if !directory.exists() {
            fs::create_dir_all(directory).context("create index directory")?;
            let num_segments =
                num_segments.context("num_segments is required for a new index")?;
            (Vec::new(), 0.0, 0, num_segments)
        } else {
            let file = File::open(&websites_file).context("open websites.json")?;
            let websites: Vec<Website> =
                serde_json::from_reader(BufReader::new(file)).context("parse websites.json")?;

            let file = File::open(&config_file).context("open config.json")?;
            let config: IndexConfig =
                serde_json::from_reader(BufReader::new(file)).context("parse config.json")?;

            (
                websites,
                config.avg_length,
                config.word_count,
                config.num_segments,
            )
        };

        Ok(Self {
            websites_file,
            config_file,
            websites,
            words: HashMap::new(),
            unsaved_words: 0,
            word_count,
            avg_length,
            segments: Segments::new(directory, num_segments, sender.clone())?,
            flush_threshold: FLUSH_THRESHOLD,
            development: false,
            sender,
        })
    }

    /// Add a website to the index.
    ///
    /// The website gets the next sequential `web_id` and its text is
    /// tokenized into the postings buffer. Crossing the flush threshold
    /// writes the buffer out, so some calls are much slower than others; to
    /// force a disk write call [`Index::save`].
    pub fn add_website(&mut self, mut website: Website, text: &str) -> anyhow::Result<()> {
        let web_id = self.websites.len() as WebId;
        let tokens = lexer::tokenize(text);
        website.word_count = tokens.len() as u64;

        self.websites.push(website);
        self.unsaved_words += tokens.len() as u64;
        self.word_count += tokens.len() as u64;

        for (position, token) in tokens.into_iter().enumerate() {
            self.words
                .entry(token)
                .or_default()
                .entry(web_id)
                .or_default()
                .push(position as u64);
        }

        if self.unsaved_words >= self.flush_threshold {
            let _ = self.sender.lock().unwrap().send(Message::Info(
                "flushing partial index to disk".to_string(),
            ));
            self.flush()?;
        }

        Ok(())
    }

    /// Drains the postings buffer into the segment files.
    ///
    /// Entries are grouped by the segment their term routes to and the
    /// per-segment merges run in parallel; no two of them ever touch the
    /// same file. The buffer is only cleared once every merge succeeded.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        let mut batches: HashMap<u64, Vec<(String, String)>> = HashMap::new();

        for (term, postings) in &self.words {
            let segment_id = self.segments.route(term);
            let entries = Segments::serialize_entries(postings);
            batches
                .entry(segment_id)
                .or_default()
                .push((term.clone(), entries));
        }

        let segments = &self.segments;
        batches
            .into_par_iter()
            .try_for_each(|(segment_id, entries)| segments.merge(segment_id, entries))?;

        self.words.clear();
        self.unsaved_words = 0;
        Ok(())
    }

    /// Flushes the buffer and rewrites the sidecars. This is the commit
    /// point: postings that were only buffered are on disk afterwards.
    pub fn save(&mut self) -> anyhow::Result<()> {
        if self.websites.is_empty() {
            bail!("refusing to save an index without websites");
        }

        self.flush()?;

        let file = File::create(&self.websites_file).context("create websites.json")?;
        let writer = BufWriter::new(file);
        if self.development {
            serde_json::to_writer_pretty(writer, &self.websites)
        } else {
            serde_json::to_writer(writer, &self.websites)
        }
        .context("write websites.json")?;

        self.avg_length = self.websites.iter().map(|w| w.word_count).sum::<u64>() as f64
            / self.websites.len() as f64;
        let config = IndexConfig {
            avg_length: self.avg_length,
            word_count: self.word_count,
            num_segments: self.segments.num_segments(),
        };

        let file = File::create(&self.config_file).context("create config.json")?;
        let writer = BufWriter::new(file);
        if self.development {
            serde_json::to_writer_pretty(writer, &config)
        } else {
            serde_json::to_writer(writer, &config)
        }
        .context("write config.json")?;

        Ok(())
    }

    /// Find results for a query.
    ///
    /// Every distinct query term is loaded from its segment, the candidate
    /// set is the union of all documents that contain at least one term, and
    /// BM25 puts the best matches on top.
    pub fn find(&self, query: &str) -> anyhow::Result<Vec<Website>> {
        let tokens = lexer::tokenize(query);

        let mut terms = Vec::new();
        let mut dedup = HashSet::new();
        for token in &tokens {
            if dedup.insert(token.as_str()) {
                terms.push(token.clone());
            }
        }

        let segments = &self.segments;
        let loaded: Vec<(String, Postings)> = terms
            .into_par_iter()
            .map(|term| {
                let postings = segments.load_term(&term)?;
                Ok((term, postings))
            })
            .collect::<anyhow::Result<Vec<(String, Postings)>>>()?;

        let mut ids: Vec<WebId> = loaded
            .iter()
            .flat_map(|(_, postings)| postings.keys().copied())
            .collect::<HashSet<WebId>>()
            .into_iter()
            .collect();
        ids.sort_unstable();
        // A stale segment may reference documents the sidecar no longer has
        ids.retain(|id| (*id as usize) < self.websites.len());

        let index: HashMap<String, Postings> = loaded.into_iter().collect();
        let ranked = self.rank_bm25(&index, &ids, &tokens);

        Ok(ranked
            .into_iter()
            .map(|id| self.websites[id as usize].clone())
            .collect())
    }

    /// Okapi BM25. Scores how well each candidate document matches the query
    /// and returns the ids best-first. Ties go to the lower web id so results
    /// are deterministic. Documents are assumed to be of equal quality, which
    /// of course is not the case on the web.
    ///
    /// Wikipedia: <https://en.wikipedia.org/wiki/Okapi_BM25>
    fn rank_bm25(
        &self,
        index: &HashMap<String, Postings>,
        ids: &[WebId],
        query: &[String],
    ) -> Vec<WebId> {
        let mut ranked: Vec<(WebId, f64)> = Vec::with_capacity(ids.len());

        let total_docs = self.websites.len() as f64;
        let avgdl = self.avg_length;

        for &id in ids {
            let mut score = 0.0;
            let doc_len = self.websites[id as usize].word_count as f64;

            for qi in query {
                // Term frequency of qi in the document, and the number of
                // documents containing qi at all
                let (f, n) = match index.get(qi) {
                    Some(postings) => (
                        postings.get(&id).map_or(0, Vec::len) as f64,
                        postings.len() as f64,
                    ),
                    None => (0.0, 0.0),
                };

                let idf = ((total_docs - n + 0.51) / (n + 0.5) + 1.0).ln();
                score += idf * (f * (K1 + 1.0)) / (f + K1 * (1.0 - B + B * (doc_len / avgdl)));
            }

            ranked.push((id, score));
        }

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.into_iter().map(|(id, _)| id).collect()
    }
}
