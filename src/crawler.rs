use std::collections::{HashSet, VecDeque};
use std::sync::mpsc;

use anyhow::Context;
use indicatif::ProgressBar;
use scraper::Html;

use crate::fetcher::Fetch;
use crate::index::Index;
use crate::{Message, MessageSender, extract};

/// Fixed number of in-flight fetches.
pub const DEFAULT_CONCURRENCY: usize = 64;

/// What the crawl left behind, for the statistics report.
pub struct CrawlStats {
    pub indexed: usize,
    pub queued: usize,
}

/// Breadth-first crawl starting from `seed`, indexing pages until `limit`
/// websites are stored or the frontier runs dry.
///
/// The frontier is a fifo queue. Each round takes a batch off the front,
/// fans the fetches out over a fixed pool of `concurrency` workers and
/// consumes the results in completion order, so the insertion order of
/// documents within a batch is not deterministic. Only this coordinating
/// thread touches the index, the queue and the bookkeeping sets; the workers
/// do nothing but fetch.
///
/// Two sets keep the crawl from going in circles. `seen` holds every url
/// that was ever enqueued so a page is never downloaded twice, `explored`
/// additionally holds the post-redirect url of every processed page so two
/// requests redirecting to the same target index it only once. A failed
/// fetch is logged and dropped, never requeued.
pub fn crawl<F: Fetch>(
    index: &mut Index,
    fetcher: &F,
    seed: Vec<String>,
    limit: usize,
    concurrency: usize,
    sender: &MessageSender,
) -> anyhow::Result<CrawlStats> {
    let mut queue: VecDeque<String> = seed.into();
    let mut seen: HashSet<String> = queue.iter().cloned().collect();
    let mut explored: HashSet<String> = HashSet::new();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .context("build fetch pool")?;
    let bar = ProgressBar::new(limit as u64);

    while index.websites.len() < limit && !queue.is_empty() {
        let batch_size = (limit - index.websites.len())
            .min(concurrency.max(1))
            .min(queue.len());
        let batch: Vec<String> = queue.drain(..batch_size).collect();

        let (results_tx, results_rx) = mpsc::channel();

        pool.in_place_scope(|scope| -> anyhow::Result<()> {
            for url in batch {
                let results_tx = results_tx.clone();
                scope.spawn(move |_| {
                    let result = fetcher.fetch(&url);
                    let _ = results_tx.send((url, result));
                });
            }
            // Receiving stops once the last worker hangs up
            drop(results_tx);

            for (url, result) in results_rx {
                let (final_url, body) = match result {
                    Ok(page) => page,
                    Err(err) => {
                        let _ = sender
                            .lock()
                            .unwrap()
                            .send(Message::Warning(format!("{url}: {err:#}")));
                        continue;
                    }
                };

                if explored.contains(&final_url) {
                    // The url redirected to a page we already explored
                    continue;
                }

                let document = Html::parse_document(&body);
                let website = extract::extract_metadata(&final_url, &document);
                let text = extract::extract_text(&document);
                index.add_website(website, &text)?;

                // Queue the discovered links, but never one we already know
                let links: Vec<String> = extract::extract_links(&final_url, &document)
                    .into_iter()
                    .filter(|link| !seen.contains(link))
                    .collect();
                seen.insert(final_url.clone());
                seen.extend(links.iter().cloned());
                queue.extend(links);
                explored.insert(url);
                explored.insert(final_url.clone());

                bar.inc(1);
                let _ = sender.lock().unwrap().send(Message::Info(format!(
                    "[{}/{}] downloaded {}",
                    index.websites.len(),
                    limit,
                    final_url
                )));
            }

            Ok(())
        })?;
    }

    bar.finish_and_clear();
    Ok(CrawlStats {
        indexed: index.websites.len(),
        queued: queue.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use anyhow::bail;
    use tempfile::TempDir;

    /// Serves canned pages, optionally under a different final url.
    struct StubFetcher {
        pages: HashMap<String, (String, String)>,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
            }
        }

        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (url.to_string(), body.to_string()));
            self
        }

        fn redirect(mut self, url: &str, final_url: &str, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (final_url.to_string(), body.to_string()));
            self
        }
    }

    impl Fetch for StubFetcher {
        fn fetch(&self, url: &str) -> anyhow::Result<(String, String)> {
            match self.pages.get(url) {
                Some((final_url, body)) => Ok((final_url.clone(), body.clone())),
                None => bail!("connection refused"),
            }
        }
    }

    fn page_with_links(title: &str, links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|link| format!("<a href=\"{link}\">{link}</a>"))
            .collect();
        format!("<html><head><title>{title}</title></head><body><p>{title} text</p>{anchors}</body></html>")
    }

    fn empty_index(dir: &TempDir) -> Index {
        let (sender, _receiver) = crate::message_channel();
        Index::open(&dir.path().join("index"), Some(4), false, sender).unwrap()
    }

    fn run<F: Fetch>(index: &mut Index, fetcher: &F, seed: &[&str], limit: usize) -> CrawlStats {
        let (sender, _receiver) = crate::message_channel();
        crawl(
            index,
            fetcher,
            seed.iter().map(|s| s.to_string()).collect(),
            limit,
            4,
            &sender,
        )
        .unwrap()
    }

    #[test]
    fn redirect_convergence_indexes_once() {
        let target = "https://example.com/home";
        let fetcher = StubFetcher::new()
            .redirect("https://example.com/u1", target, &page_with_links("Home", &[]))
            .redirect("https://example.com/u2", target, &page_with_links("Home", &[]));

        let dir = TempDir::new().unwrap();
        let mut index = empty_index(&dir);
        let stats = run(
            &mut index,
            &fetcher,
            &["https://example.com/u1", "https://example.com/u2"],
            2,
        );

        assert_eq!(stats.indexed, 1);
        assert_eq!(index.websites.len(), 1);
        assert_eq!(index.websites[0].url, target);
    }

    #[test]
    fn follows_links_and_stops_at_the_limit() {
        let fetcher = StubFetcher::new()
            .page(
                "https://example.com/",
                &page_with_links("Root", &["/a", "/b", "/c"]),
            )
            .page("https://example.com/a", &page_with_links("A", &[]))
            .page("https://example.com/b", &page_with_links("B", &[]))
            .page("https://example.com/c", &page_with_links("C", &[]));

        let dir = TempDir::new().unwrap();
        let mut index = empty_index(&dir);
        let stats = run(&mut index, &fetcher, &["https://example.com/"], 3);

        assert_eq!(stats.indexed, 3);
        assert!(index.websites.len() <= 3);
        // One discovered link never got fetched
        assert_eq!(stats.queued, 1);
    }

    #[test]
    fn terminates_when_the_frontier_runs_dry() {
        let fetcher = StubFetcher::new().page(
            "https://example.com/",
            &page_with_links("Lonely", &[]),
        );

        let dir = TempDir::new().unwrap();
        let mut index = empty_index(&dir);
        let stats = run(&mut index, &fetcher, &["https://example.com/"], 10);

        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn failed_fetches_are_skipped_not_requeued() {
        let fetcher = StubFetcher::new()
            .page(
                "https://example.com/",
                &page_with_links("Root", &["/broken", "/ok"]),
            )
            .page("https://example.com/ok", &page_with_links("Ok", &[]));

        let dir = TempDir::new().unwrap();
        let mut index = empty_index(&dir);
        let stats = run(&mut index, &fetcher, &["https://example.com/"], 10);

        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn pages_linking_to_each_other_index_once() {
        let fetcher = StubFetcher::new()
            .page("https://example.com/a", &page_with_links("A", &["/b"]))
            .page("https://example.com/b", &page_with_links("B", &["/a"]));

        let dir = TempDir::new().unwrap();
        let mut index = empty_index(&dir);
        let stats = run(&mut index, &fetcher, &["https://example.com/a"], 10);

        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn crawled_pages_are_searchable_after_save() {
        let fetcher = StubFetcher::new().page(
            "https://example.com/",
            "<html><head><title>Ferris</title></head><body>rustaceans love crabs</body></html>",
        );

        let dir = TempDir::new().unwrap();
        let mut index = empty_index(&dir);
        run(&mut index, &fetcher, &["https://example.com/"], 1);
        index.save().unwrap();

        let results = index.find("crabs").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Ferris");
    }
}
