use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use tinysearch::crawler::{self, DEFAULT_CONCURRENCY};
use tinysearch::fetcher::HttpFetcher;
use tinysearch::index::Index;
use tinysearch::server::run_server;
use tinysearch::{
    ErrorStream, Message, format_time, handle_messages, message_channel, search_query,
};

#[derive(Parser, Debug)]
#[command(
    name = "tinysearch",
    about = "A tiny search engine for the web",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Redirect log output to a file
    #[arg(short = 'l', long = "log")]
    log_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Crawl the web and build an index
    Crawl {
        #[arg(
            long = "limit",
            default_value_t = 10,
            help = "Limit of number of websites to be crawled"
        )]
        limit: usize,
        #[arg(
            short = 'o',
            long = "output",
            default_value = "data/",
            help = "Directory in which to store the index"
        )]
        output: PathBuf,
        #[arg(long = "development", help = "Pretty-print the json sidecars")]
        development: bool,
        #[arg(required = true, help = "List of websites to start crawling with")]
        seed: Vec<String>,
    },
    /// Query an index
    Search {
        #[arg(short = 'i', long = "index", default_value = "data/")]
        index_dir: PathBuf,
        #[arg(help = "Query to search")]
        query: String,
        #[arg(short = 'c', long = "count", help = "Number of results")]
        result_count: Option<usize>,
    },
    /// Serve the search engine via http
    Serve {
        #[arg(short = 'i', long = "index", default_value = "data/")]
        index_dir: PathBuf,
        #[arg(short = 'p', long = "port", default_value_t = 8765)]
        port: u16,
    },
}

/// Prints the text padded with `-` characters into a section header.
fn print_header(text: &str) {
    let mut line = String::from("\n");
    line.push_str(&"-".repeat(40usize.saturating_sub(text.chars().count() / 2)));
    line.push_str(text);
    let width = line.chars().count();
    line.push_str(&"-".repeat(80usize.saturating_sub(width)));
    println!("{line}");
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let stream = match args.log_file {
        Some(file) => ErrorStream::File(file),
        None => ErrorStream::Stderr,
    };
    let (sender, receiver) = message_channel();
    thread::spawn(move || {
        loop {
            let _ = handle_messages(&receiver, &stream);
        }
    });

    match args.command {
        Commands::Crawl {
            limit,
            output,
            development,
            seed,
        } => {
            let mut index = Index::open(&output, Some((limit * 10) as u64), true, sender.clone())
                .context("create index")?;
            index.development = development;
            let fetcher = HttpFetcher::new()?;

            print_header("Configuration");
            println!("- Downloading {limit} websites");
            println!("- Website seed: {seed:?}");
            println!("- Output directory: {}", output.display());

            print_header("Downloading");
            let start = Instant::now();
            let stats = crawler::crawl(
                &mut index,
                &fetcher,
                seed,
                limit,
                DEFAULT_CONCURRENCY,
                &sender,
            )?;

            if stats.indexed == 0 {
                let _ = sender.lock().unwrap().send(Message::Warning(
                    "no websites could be indexed, nothing to save".to_string(),
                ));
                return Ok(());
            }
            index.save().context("save index")?;
            let duration = start.elapsed().as_nanos();

            print_header("Statistics");
            println!("- Indexed websites: {}", stats.indexed);
            println!("- Indexed words: {}", index.word_count);
            println!("- Duration: {}", format_time(duration));
            println!(
                "- Avg duration/website: {}",
                format_time(duration / stats.indexed as u128)
            );
            println!("- Websites in queue: {}", stats.queued);
            println!("- Saved in: {}", output.display());
        }
        Commands::Search {
            index_dir,
            query,
            result_count,
        } => {
            let mut results = search_query(&query, &index_dir, sender.clone())?;

            if results.is_empty() {
                println!("No results");
                return Ok(());
            }
            if let Some(count) = result_count {
                results.truncate(count);
            }
            for website in results {
                println!("{} - {}", website.name, website.url);
            }
        }
        Commands::Serve { index_dir, port } => {
            run_server(&index_dir, port, sender.clone())?;
        }
    }

    Ok(())
}
