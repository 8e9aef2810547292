use std::sync::atomic::{AtomicU8, Ordering};
use std::{env, fs};

use anyhow::{Context, Result};
use pinsync::config::Config;
use pinsync::extract::PatternExtractor;
use pinsync::job::{JobContext, Severity};
use pinsync::reconcile::Reconciler;
use pinsync::source_client::SourceClient;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "Usage: pinsyncctl <sync | items | extract <README.md>>";

/// Prints job output to the terminal the way the job console shows it.
struct ConsoleJobContext {
    severity: AtomicU8,
    cancel: CancellationToken,
}

impl ConsoleJobContext {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            severity: AtomicU8::new(Severity::Info as u8),
            cancel,
        }
    }
}

impl JobContext for ConsoleJobContext {
    fn write_line(&self, text: &str) {
        match Severity::from_u8(self.severity.load(Ordering::Relaxed)) {
            Severity::Info | Severity::Notice => println!("{}", text),
            Severity::Warning => println!("warn: {}", text),
            Severity::Error => eprintln!("error: {}", text),
        }
    }

    fn set_severity(&self, severity: Severity) {
        self.severity.store(severity as u8, Ordering::Relaxed);
    }

    fn report_progress(&self, percent: u8) {
        println!("[{:>3}%]", percent);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("sync") if args.len() == 2 => sync().await,
        Some("items") if args.len() == 2 => items().await,
        Some("extract") if args.len() == 3 => extract(&args[2]),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

fn load_config() -> Result<Config> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: ignoring unreadable .env file: {}", e);
        }
    }
    Config::from_env().context("loading configuration from the environment")
}

async fn sync() -> Result<()> {
    let config = load_config()?;
    let source = config.github_client().context("building GitHub client")?;
    let store = config.strapi_client().context("building Strapi client")?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Received Ctrl-C, stopping after the current item...");
            on_ctrl_c.cancel();
        }
    });

    let ctx = ConsoleJobContext::new(cancel);
    let summary = Reconciler::new(&source, &store)
        .run(&ctx)
        .await
        .context("reconciliation aborted")?;

    if summary.failed > 0 {
        anyhow::bail!("{} operation(s) failed, see output above", summary.failed);
    }
    Ok(())
}

async fn items() -> Result<()> {
    let config = load_config()?;
    let source = config.github_client().context("building GitHub client")?;

    let items = source
        .list_pinned_items()
        .await
        .context("listing pinned items")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&items).context("serializing items")?
    );
    Ok(())
}

fn extract(path: &str) -> Result<()> {
    let document = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let extracted = PatternExtractor::new()
        .extract(&document)
        .with_context(|| format!("no banner block in {}", path))?;

    println!("image:       {}", extracted.image_url);
    println!("description: {}", extracted.description);
    Ok(())
}
