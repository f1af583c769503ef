use analysis_store::{AnalysisCache, SqliteStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use classifier_client::{
    CredentialPrompt, CredentialSource, GroqClassifier, NoPrompt, ReqwestTransport,
};
use dialoguer::Password;
use feed_extractor::{FeedPage, HtmlFeedPage};
use feedguard_core::{ConfigError, CoreError, FilterConfig};
use scan_service::{AuditLog, Debouncer, FilterPipeline, ScanReport, VisibilityPolicy};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "feedguard=info,scan_service=info,classifier_client=info";

/// Feedguard - hides feed posts an LLM scores above per-topic thresholds.
#[derive(Parser, Debug)]
#[command(name = "feedguard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(long, global = true, default_value = "feedguard.toml")]
    config: PathBuf,

    /// Overrides `storage.database_url`
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter a saved feed page once
    Scan(PageArgs),

    /// Filter a saved feed page, rescanning after each burst of stdin lines
    Watch(PageArgs),

    /// Remove every cached analysis, keeping the stored API key
    ResetCache,

    /// Print the effective configuration
    ShowConfig,
}

#[derive(clap::Args, Debug)]
struct PageArgs {
    /// Rendered feed HTML
    page: PathBuf,

    /// Where to write the page with hidden posts removed
    #[arg(long)]
    out: Option<PathBuf>,

    /// URL the page was served from; defaults to `page.base_url`
    #[arg(long)]
    url: Option<String>,
}

/// Asks on the terminal; an empty answer declines.
struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn ask(&self, provider: &str) -> Option<String> {
        let answer = Password::new()
            .with_prompt(format!("Please enter your {} API key", provider))
            .allow_empty_password(true)
            .interact()
            .ok()?;
        let answer = answer.trim().to_string();
        (!answer.is_empty()).then_some(answer)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(database) = cli.database {
        config.storage.database_url = database;
    }

    match cli.command {
        Command::Scan(args) => filter_page(&config, args, false).await,
        Command::Watch(args) => filter_page(&config, args, true).await,
        Command::ResetCache => {
            let store = SqliteStore::open(config.storage.database_url.clone()).await?;
            let removed = store.clear().await?;
            println!("Removed {} cached analyses", removed);
            Ok(())
        }
        Command::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<FilterConfig> {
    match FilterConfig::load(path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(CoreError::Config(ConfigError::FileNotFound { .. })) => {
            info!("No configuration at {}, using defaults", path.display());
            Ok(FilterConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("invalid configuration in {}", path.display())),
    }
}

async fn filter_page(config: &FilterConfig, args: PageArgs, watch: bool) -> Result<()> {
    let mut page = HtmlFeedPage::from_file(&args.page, &config.page)
        .with_context(|| format!("could not load {}", args.page.display()))?;
    if let Some(url) = &args.url {
        page = page.with_base_url(url)?;
    }
    if !page.matches_host() {
        warn!(
            "Page is not served from {}, nothing to filter",
            config.page.host
        );
        return Ok(());
    }
    let page = Arc::new(page);

    let store = SqliteStore::open(config.storage.database_url.clone()).await?;
    // In watch mode stdin carries scroll signals, so nobody can be asked.
    let prompt: Arc<dyn CredentialPrompt> = if !watch && std::io::stdin().is_terminal() {
        Arc::new(TerminalPrompt)
    } else {
        Arc::new(NoPrompt)
    };
    let credentials = CredentialSource::new(
        "Groq",
        Arc::new(store.credential(config.classifier.credential_key.clone())),
        prompt,
    )
    .with_env_var(config.classifier.api_key_env.clone());

    let topics = config.topic_specs();
    let classifier = GroqClassifier::new(
        topics.clone(),
        config.classifier.clone(),
        Arc::new(ReqwestTransport::new(&config.classifier)?),
        credentials,
    );
    let pipeline = Arc::new(FilterPipeline::new(
        Arc::new(store),
        Arc::new(classifier),
        VisibilityPolicy::new(topics),
        Arc::new(AuditLog::new(&config.page, config.scan.snippet_chars)),
    ));

    let feed: Arc<dyn FeedPage> = page.clone();
    let reports = if watch {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        let refresh = {
            let page = page.clone();
            let path = args.page.clone();
            move || match std::fs::read_to_string(&path) {
                Ok(source) => page.replace(source),
                Err(e) => warn!("Could not reload {}: {}", path.display(), e),
            }
        };

        pipeline
            .clone()
            .run(
                feed,
                rx,
                Debouncer::new(Duration::from_millis(config.scan.debounce_ms)),
                refresh,
            )
            .await
    } else {
        vec![pipeline.scan(feed).await]
    };

    summarize(&reports);
    let audit = pipeline.audit().render();
    if !audit.is_empty() {
        println!("{}", audit);
    }

    if let Some(out) = &args.out {
        std::fs::write(out, page.render())
            .with_context(|| format!("could not write {}", out.display()))?;
        info!("Filtered page written to {}", out.display());
    }
    Ok(())
}

fn summarize(reports: &[ScanReport]) {
    let posts: usize = reports.iter().map(|r| r.posts).sum();
    let hidden: usize = reports.iter().map(|r| r.hidden).sum();
    let aborted: usize = reports.iter().map(|r| r.aborted).sum();
    info!(
        "{} scan(s), {} posts seen, {} hidden",
        reports.len(),
        posts,
        hidden
    );
    if aborted > 0 {
        warn!(
            "{} posts were not analysed because no API key was available",
            aborted
        );
    }
}
