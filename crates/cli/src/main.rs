mod config;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context as _,
    clap::{Parser, Subcommand},
    folio_context::{
        ContextEngine,
        embeddings_openai::{DEFAULT_DIMENSIONS, OpenAiEmbeddingProvider},
        schedule::Scheduler,
        store_sqlite::SqliteContextStore,
    },
    folio_sources::{FileResumeSource, GitHubRepositorySource, SqliteRecordSource},
    secrecy::Secret,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::EnvFilter,
};

use crate::config::FolioConfig;

#[derive(Parser)]
#[command(name = "folio", version, about = "Ranked context retrieval over a personal knowledge base")]
struct Cli {
    /// Path to folio.toml (defaults to the platform config directory).
    #[arg(long, global = true, env = "FOLIO_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh stale snapshots from their sources.
    Refresh {
        /// Refresh every category even if it was refreshed today.
        #[arg(long)]
        force: bool,
    },
    /// Rebuild the memory index if its month rolled over.
    Rebuild {
        /// Rebuild even if the index is current.
        #[arg(long)]
        force: bool,
    },
    /// Print the ranked context block for a question.
    Retrieve {
        query: String,
        /// Print the full model prompt instead of the bare context block.
        #[arg(long)]
        prompt: bool,
        /// Conversation memory prepended to the prompt.
        #[arg(long, requires = "prompt")]
        memory: Option<String>,
    },
    /// Print numbered references for a question.
    Cite {
        query: String,
        /// Print the full model prompt instead of the references.
        #[arg(long)]
        prompt: bool,
    },
    /// Show snapshot and index state as JSON.
    Status,
    /// Append a JSON array of documents to a record collection.
    Import { collection: String, file: PathBuf },
    /// Initialise, then run scheduled maintenance until interrupted.
    Run,
}

impl Command {
    fn needs_embeddings(&self) -> bool {
        matches!(
            self,
            Self::Rebuild { .. } | Self::Retrieve { .. } | Self::Cite { .. } | Self::Run
        )
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

struct App {
    engine: Arc<ContextEngine>,
    records: Arc<SqliteRecordSource>,
}

async fn build_app(config: FolioConfig, needs_embeddings: bool) -> anyhow::Result<App> {
    let database_url = config.database_url()?;
    let resume_path = config.resume_path();
    let store = SqliteContextStore::connect(&database_url)
        .await
        .with_context(|| format!("opening {database_url}"))?;

    let records = Arc::new(SqliteRecordSource::new(store.pool().clone()));
    records
        .ensure_schema()
        .await
        .context("preparing records table")?;

    let api_key = match config.openai.api_key {
        Some(key) => key,
        None if needs_embeddings => anyhow::bail!("OPENAI_API_KEY is not set"),
        None => Secret::new(String::new()),
    };
    let mut embedder = OpenAiEmbeddingProvider::new(api_key);
    if let Some(url) = config.openai.base_url {
        embedder = embedder.with_base_url(url);
    }
    if let Some(model) = config.openai.model {
        let dims = config.openai.dimensions.unwrap_or(DEFAULT_DIMENSIONS);
        embedder = embedder.with_model(model, dims);
    }

    let token = config.github.token.unwrap_or_else(|| {
        warn!("GITHUB_TOKEN is not set, repository refreshes will fail");
        Secret::new(String::new())
    });
    let mut repositories = GitHubRepositorySource::new(token);
    if let Some(url) = config.github.api_url {
        repositories = repositories.with_api_url(url);
    }

    let engine = ContextEngine::new(
        config.context,
        Arc::new(store),
        Arc::new(embedder),
        records.clone(),
        Arc::new(repositories),
        Arc::new(FileResumeSource::new(resume_path)),
    );
    Ok(App {
        engine: Arc::new(engine),
        records,
    })
}

async fn run_scheduler(engine: Arc<ContextEngine>) -> anyhow::Result<()> {
    let report = engine.init().await.context("initial index build")?;
    info!(outcome = ?report.outcome, items = report.items, "index ready");

    let scheduler = Scheduler::from_cadence(engine.clone(), &engine.config().cadence)?;
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(cancel.clone()));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    cancel.cancel();
    handle.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let (mut config, source) = FolioConfig::load(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok());
    match &source {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => info!("no config file, using defaults"),
    }

    let app = build_app(config, cli.command.needs_embeddings()).await?;
    let engine = app.engine;

    match cli.command {
        Command::Refresh { force } => {
            let report = engine.refresh_all(force).await;
            for category in &report.refreshed {
                println!("{category}: refreshed");
            }
            for category in &report.fresh {
                println!("{category}: fresh");
            }
            for (category, error) in &report.failed {
                println!("{category}: failed: {error}");
            }
            if !report.is_clean() {
                anyhow::bail!("{} categories failed to refresh", report.failed.len());
            }
        },
        Command::Rebuild { force } => {
            let report = engine.rebuild_index(force).await?;
            println!(
                "{:?}: {} items ({} skipped)",
                report.outcome, report.items, report.skipped
            );
        },
        Command::Retrieve {
            query,
            prompt,
            memory,
        } => {
            if prompt {
                println!("{}", engine.prompt(&query, memory.as_deref()).await?);
            } else {
                println!("{}", engine.retrieve(&query).await?.context);
            }
        },
        Command::Cite { query, prompt } => {
            let citations = engine.cite(&query).await?;
            if prompt {
                println!("{}", citations.prompt(query.trim()));
            } else {
                println!("{}", citations.context);
            }
        },
        Command::Status => {
            let status = engine.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        },
        Command::Import { collection, file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let docs: Vec<serde_json::Value> = serde_json::from_str(&raw)
                .with_context(|| format!("{} must hold a JSON array", file.display()))?;
            let count = app.records.insert_many(&collection, &docs).await?;
            println!("imported {count} documents into {collection}");
        },
        Command::Run => run_scheduler(engine).await?,
    }
    Ok(())
}
