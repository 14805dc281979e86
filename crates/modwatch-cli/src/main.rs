mod check;
mod gather;
mod stages;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use modwatch_gather::ShutdownSignal;
use tracing_subscriber::EnvFilter;

pub(crate) const DEFAULT_PROMPT_PATH: &str = "config/prompts/detection_prompt.md";
pub(crate) const DEFAULT_SCHEMA_PATH: &str = "config/schemas/assessment_schema.json";

#[derive(Debug, Parser)]
#[command(name = "modwatch")]
#[command(about = "Community moderation research pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect posts and comments from the configured communities
    Gather {
        /// Posts to request per community
        #[arg(long, default_value_t = 200)]
        num_posts: u64,

        /// Only keep content created within this many days
        #[arg(long, default_value_t = 99_999)]
        days_back: u32,

        /// Override the communities from the targeting file (repeatable)
        #[arg(long = "community")]
        communities: Vec<String>,

        /// Score every post and comment before saving it
        #[arg(long)]
        score: bool,
    },
    /// Render every gathered post and its comment tree as one conversation
    Compose,
    /// Score composed conversations for toxicity
    Score {
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Row of the conversations table to resume from
        #[arg(long, default_value_t = 0)]
        start_row: usize,

        /// Maximum characters submitted per conversation
        #[arg(long, default_value_t = 19_000)]
        context_size: usize,
    },
    /// Rank scored conversations by their strongest attribute
    Rank {
        /// Keep only conversations whose strongest attribute is listed
        #[arg(long, value_delimiter = ',')]
        required_attributes: Option<Vec<String>>,
    },
    /// Assess ranked conversations with the generative model
    Assess {
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        #[arg(long, default_value_t = 0)]
        start_row: usize,

        #[arg(long, default_value_t = 1_000_000)]
        context_size: usize,

        /// System instruction file
        #[arg(long, default_value = DEFAULT_PROMPT_PATH)]
        prompt: PathBuf,

        /// JSON response schema file
        #[arg(long, default_value = DEFAULT_SCHEMA_PATH)]
        schema: PathBuf,
    },
    /// Run several stages in order with default options
    Run {
        #[arg(
            long,
            value_enum,
            value_delimiter = ',',
            default_values_t = [Stage::Gather, Stage::Compose, Stage::Score, Stage::Rank, Stage::Assess]
        )]
        stages: Vec<Stage>,
    },
    /// Report missing credentials and configuration files
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    Gather,
    Compose,
    Score,
    Rank,
    Assess,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = modwatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let shutdown = ShutdownSignal::new();
    tokio::spawn(forward_shutdown(shutdown.clone()));

    match cli.command {
        Some(Commands::Gather {
            num_posts,
            days_back,
            communities,
            score,
        }) => {
            let args = gather::GatherArgs {
                num_posts,
                days_back,
                communities,
                score,
            };
            gather::run_gather(&config, &args, &shutdown).await?;
        }
        Some(Commands::Compose) => stages::run_compose(&config)?,
        Some(Commands::Score {
            batch_size,
            start_row,
            context_size,
        }) => {
            let args = stages::BatchArgs {
                batch_size,
                start_row,
                context_size,
            };
            stages::run_score(&config, &args, &shutdown).await?;
        }
        Some(Commands::Rank {
            required_attributes,
        }) => stages::run_rank(&config, required_attributes.as_deref())?,
        Some(Commands::Assess {
            batch_size,
            start_row,
            context_size,
            prompt,
            schema,
        }) => {
            let args = stages::BatchArgs {
                batch_size,
                start_row,
                context_size,
            };
            stages::run_assess(&config, &args, &prompt, &schema, &shutdown).await?;
        }
        Some(Commands::Run { stages }) => run_stages(&config, &stages, &shutdown).await?,
        Some(Commands::Check) => check::run_check(&config)?,
        None => println!("modwatch: no command given, see --help"),
    }

    Ok(())
}

/// Runs `selected` in pipeline order, stopping early once shutdown is set.
async fn run_stages(
    config: &modwatch_core::AppConfig,
    selected: &[Stage],
    shutdown: &ShutdownSignal,
) -> anyhow::Result<()> {
    let order = [
        Stage::Gather,
        Stage::Compose,
        Stage::Score,
        Stage::Rank,
        Stage::Assess,
    ];
    for stage in order.into_iter().filter(|s| selected.contains(s)) {
        if shutdown.is_triggered() {
            tracing::warn!(?stage, "shutdown requested, skipping remaining stages");
            break;
        }
        tracing::info!(?stage, "starting stage");
        match stage {
            Stage::Gather => {
                gather::run_gather(config, &gather::GatherArgs::default(), shutdown).await?;
            }
            Stage::Compose => stages::run_compose(config)?,
            Stage::Score => {
                stages::run_score(config, &stages::BatchArgs::for_scoring(), shutdown).await?;
            }
            Stage::Rank => stages::run_rank(config, None)?,
            Stage::Assess => {
                stages::run_assess(
                    config,
                    &stages::BatchArgs::for_assessment(),
                    &PathBuf::from(DEFAULT_PROMPT_PATH),
                    &PathBuf::from(DEFAULT_SCHEMA_PATH),
                    shutdown,
                )
                .await?;
            }
        }
    }
    Ok(())
}

async fn forward_shutdown(shutdown: ShutdownSignal) {
    shutdown_signal().await;
    tracing::info!("interrupt received, finishing in-flight work");
    shutdown.trigger();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
