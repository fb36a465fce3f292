mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rapport::config::RapportConfig;
use rapport::memory::types::{MemoryType, MessageSender, SummaryType, TopicFilter};
use rapport::memory::metrics::MetricsPeriod;

#[derive(Parser)]
#[command(name = "rapport", version, about = "Memory and relationship engine for AI companions")]
struct Cli {
    /// Config file (defaults to ~/.rapport/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract memories and episodes from a batch of messages
    Summarize {
        partner_id: String,
        /// Message ids to summarize
        #[arg(required = true)]
        message_ids: Vec<String>,
        #[arg(long, default_value = "daily")]
        summary_type: SummaryType,
        /// Create one explicit episode with this title
        #[arg(long)]
        episode_title: Option<String>,
        #[arg(long, requires = "episode_title")]
        episode_description: Option<String>,
    },
    /// Search a partner's memories
    Search {
        partner_id: String,
        query: String,
        /// Restrict to these memory types (repeatable)
        #[arg(long = "type")]
        memory_types: Vec<MemoryType>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0.0)]
        min_importance: f64,
    },
    /// List a partner's episodes
    Episodes {
        partner_id: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_emotional_weight: Option<f64>,
        /// Match episodes sharing any of these tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// RFC 3339 lower bound, inclusive
        #[arg(long)]
        start_date: Option<String>,
        /// RFC 3339 upper bound, inclusive
        #[arg(long)]
        end_date: Option<String>,
    },
    /// Show relationship metrics, stage and insights
    Metrics {
        partner_id: String,
        #[arg(long)]
        include_history: bool,
        #[arg(long)]
        period: Option<MetricsPeriod>,
    },
    /// Show continuing topics
    Topics {
        partner_id: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "active")]
        status: TopicFilter,
        #[arg(long)]
        min_importance: Option<f64>,
    },
    /// Show memory and episode statistics for a partner
    Stats { partner_id: String },
    /// Run database diagnostics
    Doctor,
    /// Manage partners
    Partner {
        #[command(subcommand)]
        action: PartnerAction,
    },
    /// Manage messages
    Message {
        #[command(subcommand)]
        action: MessageAction,
    },
    /// Manage the local embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum PartnerAction {
    /// Create a partner
    Add { user_id: String, name: String },
    /// List a user's partners
    List { user_id: String },
}

#[derive(Subcommand)]
enum MessageAction {
    /// Append a message to a partner's conversation
    Add {
        partner_id: String,
        /// `user` or `partner`
        sender: MessageSender,
        content: String,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.rapport/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RapportConfig::load_from(path)?,
        None => RapportConfig::load()?,
    };

    // Log to stderr so stdout stays clean for JSON output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Summarize {
            partner_id,
            message_ids,
            summary_type,
            episode_title,
            episode_description,
        } => {
            cli::summarize::summarize(
                &config,
                partner_id,
                message_ids,
                summary_type,
                episode_title,
                episode_description,
            )
            .await?;
        }
        Command::Search {
            partner_id,
            query,
            memory_types,
            limit,
            min_importance,
        } => {
            cli::search::search(&config, partner_id, query, memory_types, limit, min_importance).await?;
        }
        Command::Episodes {
            partner_id,
            limit,
            min_emotional_weight,
            tags,
            start_date,
            end_date,
        } => {
            let query = cli::episodes::build_query(limit, min_emotional_weight, tags, start_date, end_date)?;
            cli::episodes::episodes(&config, &partner_id, query).await?;
        }
        Command::Metrics {
            partner_id,
            include_history,
            period,
        } => {
            cli::metrics::metrics(&config, &partner_id, include_history, period).await?;
        }
        Command::Topics {
            partner_id,
            limit,
            status,
            min_importance,
        } => {
            cli::topics::topics(&config, &partner_id, limit, status, min_importance).await?;
        }
        Command::Stats { partner_id } => {
            cli::stats::stats(&config, &partner_id).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
        Command::Partner { action } => match action {
            PartnerAction::Add { user_id, name } => cli::seed::add_partner(&config, &user_id, &name)?,
            PartnerAction::List { user_id } => cli::seed::list_partners(&config, &user_id)?,
        },
        Command::Message { action } => match action {
            MessageAction::Add {
                partner_id,
                sender,
                content,
            } => cli::seed::add_message(&config, &partner_id, sender, &content)?,
        },
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
