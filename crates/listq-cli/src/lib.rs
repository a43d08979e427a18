//! # Listq CLI
//!
//! Operator command line for listq queues.
//!
//! This module provides CLI commands for:
//! - Showing the physical keys and hash slots of a queue
//! - Producing and consuming messages by hand
//! - Inspecting list depths
//! - Returning stranded messages to the ready list
//! - Running a worker pool
//! - Displaying the resolved configuration

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use listq_runtime::providers;
use listq_runtime::retry::retry_transient;
use listq_runtime::{
    ConsumerPool, Disposition, HandlerError, ListqSettings, Message, MessageHandler, Queue,
    QueueDepths, QueueError, QueueName, ReceivedMessage, ShardKeyPlanner,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// listq - at-least-once queues over Redis lists
#[derive(Parser)]
#[command(name = "listq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "At-least-once FIFO queues over Redis lists")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LISTQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Queue name, overriding the configured one
    #[arg(short, long, global = true)]
    pub queue: Option<String>,

    /// Logging level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show the physical keys of a queue and their hash slots
    Keys {
        /// Queue name; defaults to the configured queue
        name: Option<String>,

        /// Derive keys without hash tags
        #[arg(long)]
        no_hash_tags: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Push messages onto the ready list
    Produce {
        /// Message bodies
        #[arg(required = true)]
        bodies: Vec<String>,

        /// Message attribute as key=value; may be repeated
        #[arg(short, long = "attribute", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
    },

    /// Take messages off the queue and print them
    Consume {
        /// Maximum number of messages to take
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Pop without tracking (at-most-once)
        #[arg(long, conflicts_with = "requeue")]
        forget: bool,

        /// Put the messages back instead of acknowledging them
        #[arg(long)]
        requeue: bool,
    },

    /// Show list depths
    Stats {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Move every message in the processing list back to ready
    ///
    /// Only safe while no worker is consuming from the queue.
    Recover,

    /// Run a worker pool that logs and acknowledges every message
    Worker {
        /// Number of workers; defaults to consumer.workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show the resolved configuration
    Config {
        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

/// Parse a `key=value` message attribute
pub fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Output failed: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => 2,
            Self::Queue(QueueError::Configuration(_)) | Self::Queue(QueueError::Validation(_)) => 3,
            Self::Queue(QueueError::CrossShardOperation { .. }) => 4,
            Self::Queue(QueueError::StoreUnavailable { .. })
            | Self::Queue(QueueError::Timeout { .. }) => 5,
            Self::Queue(QueueError::Serialization(_)) | Self::Output { .. } | Self::Io(_) => 1,
        }
    }
}

fn output_error(error: impl ToString) -> CliError {
    CliError::Output {
        message: error.to_string(),
    }
}

// ============================================================================
// Reports
// ============================================================================

/// One physical key of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyReport {
    pub role: &'static str,
    pub key: String,
    pub slot: u16,
}

/// Key layout of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeysReport {
    pub queue: String,
    pub hash_tags: bool,
    pub co_located: bool,
    pub keys: Vec<KeyReport>,
}

impl KeysReport {
    pub fn new(name: &QueueName, planner: ShardKeyPlanner) -> Self {
        let keys = planner.derive_keys(name);
        let roles = ["ready", "processing", "dead_letter"];

        Self {
            queue: name.to_string(),
            hash_tags: planner.uses_hash_tags(),
            co_located: keys.is_co_located(),
            keys: roles
                .iter()
                .zip(keys.slots())
                .map(|(role, (key, slot))| KeyReport {
                    role: *role,
                    key: key.to_string(),
                    slot,
                })
                .collect(),
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, CliError> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self).map_err(output_error),
            OutputFormat::Text => {
                let mut out = format!(
                    "queue: {}\nhash tags: {}\n",
                    self.queue,
                    if self.hash_tags { "on" } else { "off" }
                );
                for key in &self.keys {
                    out.push_str(&format!("{:<12}{:<32}slot {}\n", key.role, key.key, key.slot));
                }
                out.push_str(&format!(
                    "co-located: {}",
                    if self.co_located { "yes" } else { "no" }
                ));
                Ok(out)
            }
        }
    }
}

/// List depths of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub queue: String,
    #[serde(flatten)]
    pub depths: QueueDepths,
}

impl StatsReport {
    pub fn render(&self, format: OutputFormat) -> Result<String, CliError> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self).map_err(output_error),
            OutputFormat::Text => Ok(format!(
                "queue: {}\nready: {}\nprocessing: {}\ndead_letter: {}",
                self.queue, self.depths.ready, self.depths.processing, self.depths.dead_letter
            )),
        }
    }
}

/// Serialize settings in the requested format
pub fn render_settings(settings: &ListqSettings, format: ConfigFormat) -> Result<String, CliError> {
    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(settings).map_err(output_error),
        ConfigFormat::Json => serde_json::to_string_pretty(settings).map_err(output_error),
        ConfigFormat::Toml => toml::to_string_pretty(settings).map_err(output_error),
    }
}

/// One line per received message
pub fn render_message(message: &ReceivedMessage) -> String {
    format!(
        "{}\tdeliveries={}\t{}",
        message.message_id,
        message.attempt(),
        String::from_utf8_lossy(&message.body)
    )
}

// ============================================================================
// Worker Handler
// ============================================================================

/// Handler used by the `worker` command: logs and acknowledges
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(
        &self,
        queue: &Queue,
        message: &ReceivedMessage,
    ) -> Result<Disposition, HandlerError> {
        info!(
            queue = %queue.name(),
            message_id = %message.message_id,
            delivery_count = message.delivery_count,
            bytes = message.body.len(),
            "Message received"
        );
        Ok(Disposition::Ack)
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;
    run(cli).await
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Keys {
            name,
            no_hash_tags,
            format,
        } => execute_keys_command(&settings, name, no_hash_tags, format),
        Commands::Produce { bodies, attributes } => {
            execute_produce_command(&settings, bodies, attributes).await
        }
        Commands::Consume {
            count,
            forget,
            requeue,
        } => execute_consume_command(&settings, count, forget, requeue).await,
        Commands::Stats { format } => execute_stats_command(&settings, format).await,
        Commands::Recover => execute_recover_command(&settings).await,
        Commands::Worker { workers } => execute_worker_command(&settings, workers).await,
        Commands::Config { format } => {
            println!("{}", render_settings(&settings, format)?);
            Ok(())
        }
    }
}

/// Initialize logging based on CLI arguments
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "--log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(output_error)
}

/// Load settings and apply command line overrides
pub fn load_settings(cli: &Cli) -> Result<ListqSettings, CliError> {
    let mut settings = ListqSettings::load(cli.config.as_deref())?;
    if let Some(queue) = &cli.queue {
        settings.queue.name = queue.clone();
        settings.validate()?;
    }
    Ok(settings)
}

async fn open_queue(settings: &ListqSettings) -> Result<Arc<Queue>, CliError> {
    let store = providers::connect(&settings.store).await?;
    let queue = Queue::new(
        settings.queue_name()?,
        settings.key_planner(),
        store,
        settings.queue_options(),
    )?;
    Ok(Arc::new(queue))
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_keys_command(
    settings: &ListqSettings,
    name: Option<String>,
    no_hash_tags: bool,
    format: OutputFormat,
) -> Result<(), CliError> {
    let name = match name {
        Some(name) => QueueName::new(name).map_err(QueueError::from)?,
        None => settings.queue_name()?,
    };
    let planner = ShardKeyPlanner::new(settings.queue.hash_tags && !no_hash_tags);

    let report = KeysReport::new(&name, planner);
    if !report.co_located {
        warn!(queue = %name, "Keys span several hash slots; a sharded store will refuse moves");
    }
    println!("{}", report.render(format)?);
    Ok(())
}

async fn execute_produce_command(
    settings: &ListqSettings,
    bodies: Vec<String>,
    attributes: Vec<(String, String)>,
) -> Result<(), CliError> {
    let queue = open_queue(settings).await?;
    let policy = settings.retry_policy();

    for body in bodies {
        let message = attributes
            .iter()
            .fold(Message::from(body), |message, (key, value)| {
                message.with_attribute(key.clone(), value.clone())
            });

        let message_id =
            retry_transient(&policy, "produce", || queue.produce(message.clone())).await?;
        println!("{}", message_id);
    }
    Ok(())
}

async fn execute_consume_command(
    settings: &ListqSettings,
    count: usize,
    forget: bool,
    requeue: bool,
) -> Result<(), CliError> {
    let queue = open_queue(settings).await?;

    for _ in 0..count {
        let received = if forget {
            queue.consume_and_forget().await?
        } else {
            queue.consume().await?
        };
        let Some(message) = received else {
            break;
        };

        println!("{}", render_message(&message));

        if forget {
            continue;
        }
        if requeue {
            queue.nack(&message).await?;
        } else {
            queue.ack(&message).await?;
        }
    }
    Ok(())
}

async fn execute_stats_command(
    settings: &ListqSettings,
    format: OutputFormat,
) -> Result<(), CliError> {
    let queue = open_queue(settings).await?;
    let report = StatsReport {
        queue: queue.name().to_string(),
        depths: queue.depths().await?,
    };
    println!("{}", report.render(format)?);
    Ok(())
}

async fn execute_recover_command(settings: &ListqSettings) -> Result<(), CliError> {
    let queue = open_queue(settings).await?;
    let recovered = queue.recover_stranded().await?;
    println!("recovered {} message(s)", recovered);
    Ok(())
}

async fn execute_worker_command(
    settings: &ListqSettings,
    workers: Option<usize>,
) -> Result<(), CliError> {
    let workers = workers.unwrap_or(settings.consumer.workers);
    if workers == 0 {
        return Err(CliError::InvalidArgument {
            arg: "--workers".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    let queue = open_queue(settings).await?;
    if settings.consumer.recover_on_start {
        queue.recover_stranded().await?;
    }

    let pool = ConsumerPool::spawn(
        Arc::clone(&queue),
        Arc::new(LoggingHandler),
        settings.consumer_config(),
        workers,
    );
    info!(queue = %queue.name(), workers, "Worker pool running, press Ctrl-C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown requested");
        }
        _ = pool.stopped() => {
            warn!(queue = %queue.name(), "Every worker has stopped, exiting");
        }
    }

    let mut failure = None;
    for result in pool.shutdown().await {
        match result {
            Ok(stats) => info!(
                worker = stats.worker_id,
                acked = stats.acked,
                requeued = stats.requeued,
                dead_lettered = stats.dead_lettered,
                store_errors = stats.store_errors,
                "Worker finished"
            ),
            Err(e) => {
                error!(error = %e, "Worker failed");
                failure.get_or_insert(e);
            }
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
