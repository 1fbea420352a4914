//! Sieve - capture policy matching and session export.
//!
//! This is the `sieve` command-line binary:
//! - Export stored sessions as URL lists, curl transcripts or HAR documents
//! - Match requests against capture policies
//! - Manage stored policies and settings
//! - Decode captured bodies

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use directories::ProjectDirs;
use sieve_app::commands::matching::PolicySource;
use sieve_app::commands::{decode, export, matching, policy, sessions};
use sieve_app::config::AppConfig;
use sieve_core::RequestContext;
use sieve_export::ExportKind;
use sieve_storage::{Database, SessionFilter};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Sieve - capture policy matching and session export
#[derive(Parser, Debug)]
#[command(name = "sieve", version, about)]
struct Args {
    /// Enable debug logging (also echoes logs to stderr)
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Database file (defaults to the app data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export sessions to a file, or delete them
    Export {
        /// url, curl, har or delete
        #[arg(long, short)]
        kind: ExportKind,

        /// Session ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,

        /// Output directory for this export only
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Match a request against a policy
    Match {
        /// Stored policy id or policy file (defaults to the current policy)
        #[arg(long)]
        policy: Option<PolicySource>,

        /// Request host
        #[arg(long)]
        host: String,

        /// Request path or absolute URL
        #[arg(long, default_value = "/")]
        uri: String,

        /// Client identifier (User-Agent)
        #[arg(long, default_value = "")]
        agent: String,
    },

    /// Manage policies
    #[command(subcommand)]
    Policy(PolicyCommand),

    /// Decode a captured body file
    Decode {
        file: PathBuf,
    },

    /// Inspect stored sessions
    #[command(subcommand)]
    Sessions(SessionsCommand),

    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Parse a policy file and report what was understood
    Check { file: PathBuf },

    /// Store a policy file, replacing one with the same name
    Import {
        file: PathBuf,

        /// Store under this name instead of the document's
        #[arg(long)]
        name: Option<String>,

        /// Make it the current policy
        #[arg(long)]
        current: bool,
    },

    /// List stored policies
    List,

    /// Print a stored policy
    Show { id: i64 },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List sessions, newest first
    List(ListArgs),
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    /// Only hosts containing this text
    #[arg(long)]
    host: Option<String>,

    /// Only this method
    #[arg(long)]
    method: Option<String>,

    /// Only this status code
    #[arg(long)]
    status: Option<u16>,

    #[arg(long, default_value_t = 100)]
    limit: i64,

    #[arg(long, default_value_t = 0)]
    offset: i64,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the current settings
    Show,

    /// Change settings
    Set {
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        bodies_dir: Option<PathBuf>,

        /// Creator name in HAR documents
        #[arg(long)]
        product_name: Option<String>,

        /// Largest body of unknown encoding to try decoding, in bytes
        #[arg(long)]
        decode_limit: Option<usize>,

        /// Current policy id
        #[arg(long, conflicts_with = "clear_policy")]
        policy: Option<i64>,

        /// Unset the current policy
        #[arg(long)]
        clear_policy: bool,
    },
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "sieve", "sieve").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sieve={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("sieve")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                // stdout carries command output, so console logs go to stderr
                if args.debug {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stderr))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::debug!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn open_database(path: Option<&PathBuf>) -> anyhow::Result<Database> {
    let db = match path {
        Some(path) => Database::with_path(path),
        None => Database::new(),
    };
    db.context("Failed to open database")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::debug!("Args: {:?}", args);

    let db = open_database(args.db.as_ref())?;
    let mut config = AppConfig::load(&db).context("Failed to load settings")?;

    let output = match args.command {
        Command::Export {
            kind,
            ids,
            output_dir,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            export::run(&db, &config, ids, kind).await?
        }

        Command::Match {
            policy: source,
            host,
            uri,
            agent,
        } => {
            let ctx = RequestContext::new(&host, &uri, &agent);
            let outcome = matching::evaluate(&db, &config, source, &ctx)?;
            matching::describe(&outcome)
        }

        Command::Policy(PolicyCommand::Check { file }) => policy::check(&file)?,
        Command::Policy(PolicyCommand::Import {
            file,
            name,
            current,
        }) => {
            let id = policy::import(&db, &file, name.as_deref())?;
            if current {
                config.current_policy_id = Some(id);
                config.save(&db).context("Failed to save settings")?;
            }
            format!("Stored policy #{}", id)
        }
        Command::Policy(PolicyCommand::List) => policy::list(&db, config.current_policy_id)?,
        Command::Policy(PolicyCommand::Show { id }) => policy::show(&db, id)?,

        Command::Decode { file } => {
            let decoded = decode::run(&file)?;
            match (decoded.codec, decoded.text) {
                (_, Some(text)) => text,
                (Some(codec), None) => {
                    format!("<{} bytes of binary data, recovered with {}>", decoded.size, codec)
                }
                (None, None) => format!("<{} bytes of binary data>", decoded.size),
            }
        }

        Command::Sessions(SessionsCommand::List(list)) => {
            let filter = SessionFilter {
                host: list.host,
                method: list.method,
                status: list.status,
                limit: list.limit,
                offset: list.offset,
            };
            sessions::list(&db, &filter)?
        }

        Command::Config(ConfigCommand::Show) => serde_json::to_string_pretty(&config)?,
        Command::Config(ConfigCommand::Set {
            output_dir,
            bodies_dir,
            product_name,
            decode_limit,
            policy: policy_id,
            clear_policy,
        }) => {
            if let Some(id) = policy_id {
                if db.get_policy(id)?.is_none() {
                    bail!("No policy #{}", id);
                }
                config.current_policy_id = Some(id);
            }
            if clear_policy {
                config.current_policy_id = None;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(dir) = bodies_dir {
                config.bodies_dir = dir;
            }
            if let Some(name) = product_name {
                config.product_name = name;
            }
            if let Some(limit) = decode_limit {
                config.opportunistic_decode_limit = limit;
            }

            config.save(&db).context("Failed to save settings")?;
            tracing::info!("Settings updated");
            serde_json::to_string_pretty(&config)?
        }
    };

    println!("{}", output.trim_end());
    Ok(())
}
