/// Version injected at compile time via YCBACKUP_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("YCBACKUP_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ycbackup::api::error::ApiError;
use ycbackup::api::http::format_api_error;
use ycbackup::api::types::PolicySettings;
use ycbackup::backup::bindings::{create_binding, delete_binding, read_binding};
use ycbackup::backup::expand::expand_policy_settings;
use ycbackup::backup::flatten::flatten_policy_settings;
use ycbackup::backup::{BindingError, PolicyError};
use ycbackup::backup::policy::{
    create_policy, delete_policy, find_policy, read_policy, update_policy, PolicyLookup,
};
use ycbackup::config::{load_policy_document, ProviderConfig};

/// Manage Cloud Backup policies and their bindings to compute instances
#[derive(Parser, Debug)]
#[command(name = "ycbackup", version = VERSION, about, long_about = None)]
struct Args {
    /// Folder to create and look up policies in
    #[arg(long, global = true)]
    folder_id: Option<String>,

    /// Cloud Backup API endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a policy document
    Validate { file: PathBuf },
    /// Print the API settings a policy document expands to
    Expand { file: PathBuf },
    /// Print the policy document for API settings JSON
    Flatten { file: PathBuf },
    /// Manage policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Apply a policy to a compute instance
    Bind {
        policy_id: String,
        instance_id: String,
        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Show a binding (`<policy_id>:<instance_id>`)
    Binding { id: String },
    /// Revoke a binding (`<policy_id>:<instance_id>`)
    Unbind { id: String },
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    Create { file: PathBuf },
    Get { id: String },
    Update { id: String, file: PathBuf },
    Delete { id: String },
    /// Find a policy by id or by name within the folder
    Find {
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let directive = level.as_directive()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("ycbackup {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("ycbackup").join("ycbackup.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".ycbackup").join("ycbackup.log");
    }
    PathBuf::from("ycbackup.log")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Server-side cause of `err`, if any
fn api_error_of(err: &anyhow::Error) -> Option<&ApiError> {
    if let Some(e) = err.downcast_ref::<ApiError>() {
        return Some(e);
    }
    match (err.downcast_ref::<BindingError>(), err.downcast_ref::<PolicyError>()) {
        (Some(BindingError::Api(e)), _) | (_, Some(PolicyError::Api(e))) => Some(e),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        let message = match api_error_of(&err) {
            Some(api) => format_api_error(api),
            None => format!("{:#}", err),
        };
        tracing::error!("{}", message);
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = ProviderConfig::load();

    match args.command {
        Command::Validate { file } => {
            let policy = load_policy_document(&file)?;
            policy.validate()?;
            expand_policy_settings(&policy)?;
            println!("{}: ok", file.display());
        }
        Command::Expand { file } => {
            let policy = load_policy_document(&file)?;
            policy.validate()?;
            print_json(&expand_policy_settings(&policy)?)?;
        }
        Command::Flatten { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read settings file {:?}", file))?;
            let settings: PolicySettings = serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings JSON {:?}", file))?;
            print!("{}", serde_yaml::to_string(&flatten_policy_settings(&settings)?)?);
        }
        Command::Policy { command } => {
            let client = config.build_client(args.endpoint.as_deref())?;
            let poll = config.poll_interval();

            match command {
                PolicyCommand::Create { file } => {
                    let policy = load_policy_document(&file)?;
                    let folder_id = config.effective_folder_id(args.folder_id.as_deref());
                    print_json(&create_policy(&client, folder_id.as_deref(), &policy, poll).await?)?;
                }
                PolicyCommand::Get { id } => match read_policy(&client, &id).await? {
                    Some(state) => print_json(&state)?,
                    None => return Err(anyhow!("policy {} not found", id)),
                },
                PolicyCommand::Update { id, file } => {
                    let policy = load_policy_document(&file)?;
                    print_json(&update_policy(&client, &id, &policy, poll).await?)?;
                }
                PolicyCommand::Delete { id } => {
                    delete_policy(&client, &id, poll).await?;
                    println!("deleted {}", id);
                }
                PolicyCommand::Find { id, name } => {
                    let lookup = match (id, name) {
                        (Some(id), _) => PolicyLookup::Id(id),
                        (None, Some(name)) => PolicyLookup::Name {
                            folder_id: config
                                .effective_folder_id(args.folder_id.as_deref())
                                .context("--folder-id is required to find a policy by name")?,
                            name,
                        },
                        (None, None) => return Err(anyhow!("either --id or --name is required")),
                    };
                    print_json(&find_policy(&client, &lookup).await?)?;
                }
            }
        }
        Command::Bind {
            policy_id,
            instance_id,
            timeout_secs,
        } => {
            let client = config.build_client(args.endpoint.as_deref())?;
            let mut options = config.binding_options();
            options.deadline =
                timeout_secs.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

            tokio::select! {
                result = create_binding(&client, &policy_id, &instance_id, &options) => {
                    println!("{}", result?);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("interrupted while binding {} to {}", policy_id, instance_id);
                    return Err(anyhow!("interrupted"));
                }
            }
        }
        Command::Binding { id } => {
            let client = config.build_client(args.endpoint.as_deref())?;
            match read_binding(&client, &id).await? {
                Some(state) => print_json(&state)?,
                None => return Err(anyhow!("backup policy binding {} not found", id)),
            }
        }
        Command::Unbind { id } => {
            let client = config.build_client(args.endpoint.as_deref())?;
            delete_binding(&client, &id, config.poll_interval()).await?;
            println!("unbound {}", id);
        }
    }

    Ok(())
}
