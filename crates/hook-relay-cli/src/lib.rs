//! # Hook Relay CLI
//!
//! Operator tooling for the GitHub to Feishu notification relay.
//!
//! This module provides CLI commands for:
//! - Validating the relay configuration file
//! - Showing the chat routing currently on disk
//! - Rendering and installing the systemd unit that runs the service
//! - Generating shell completions

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use hook_relay_core::{ConfigStore, ConfigStoreError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Binary name used in completions and usage text.
pub const BIN_NAME: &str = "hook-relay";

/// Relay configuration file used when `--file` is not given.
pub const DEFAULT_APP_CONFIG_FILE: &str = "feishu_config.json";

/// Directory systemd reads system units from.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Environment variable the service reads its own configuration path from.
const SERVICE_CONFIG_ENV: &str = "HOOK_RELAY_CONFIG_FILE";

// ============================================================================
// CLI Structure
// ============================================================================

/// Hook Relay CLI - operate the GitHub to Feishu notification relay
#[derive(Parser, Debug)]
#[command(name = BIN_NAME)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator tooling for the GitHub to Feishu notification relay")]
pub struct Cli {
    /// Logging level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect the relay configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Manage the systemd unit running the relay
    Service {
        #[command(subcommand)]
        action: ServiceCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Relay configuration commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Load the configuration file and report the resolved values
    Check {
        /// Relay configuration file
        #[arg(short, long, env = "HOOK_RELAY_APP_CONFIG", default_value = DEFAULT_APP_CONFIG_FILE)]
        file: PathBuf,
    },

    /// Print the chat routing: project mapping, default and current chat
    Show {
        /// Relay configuration file
        #[arg(short, long, env = "HOOK_RELAY_APP_CONFIG", default_value = DEFAULT_APP_CONFIG_FILE)]
        file: PathBuf,

        /// Output format
        #[arg(short = 'o', long, default_value = "text")]
        format: OutputFormat,
    },
}

/// systemd unit commands
#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    /// Print the unit file to stdout
    Render {
        #[command(flatten)]
        unit: UnitArgs,
    },

    /// Write the unit file and (re)start the service
    Install {
        #[command(flatten)]
        unit: UnitArgs,

        /// Directory the unit file is written to
        #[arg(long, default_value = DEFAULT_UNIT_DIR)]
        unit_dir: PathBuf,

        /// Only write the unit; skip daemon-reload, enable and restart
        #[arg(long)]
        no_start: bool,
    },
}

/// Values substituted into the systemd unit.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct UnitArgs {
    /// Absolute path of the hook-relay-service binary
    #[arg(long)]
    pub exec: PathBuf,

    /// Working directory; defaults to the directory holding the binary
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Unit name, without the `.service` suffix
    #[arg(long, default_value = BIN_NAME)]
    pub name: String,

    /// Account the service runs as; systemd's default when omitted
    #[arg(long)]
    pub user: Option<String>,

    /// Unit description
    #[arg(long, default_value = "GitHub to Feishu notification relay")]
    pub description: String,

    /// Service configuration file passed through HOOK_RELAY_CONFIG_FILE
    #[arg(long)]
    pub service_config: Option<PathBuf>,
}

/// Output formats
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

// ============================================================================
// Errors
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigStoreError),

    #[error("Feishu credentials in {path} are still placeholders")]
    CredentialsNotConfigured { path: String },

    #[error("Invalid argument {arg}: {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Permission denied writing {path}; run as root to install into this directory")]
    PermissionDenied { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::CredentialsNotConfigured { .. } => 1,
            Self::InvalidArgument { .. } => 2,
            Self::CommandFailed { .. } => 3,
            Self::PermissionDenied { .. } => 4,
            Self::Io(_) => 5,
            Self::Serialization(_) => 6,
        }
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Parse the process arguments and run the selected command against stdout.
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli.command, &mut out).await
}

/// Run a parsed command, writing its report to `out`.
pub async fn run(command: Commands, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Commands::Config { action } => match action {
            ConfigCommands::Check { file } => execute_config_check(&file, out),
            ConfigCommands::Show { file, format } => execute_config_show(&file, format, out),
        },
        Commands::Service { action } => match action {
            ServiceCommands::Render { unit } => {
                let text = render_unit(&unit)?;
                out.write_all(text.as_bytes())?;
                Ok(())
            }
            ServiceCommands::Install {
                unit,
                unit_dir,
                no_start,
            } => execute_service_install(&unit, &unit_dir, no_start, out).await,
        },
        Commands::Completions { shell } => {
            info!(shell = ?shell, "Generating shell completions");
            clap_complete::generate(shell, &mut Cli::command(), BIN_NAME, out);
            Ok(())
        }
    }
}

/// Logs go to stderr so that stdout only carries command output.
fn initialize_logging(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded; keep it.
    let _ = if cli.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

// ============================================================================
// config
// ============================================================================

/// Chat routing as printed by `config show`.
#[derive(Debug, Serialize)]
struct RoutingView {
    default_chat_id: String,
    current_chat_id: String,
    project_chat_mapping: BTreeMap<String, String>,
}

fn execute_config_check(file: &Path, out: &mut dyn Write) -> Result<(), CliError> {
    info!(path = %file.display(), "Checking relay configuration");

    let store = ConfigStore::load(file)?;
    let config = store.snapshot();

    writeln!(out, "Configuration file: {}", file.display())?;
    writeln!(out, "  app_id:           {}", config.app_id)?;
    writeln!(out, "  app_secret:       {}", mask_secret(&config.app_secret))?;
    writeln!(out, "  default_chat_id:  {}", config.default_chat_id)?;
    writeln!(out, "  current_chat_id:  {}", config.current_chat_id)?;
    writeln!(
        out,
        "  project mappings: {}",
        config.project_chat_mapping.len()
    )?;

    if !config.credentials_configured() {
        warn!(path = %file.display(), "Feishu credentials are placeholders");
        return Err(CliError::CredentialsNotConfigured {
            path: file.display().to_string(),
        });
    }

    writeln!(out, "Configuration OK")?;
    Ok(())
}

fn execute_config_show(
    file: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    info!(path = %file.display(), format = ?format, "Showing chat routing");

    let store = ConfigStore::load(file)?;
    let view = RoutingView {
        default_chat_id: store.default_chat_id(),
        current_chat_id: store.current_chat_id(),
        project_chat_mapping: store.project_chat_mapping(),
    };

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &view)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            writeln!(out, "default_chat_id: {}", view.default_chat_id)?;
            writeln!(out, "current_chat_id: {}", view.current_chat_id)?;
            writeln!(out, "project_chat_mapping:")?;
            if view.project_chat_mapping.is_empty() {
                writeln!(out, "  (none)")?;
            }
            for (repository, chat_id) in &view.project_chat_mapping {
                writeln!(out, "  {repository} -> {chat_id}")?;
            }
        }
    }

    Ok(())
}

/// Keep the first four characters of a secret and hide the rest.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

// ============================================================================
// service
// ============================================================================

/// Render the systemd unit for the relay service.
pub fn render_unit(args: &UnitArgs) -> Result<String, CliError> {
    validate_unit_name(&args.name)?;
    require_absolute("exec", &args.exec)?;

    let working_dir = match &args.working_dir {
        Some(dir) => {
            require_absolute("working-dir", dir)?;
            dir.clone()
        }
        None => args
            .exec
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/")),
    };

    let mut service = String::new();
    if let Some(user) = &args.user {
        service.push_str(&format!("User={user}\n"));
    }
    service.push_str(&format!("WorkingDirectory={}\n", working_dir.display()));
    if let Some(path) = &args.service_config {
        service.push_str(&format!(
            "Environment={SERVICE_CONFIG_ENV}={}\n",
            path.display()
        ));
    }
    service.push_str(&format!("ExecStart={}\n", args.exec.display()));

    Ok(format!(
        "[Unit]\n\
         Description={description}\n\
         After=network.target\n\
         \n\
         [Service]\n\
         {service}\
         Restart=always\n\
         RestartSec=3\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        description = args.description,
    ))
}

/// Path the unit for `name` is written to inside `unit_dir`.
pub fn unit_path(unit_dir: &Path, name: &str) -> PathBuf {
    unit_dir.join(format!("{name}.service"))
}

async fn execute_service_install(
    args: &UnitArgs,
    unit_dir: &Path,
    no_start: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let unit = render_unit(args)?;
    let path = unit_path(unit_dir, &args.name);

    info!(path = %path.display(), name = %args.name, "Writing systemd unit");

    tokio::fs::write(&path, unit).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            CliError::PermissionDenied {
                path: path.display().to_string(),
            }
        } else {
            CliError::Io(e)
        }
    })?;
    writeln!(out, "Wrote {}", path.display())?;

    if no_start {
        writeln!(out, "Skipping service start (--no-start)")?;
        return Ok(());
    }

    for step in systemctl_steps(&args.name) {
        run_systemctl(&step).await?;
    }

    writeln!(out, "Service '{}' installed and started", args.name)?;
    writeln!(out, "Check it with: systemctl status {}", args.name)?;
    Ok(())
}

/// systemctl invocations that activate an installed unit, in order.
fn systemctl_steps(name: &str) -> Vec<Vec<String>> {
    vec![
        vec!["daemon-reload".to_string()],
        vec!["enable".to_string(), name.to_string()],
        vec!["restart".to_string(), name.to_string()],
    ]
}

async fn run_systemctl(args: &[String]) -> Result<(), CliError> {
    let command = format!("systemctl {}", args.join(" "));
    info!(command = %command, "Running");

    let output = tokio::process::Command::new("systemctl")
        .args(args)
        .output()
        .await
        .map_err(|e| CliError::CommandFailed {
            command: command.clone(),
            message: if e.kind() == std::io::ErrorKind::NotFound {
                "systemctl not found; a systemd host is required".to_string()
            } else {
                e.to_string()
            },
        })?;

    if !output.status.success() {
        return Err(CliError::CommandFailed {
            command,
            message: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(())
}

fn validate_unit_name(name: &str) -> Result<(), CliError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(CliError::InvalidArgument {
            arg: "name".to_string(),
            message: format!("'{name}' is not a valid unit name"),
        })
    }
}

fn require_absolute(arg: &str, path: &Path) -> Result<(), CliError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(CliError::InvalidArgument {
            arg: arg.to_string(),
            message: format!("'{}' must be an absolute path", path.display()),
        })
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
