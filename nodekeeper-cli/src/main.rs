///! nodekeeper
///!
///! Monitoring plugin binary: one check or handler per invocation, one status
///! line on stdout, plugin exit code on return.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use nodekeeper_common::MonitoredNodeEvent;

use nodekeeper_cli::commands::ec2_node::failure_output;
use nodekeeper_cli::commands::{ClusterFailureRemover, ClusterHealthCheck, StaleNodeReaper};
use nodekeeper_cli::consul::ConsulClient;
use nodekeeper_cli::ec2::{process_env, Ec2Inventory};
use nodekeeper_cli::logging::LoggingConfig;
use nodekeeper_cli::sensu::SensuClient;
use nodekeeper_cli::{CheckStatus, PluginOutput, Settings};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (defaults to /etc/nodekeeper/config.toml or ./nodekeeper.toml)
    #[arg(short, long, global = true, env = "NODEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a check
    Check {
        #[command(subcommand)]
        command: CheckCommands,
    },
    /// Run an event handler
    Handle {
        #[command(subcommand)]
        command: HandleCommands,
    },
    /// Print a sample settings file
    SampleConfig,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum CheckCommands {
    /// Alert when any cluster member is failed or the agent is unreachable
    ConsulFailures,
}

#[derive(Subcommand)]
enum HandleCommands {
    /// Force failed members out of the cluster
    ConsulRemoveFailed,
    /// Delete the monitoring client of an instance that no longer exists
    Ec2Node {
        /// Read the event from a file instead of stdin
        #[arg(long)]
        event: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Completions { shell } => {
            generate_completions(shell);
            return ExitCode::SUCCESS;
        }
        Commands::SampleConfig => {
            print!("{}", Settings::generate_sample());
            return ExitCode::SUCCESS;
        }
        other => other,
    };

    let output = match run(cli.config.as_deref(), command).await {
        Ok(output) => output,
        Err(e) => PluginOutput::unknown("nodekeeper", &format!("{:#}", e)),
    };

    output.print();
    ExitCode::from(output.exit_code())
}

async fn run(config: Option<&Path>, command: Commands) -> Result<PluginOutput> {
    let settings = Settings::load(config).context("Failed to load settings")?;

    // Held until the output is ready so the file writer is flushed
    let _guard = LoggingConfig::from(&settings.logging)
        .init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let output = match command {
        Commands::Check {
            command: CheckCommands::ConsulFailures,
        } => {
            let consul = ConsulClient::from_config(&settings.consul)?;
            ClusterHealthCheck::new(consul).run().await
        }
        Commands::Handle {
            command: HandleCommands::ConsulRemoveFailed,
        } => {
            let consul = ConsulClient::from_config(&settings.consul)?;
            ClusterFailureRemover::new(consul).run().await
        }
        Commands::Handle {
            command: HandleCommands::Ec2Node { event },
        } => handle_ec2_node(&settings, event.as_deref()).await?,
        Commands::SampleConfig | Commands::Completions { .. } => {
            return Err(anyhow!("command does not produce plugin output"))
        }
    };

    Ok(output)
}

async fn handle_ec2_node(settings: &Settings, event_path: Option<&Path>) -> Result<PluginOutput> {
    let raw = read_event(event_path)?;
    let event = match MonitoredNodeEvent::from_json(&raw) {
        Ok(event) => event,
        Err(e) => return Ok(PluginOutput::handler(CheckStatus::Unknown, format!("[EC2 Node] {}", e))),
    };

    let inventory = match Ec2Inventory::from_config(&settings.aws, process_env()).await {
        Ok(inventory) => inventory,
        Err(e) => return Ok(failure_output(&event.client_name, &e)),
    };
    let sensu = SensuClient::from_config(&settings.api)?;

    Ok(StaleNodeReaper::new(inventory, sensu).run(&event).await)
}

/// Event JSON from a file, or piped in on stdin
fn read_event(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event from {}", path.display())),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read event from stdin")?;
            Ok(raw)
        }
    }
}

/// Generate shell completions
fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    generate(shell, &mut cmd, name, &mut io::stdout());
}
