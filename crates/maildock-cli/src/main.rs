//! Maildock - container mail-stack deployment sequencer
//!
//! The `maildock` command drives the whole deployment through the container
//! runtime CLI.
//!
//! ## Commands
//!
//! - `deploy`: run the full sequence (prepare, pull, start, poll, report)
//! - `check`: load and validate the configuration, print the resolved plan
//! - `status`: snapshot the running state of the declared containers
//! - `down`: force-remove the declared containers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::Level;

use maildock_core::{init_tracing, mail_stack_plan, DeployConfig, DeployError};
use maildock_deploy::{final_check, start_order, DeployPipeline};
use maildock_runtime::DockerCli;

#[derive(Parser)]
#[command(name = "maildock")]
#[command(author = "Maildock Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Container mail-stack deployment sequencer", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and results
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full deployment sequence
    Deploy {
        /// Path to the env-file configuration
        #[arg(short, long, default_value = "maildock.env")]
        env_file: PathBuf,

        /// Override the settle period before the final status snapshot
        #[arg(long)]
        settle_secs: Option<u64>,
    },

    /// Validate the configuration and print the resolved plan
    Check {
        /// Path to the env-file configuration
        #[arg(short, long, default_value = "maildock.env")]
        env_file: PathBuf,
    },

    /// Snapshot the running state of every declared container
    Status {
        /// Path to the env-file configuration
        #[arg(short, long, default_value = "maildock.env")]
        env_file: PathBuf,
    },

    /// Force-remove every declared container
    Down {
        /// Path to the env-file configuration
        #[arg(short, long, default_value = "maildock.env")]
        env_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Deploy {
            env_file,
            settle_secs,
        } => cmd_deploy(&env_file, settle_secs, cli.json).await,
        Commands::Check { env_file } => cmd_check(&env_file, cli.json),
        Commands::Status { env_file } => cmd_status(&env_file).await,
        Commands::Down { env_file } => cmd_down(&env_file).await,
    }
}

fn load_config(env_file: &Path) -> Result<DeployConfig> {
    DeployConfig::load(env_file)
        .with_context(|| format!("Failed to load configuration from {:?}", env_file))
}

/// Run the full deployment sequence
async fn cmd_deploy(env_file: &Path, settle_secs: Option<u64>, json: bool) -> Result<()> {
    let mut config = load_config(env_file)?;
    if let Some(settle) = settle_secs {
        config.settle_secs = settle;
    }
    let plan = mail_stack_plan(&config);
    let runtime = DockerCli::new();

    println!("Deploying mail stack for domain: {}", config.domain);
    println!("Services: {}", plan.services.len());
    println!("Plan digest: {}", plan.digest());
    println!();

    match DeployPipeline::run(&config, &plan, &runtime).await {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            println!("Run ID: {}", outcome.run_id);
            println!("Duration: {}ms", outcome.duration_ms);
            println!();
            for service in &outcome.services {
                match service.ready_after_ticks {
                    Some(ticks) => {
                        println!("  ✓ {} (ready after {} poll(s))", service.service, ticks)
                    }
                    None => println!("  ✓ {} (started)", service.service),
                }
            }
            println!();
            println!("{}", outcome.report.render_text());
            Ok(())
        }
        Err(DeployError::ReadinessTimeout {
            service,
            ticks,
            last_logs,
        }) => {
            eprintln!(
                "✗ service {} failed its readiness check after {} poll(s)",
                service, ticks
            );
            eprintln!("--- recent container log ---");
            eprintln!("{}", last_logs.trim_end());
            anyhow::bail!("deployment aborted: {} never became ready", service)
        }
        Err(DeployError::PostDeployDrift { names }) => {
            for name in &names {
                eprintln!("✗ {} is not running", name);
                eprintln!("  inspect with: docker logs --tail 50 {}", name);
            }
            anyhow::bail!(
                "deployment incomplete: {} container(s) not running",
                names.len()
            )
        }
        Err(error) => Err(error.into()),
    }
}

/// Validate the configuration and print the resolved plan
fn cmd_check(env_file: &Path, json: bool) -> Result<()> {
    let config = load_config(env_file)?;
    let plan = mail_stack_plan(&config);
    let order = start_order(&plan).context("deployment plan is inconsistent")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Configuration OK: {:?}", env_file);
    println!("Domain:      {}", config.domain);
    println!("Hostnames:   {}", config.hostnames.join(", "));
    println!("Plan digest: {}", plan.digest());
    println!();
    println!("Networks:");
    for network in &plan.networks {
        let kind = if network.external {
            "external"
        } else {
            "managed"
        };
        match network.subnet {
            Some(ref subnet) => println!("  {} ({}, subnet {})", network.name, kind, subnet),
            None => println!("  {} ({})", network.name, kind),
        }
    }
    println!();
    println!("Start order:");
    for (index, service) in order.iter().enumerate() {
        println!(
            "  {}. {} -> {} [{}]",
            index + 1,
            service.name,
            service.container_name,
            service.image
        );
    }

    Ok(())
}

/// Snapshot the running state of every declared container
async fn cmd_status(env_file: &Path) -> Result<()> {
    let config = load_config(env_file)?;
    let plan = mail_stack_plan(&config);
    let runtime = DockerCli::new();

    let report = final_check(&config, &plan, &runtime)
        .await
        .context("Failed to query container state")?;

    println!("{}", report.render_text());

    if report.is_healthy() {
        Ok(())
    } else {
        anyhow::bail!("{} container(s) not running", report.missing.len())
    }
}

/// Force-remove every declared container
async fn cmd_down(env_file: &Path) -> Result<()> {
    let config = load_config(env_file)?;
    let plan = mail_stack_plan(&config);
    let runtime = DockerCli::new();

    let removed = DeployPipeline::teardown(&plan, &runtime).await?;
    for name in &removed {
        println!("removed {}", name);
    }
    println!("\n{} container(s) removed", removed.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("maildock.env");
        std::fs::write(
            &path,
            "SECRET_KEY=0123456789abcdef0123456789abcdef\nDOMAIN=example.com\n\
             HOSTNAMES=mail.example.com\nPOSTMASTER=admin\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_cli_parses_deploy_flags() {
        let cli = Cli::try_parse_from([
            "maildock",
            "deploy",
            "--env-file",
            "/tmp/maildock.env",
            "--settle-secs",
            "0",
        ])
        .unwrap();

        match cli.command {
            Commands::Deploy {
                env_file,
                settle_secs,
            } => {
                assert_eq!(env_file, PathBuf::from("/tmp/maildock.env"));
                assert_eq!(settle_secs, Some(0));
            }
            _ => panic!("expected deploy subcommand"),
        }
    }

    #[test]
    fn test_cmd_check_accepts_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());
        assert!(cmd_check(&path, false).is_ok());
        assert!(cmd_check(&path, true).is_ok());
    }

    #[test]
    fn test_cmd_check_rejects_missing_file() {
        let result = cmd_check(Path::new("/nonexistent/maildock.env"), false);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_reports_offending_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maildock.env");
        std::fs::write(
            &path,
            "SECRET_KEY=too-short\nDOMAIN=example.com\nHOSTNAMES=mail.example.com\nPOSTMASTER=admin\n",
        )
        .unwrap();

        let err = load_config(&path).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("32"), "unexpected error: {msg}");
    }
}
