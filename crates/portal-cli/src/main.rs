mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, ConfigAction};
use portal_core::create_shared_event_bus;
use portal_core::discovery::Discovery;
use portal_core::registry::Registry;
use portal_gateway::{GatewayConfig, GatewayServer, Supervisor};
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_GENERIC: i32 = 1;
const EXIT_CONFIG_INVALID: i32 = 2;
const EXIT_PORT_IN_USE: i32 = 3;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    ConfigInvalid(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = match run(cli).await {
        Ok(()) => EXIT_OK,
        Err(err) => {
            tracing::error!(error = %err, "mcp-portal exited with an error");
            if err.downcast_ref::<CliError>().is_some() {
                EXIT_CONFIG_INVALID
            } else if err
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == std::io::ErrorKind::AddrInUse)
            {
                EXIT_PORT_IN_USE
            } else {
                EXIT_GENERIC
            }
        }
    };
    std::process::exit(code);
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn config_dir(cli: &Cli, home: &std::path::Path) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(|| home.join(".mcp-portal"))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
    let config_dir = config_dir(&cli, &home);

    match cli.command {
        None | Some(Command::Serve) => {
            let (_bus, sender) = create_shared_event_bus();
            let registry = Arc::new(Registry::new(sender));
            let discovery = Discovery::new(home.clone(), config_dir);
            let supervisor = Arc::new(Supervisor::new(discovery, registry.clone(), home));

            let config =
                GatewayConfig { host: cli.host, port: cli.port, enable_cors: true };
            let server = GatewayServer::new(config, registry, supervisor);
            server.run().await
        }
        Some(Command::Discover) => {
            let discovery = Discovery::new(home.clone(), config_dir);
            let scan = discovery.scan();
            for warning in &scan.warnings {
                tracing::warn!("{warning}");
            }
            println!("{}", serde_json::to_string_pretty(&scan.decls)?);
            if scan.warnings.iter().any(|w| w.contains("invalid JSON")) {
                return Err(CliError::ConfigInvalid("one or more config files were unparsable".into()).into());
            }
            Ok(())
        }
        Some(Command::Config { action }) => run_config(action, home, config_dir).await,
    }
}

async fn run_config(action: ConfigAction, home: PathBuf, config_dir: PathBuf) -> anyhow::Result<()> {
    let discovery = Discovery::new(home, config_dir);
    match action {
        ConfigAction::Get => {
            let document = discovery.read_manual()?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        ConfigAction::Set { path } => {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
            let document: serde_json::Value = serde_json::from_str(&contents)
                .map_err(|e| CliError::ConfigInvalid(format!("{}: invalid JSON ({e})", path.display())))?;
            let scan = discovery.write_manual(&document).await?;
            println!(
                "updated manual source: {} server(s) declared",
                scan.decls.len()
            );
            Ok(())
        }
    }
}
