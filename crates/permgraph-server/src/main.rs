//! permgraph binary
//!
//! # Usage
//!
//! ```bash
//! # Permissions of a principal, as JSON
//! permgraph --config permgraph.yaml propagate U1
//!
//! # Authorization check; exit status 0 on allow, 1 on deny
//! permgraph --config permgraph.yaml check U1 write obj1 --owner G1
//!
//! # With environment variables only
//! PERMGRAPH_STORAGE__SEED_FILE=edges.json permgraph propagate U1
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use permgraph_domain::model::{AccessRequest, Principal, Target};
use permgraph_server::logging::{init_logging, LoggingConfig};
use permgraph_server::{AuthorizationService, ServerConfig};

/// permgraph - permission propagation and authorization
#[derive(Parser, Debug)]
#[command(name = "permgraph")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the propagated permissions of a principal as JSON
    Propagate {
        /// Principal identifier
        principal: String,
    },
    /// Decide whether a principal may perform an action on a target
    Check {
        /// Principal identifier
        principal: String,
        /// Action: read, write or manage
        action: String,
        /// Target identifier
        target: String,
        /// Owner of the target, if any
        #[arg(long)]
        owner: Option<String>,
        /// Treat the principal as an administrator
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(LoggingConfig::from_settings(&config.logging));
    info!(version = env!("CARGO_PKG_VERSION"), "starting permgraph");

    let service = AuthorizationService::from_config(&config).await?;
    let result = run(&service, args.command).await;
    service.shutdown().await;
    result
}

async fn run(service: &AuthorizationService, command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Propagate { principal } => {
            let perms = service.permissions(&principal).await?;
            println!("{}", serde_json::to_string_pretty(&perms)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check {
            principal,
            action,
            target,
            owner,
            admin,
        } => {
            let principal = if admin {
                Principal::admin(principal)
            } else {
                Principal::new(principal)
            };
            let target = match owner {
                Some(owner) => Target::owned_by(target, owner),
                None => Target::id(target),
            };
            let request = AccessRequest::new(action.as_str(), target);

            let allowed = match service.check(&principal, &[request]).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    warn!(error = %e, "authorization check failed, denying");
                    false
                }
            };

            if allowed {
                println!("allow");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("deny");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
