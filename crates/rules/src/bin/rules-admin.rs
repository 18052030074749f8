//! rules-admin — inspect and edit the gateway routing rules file.
//!
//! Path and lock timeout default to the profile-aware gateway config
//! (`ROUTING_RULES_PATH`, `ROUTING_RULES_LOCK_TIMEOUT_MS`, `.env`), and can be
//! overridden per invocation. Logs go to stderr so `list` output stays clean.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use gateway_core::config::{load_dotenv, Config};
use gateway_rules::store::encode_rules;
use gateway_rules::{RoutingRule, RuleStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Routing rules admin — list rules or replace one by name.
#[derive(Parser, Debug)]
#[command(name = "rules-admin", version, about)]
struct Cli {
    /// Routing rules file (overrides ROUTING_RULES_PATH).
    #[arg(long)]
    rules_path: Option<PathBuf>,

    /// Give up after this many milliseconds waiting for the file lock (0 = wait forever).
    #[arg(long)]
    lock_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every rule in file order.
    List {
        /// Emit JSON instead of the YAML document stream.
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved configuration as JSON.
    Config,
    /// Replace the rule whose name matches the given YAML document.
    Update {
        /// A single routing rule as YAML, e.g. "name: etl\npriority: 3".
        #[arg(long)]
        rule: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.rules_path {
        config.routing_rules.rules_config_path = path;
    }
    if let Some(timeout_ms) = cli.lock_timeout_ms {
        config.routing_rules.lock_timeout_ms = timeout_ms;
    }
    config.log_summary();

    let store = RuleStore::from_config(&config.routing_rules);

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config.summary())?);
        }
        Command::List { json } => {
            let rules = store.list()?;
            if json {
                let out = serde_json::to_string_pretty(&rules)
                    .context("routing rules are not representable as JSON")?;
                println!("{out}");
            } else {
                print!("{}", encode_rules(&rules)?);
            }
        }
        Command::Update { rule } => {
            let rule: RoutingRule =
                serde_yaml::from_str(&rule).context("--rule is not a valid routing rule document")?;
            let name = rule.name.clone();
            let rules = store.update_by_name(rule)?;
            let replaced = rules.iter().filter(|r| r.name == name).count();
            info!(rule = %name, replaced, total = rules.len(), "update finished");
            println!("{replaced}");
        }
    }

    Ok(())
}
