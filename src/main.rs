use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flowline_core::config::AppConfig;
use flowline_core::traits::FlowLogger;
use flowline_core::TracingLogger;
use flowline_engine::{Context, FlowManager, FsFlowStorage, SessionStatus, StepFactory};
use flowline_github::GitHubClient;
use flowline_llm::ProviderRegistry;

#[derive(Parser)]
#[command(name = "flowline", version, about = "Declarative step/flow execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowline.toml")]
    config: PathBuf,

    /// Directory holding flow definitions (overrides [engine].flows_dir)
    #[arg(long, env = "FLOWLINE_FLOWS_DIR")]
    flows_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored flows
    List,
    /// Validate a stored flow without running it
    Validate {
        /// Flow name (file stem under the flows directory)
        name: String,
    },
    /// Run a flow to completion
    Run {
        /// Flow name (file stem under the flows directory)
        name: String,
        /// Seed the context (KEY=VALUE, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
        /// Step cap for this run (0 = unlimited)
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flowline=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        warn!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };
    if let Some(dir) = &cli.flows_dir {
        config.engine.flows_dir = dir.display().to_string();
    }

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::List => {
            let manager = build_manager(&config)?;
            let flows = manager.list_flows().await?;
            if flows.is_empty() {
                println!("No flows in {}", config.flows_dir().display());
            }
            for name in flows {
                println!("{}", name);
            }
        }
        Commands::Validate { name } => {
            let manager = build_manager(&config)?;
            let def = manager.validate(&name).await?;
            // Building the steps also checks providers and collaborators.
            manager.load_flow(&name).await?;
            println!("{}: OK ({} steps)", def.id, def.steps.len());
        }
        Commands::Run {
            name,
            set,
            max_steps,
        } => {
            if let Some(max) = max_steps {
                config.engine.max_steps = max;
            }
            let manager = build_manager(&config)?;
            let context = seed_context(&set)?;
            run_flow(&manager, &name, context).await?;
        }
    }

    Ok(())
}

fn build_manager(config: &AppConfig) -> anyhow::Result<FlowManager> {
    let logger: Arc<dyn FlowLogger> = Arc::new(TracingLogger);
    let github = GitHubClient::new(&config.github)?;

    let mut factory = StepFactory::new(logger).with_issue_tracker(Arc::new(github));
    let registry = ProviderRegistry::from_config(&config.llm);
    for entry in registry.iter() {
        factory = factory.with_provider(
            entry.name.clone(),
            entry.provider.clone(),
            entry.default_model.clone(),
        );
    }

    let storage = Arc::new(FsFlowStorage::new(config.flows_dir()));
    Ok(FlowManager::new(storage, factory).with_max_steps(config.engine.step_limit()))
}

async fn run_flow(manager: &FlowManager, name: &str, context: Context) -> anyhow::Result<()> {
    let cancel = tokio_util::sync::CancellationToken::new();
    let cancel_clone = cancel.clone();

    // Graceful shutdown on Ctrl-C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling flow...");
        cancel_clone.cancel();
    });

    let mut session = manager
        .create_session(name)
        .await?
        .with_context(context)
        .with_cancellation(cancel);
    info!(flow = %name, session_id = %session.id(), "Running flow");

    let result = session.run().await;

    let data: BTreeMap<&String, &Value> = session.context().data().iter().collect();
    println!("{}", serde_json::to_string_pretty(&data)?);
    eprintln!(
        "Session {} {} after {} step(s)",
        session.id(),
        session.status(),
        session.steps_executed()
    );

    match result {
        Ok(()) if session.status() == SessionStatus::Completed => Ok(()),
        Ok(()) => anyhow::bail!("session ended in state {}", session.status()),
        Err(e) => Err(e).with_context(|| format!("flow '{}' failed", name)),
    }
}

/// Build the initial context from `KEY=VALUE` pairs.
fn seed_context(pairs: &[String]) -> anyhow::Result<Context> {
    let mut context = Context::new();
    for pair in pairs {
        let (key, value) = parse_assignment(pair)?;
        context.set(key, value);
    }
    Ok(context)
}

/// Numbers and booleans are stored as such; anything else is a string.
fn parse_assignment(pair: &str) -> anyhow::Result<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{}'", pair))?;
    let key = key.trim();
    anyhow::ensure!(!key.is_empty(), "empty key in '{}'", pair);

    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(raw.to_string()),
    };
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment_types() {
        assert_eq!(
            parse_assignment("github.issueUrl=acme/app#7").unwrap(),
            ("github.issueUrl".to_string(), Value::String("acme/app#7".into()))
        );
        assert_eq!(parse_assignment("n=3").unwrap().1, serde_json::json!(3));
        assert_eq!(parse_assignment("flag=true").unwrap().1, Value::Bool(true));
        assert_eq!(parse_assignment("expr=a=b").unwrap().1, Value::String("a=b".into()));
        assert_eq!(parse_assignment("empty=").unwrap().1, Value::String(String::new()));
    }

    #[test]
    fn test_parse_assignment_rejects_malformed() {
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_seed_context() {
        let ctx = seed_context(&["a=1".into(), "b=hello".into()]).unwrap();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get_text("b").as_deref(), Some("hello"));
    }
}
