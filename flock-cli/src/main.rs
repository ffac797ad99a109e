//! Flock CLI - run and inspect agent definitions

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use flock_core::config::FlockConfig;
use flock_core::flock::Flock;
use flock_core::logging::init_logging;
use flock_core::serialization::FlockSpec;
use flock_core::signature::Signature;
use flock_core::workflow::LocalWorkflowEngine;

#[derive(Parser)]
#[command(name = "flock")]
#[command(about = "Declarative multi-agent orchestration", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to flock.toml and FLOCK_* variables)
    #[arg(short, long, global = true, env = "FLOCK_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flock definition
    Run {
        /// YAML or JSON flock definition
        file: PathBuf,

        /// Start agent (defaults to the definition's start_agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// Input value as key=value (value parsed as JSON when possible)
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Run through the local durable workflow engine
        #[arg(long)]
        durable: bool,

        /// Print the full context instead of only the result
        #[arg(long)]
        context: bool,
    },
    /// List the agents in a flock definition
    Agents {
        file: PathBuf,
    },
    /// Parse a signature string and print its fields
    Signature {
        signature: String,
    },
    /// Version information
    Version,
}

fn load_config(path: Option<&Path>) -> Result<FlockConfig> {
    let config = match path {
        Some(path) => FlockConfig::from_file(path)?,
        None => FlockConfig::load()?,
    };
    Ok(config)
}

fn load_spec(path: &Path) -> Result<FlockSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let spec = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => FlockSpec::from_json(&text)?,
        _ => FlockSpec::from_yaml(&text)?,
    };
    Ok(spec)
}

fn parse_inputs(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut inputs = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Input '{}' must be KEY=VALUE", pair);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.trim().to_string(), value);
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("flock {}", env!("CARGO_PKG_VERSION"));
            println!("flock-core {}", flock_core::VERSION);
        }
        Commands::Signature { signature } => {
            let parsed = Signature::parse(&signature);
            if parsed.is_empty() {
                println!("(no fields)");
            }
            for field in parsed.fields() {
                println!(
                    "{}\t{}\t{}",
                    field.name,
                    field.type_str.as_deref().unwrap_or("-"),
                    field.description.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Agents { file } => {
            let spec = load_spec(&file)?;
            for agent in &spec.agents {
                let router = agent
                    .handoff_router
                    .as_ref()
                    .map(|r| r.type_name.as_str())
                    .unwrap_or("-");
                println!(
                    "{}\tin: {}\tout: {}\trouter: {}",
                    agent.name, agent.input, agent.output, router
                );
            }
        }
        Commands::Run {
            file,
            agent,
            inputs,
            durable,
            context,
        } => {
            let config = load_config(cli.config.as_deref())?;
            init_logging(&config.logging)?;

            let spec = load_spec(&file)?;
            let mut flock = Flock::from_config(config)?;
            flock.load_spec(&spec)?;

            let start = match agent.or_else(|| flock.start_agent().map(str::to_string)) {
                Some(start) => start,
                None => bail!("No start agent: pass --agent or set start_agent in the definition"),
            };
            let inputs = parse_inputs(&inputs)?;

            tracing::info!(flock = %flock.name(), start_agent = %start, durable, "Running flock");
            let run = if durable {
                let engine = LocalWorkflowEngine::new(&flock.config().durable);
                flock.run_durable(&engine, &start, inputs).await?
            } else {
                flock.run(&start, inputs).await?
            };

            let output = if context {
                run.context.to_dict()?
            } else {
                Value::Object(run.result)
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs() {
        let inputs = parse_inputs(&[
            "topic=rust".to_string(),
            "count=3".to_string(),
            "tags=[\"a\"]".to_string(),
        ])
        .unwrap();

        assert_eq!(inputs["topic"], "rust");
        assert_eq!(inputs["count"], 3);
        assert_eq!(inputs["tags"], serde_json::json!(["a"]));
        assert!(parse_inputs(&["oops".to_string()]).is_err());
    }
}
