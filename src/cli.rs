//! CLI entrypoint wiring shared by the scriptbox binary.

use crate::engine::Evaluator;
use crate::http::server::{self, AppState};
use crate::http::wire::WireResult;
use crate::observability::audit;
use crate::types::{EvalLimits, EvaluationRequest, ExchangeContext};
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP evaluation service
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8420")]
        addr: String,
        /// Wall-clock deadline per evaluation, in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
        /// Maximum snippet length in characters
        #[arg(long)]
        max_code_length: Option<usize>,
        /// History store capacity (oldest evaluations are evicted first)
        #[arg(long, default_value_t = 200)]
        history_capacity: usize,
        /// Append structured audit events to this file as JSON lines
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },
    /// Evaluate a snippet from a file ('-' reads stdin) and print the result
    Eval {
        /// Snippet file, or '-' for stdin
        file: String,
        /// JSON file providing { "response": ..., "request": ... }
        #[arg(long)]
        context: Option<PathBuf>,
        /// Wall-clock deadline for the evaluation, in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },
}

fn build_limits(deadline_ms: Option<u64>, max_code_length: Option<usize>) -> EvalLimits {
    let mut limits = EvalLimits::default();
    if let Some(ms) = deadline_ms {
        limits.deadline = Duration::from_millis(ms);
    }
    if let Some(len) = max_code_length {
        limits.max_code_length = len;
    }
    limits
}

pub async fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            addr,
            deadline_ms,
            max_code_length,
            history_capacity,
            audit_log,
        } => {
            audit::init(audit_log)?;
            let limits = build_limits(deadline_ms, max_code_length);
            let evaluator = Evaluator::new(limits);
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid bind address: {addr}"))?;
            server::serve(addr, AppState::new(evaluator, history_capacity)).await
        }
        Commands::Eval {
            file,
            context,
            deadline_ms,
        } => {
            let code = read_snippet(&file)?;
            let exchange = match context {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str::<ExchangeContext>(&raw)
                        .with_context(|| format!("invalid context JSON in {}", path.display()))?
                }
                None => ExchangeContext::default(),
            };

            let evaluator = Evaluator::new(build_limits(deadline_ms, None));
            let request = EvaluationRequest {
                code,
                context: exchange,
            };
            let result: WireResult = evaluator.evaluate(&request).into();
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.success {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
    }
}

fn read_snippet(file: &str) -> Result<String> {
    if file == "-" {
        let mut code = String::new();
        std::io::stdin()
            .read_to_string(&mut code)
            .context("failed to read snippet from stdin")?;
        Ok(code)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("failed to read {file}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_overrides_apply() {
        let limits = build_limits(Some(250), Some(2_000));
        assert_eq!(limits.deadline, Duration::from_millis(250));
        assert_eq!(limits.max_code_length, 2_000);

        let defaults = build_limits(None, None);
        assert_eq!(defaults.max_code_length, crate::types::MAX_CODE_LENGTH);
    }
}
