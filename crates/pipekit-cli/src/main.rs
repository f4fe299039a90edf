//! pipekit CLI entry point.
//!
//! Usage:
//!   pipekit [OPTIONS] cmd args '|' cmd args ...
//!   pipekit [OPTIONS] 'cmd args | cmd args'
//!   pipekit --list [--json]

mod cli;

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use pipekit_kernel::tools::ToolRegistry;
use pipekit_kernel::{ExecContext, Runner, RunnerConfig, Stage};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Action, RunOptions};

/// Exit status for arguments that never produced a pipeline.
const USAGE_ERROR: u8 = 2;

fn main() -> ExitCode {
    // Diagnostics go to stderr so they never mix with pipeline output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pipekit: {e:#}");
            ExitCode::from(USAGE_ERROR)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();

    match cli::parse_args(&args)? {
        Action::Help => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }
        Action::Version => {
            println!("pipekit {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Action::List { json } => list_tools(json),
        Action::Run(options) => run_pipeline(options),
    }
}

fn print_help() {
    println!(
        r#"pipekit v{}

Usage:
  pipekit [OPTIONS] cmd args '|' cmd args ...
  pipekit [OPTIONS] 'cmd args | cmd args'
  pipekit --list [--json]

Options:
  --timeout <secs>             Cancel the pipeline after this long
  --capacity <bytes>           Connector buffer bound (env: {})
  --grace <ms>                 Time cancelled stages get before being aborted
  --list                       List available commands
  --json                       With --list, print schemas as JSON
  -h, --help                   Show this help
  -V, --version                Show version

Exit status:
  0 success, 1 a stage failed, 2 bad arguments,
  124 deadline exceeded, 130 interrupted

Examples:
  pipekit seq 100 '|' grep 7 '|' sort -rn
  pipekit --timeout 5 'cat | uniq -c | sort -rn | head -n 3' < words.txt
"#,
        env!("CARGO_PKG_VERSION"),
        cli::CAPACITY_ENV
    );
}

fn list_tools(json: bool) -> Result<ExitCode> {
    let registry = ToolRegistry::with_builtins();
    if json {
        let schemas = serde_json::to_string_pretty(&registry.schemas())
            .context("Failed to serialize tool schemas")?;
        println!("{schemas}");
    } else {
        for schema in registry.schemas() {
            println!("{:<8} {}", schema.name, schema.description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_pipeline(options: RunOptions) -> Result<ExitCode> {
    let mut config = RunnerConfig::default();
    if let Some(capacity) = options.pipe_capacity(cli::capacity_from_env)? {
        config = config.with_pipe_capacity(capacity);
    }
    if let Some(grace) = options.grace {
        config = config.with_grace_period(grace);
    }
    let runner = Runner::new(config).context("Invalid runner settings")?;

    // Every command is configured before anything starts.
    let stage: Arc<dyn Stage> = match ToolRegistry::with_builtins().build_pipeline(&options.commands) {
        Ok(stage) => stage,
        Err(err) => {
            eprintln!("pipekit: {err}");
            return Ok(ExitCode::from(USAGE_ERROR));
        }
    };

    let rt = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let outcome = rt.block_on(async {
        let ctx = match options.timeout {
            Some(timeout) => ExecContext::with_timeout(timeout),
            None => ExecContext::new(),
        };

        let interrupt = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("interrupted");
                interrupt.cancel();
            }
        });

        runner
            .execute(stage, &ctx, tokio::io::stdin(), tokio::io::stdout(), tokio::io::stderr())
            .await
    });

    // Failures were already written to stderr, tagged with the stage.
    if let Some(failure) = outcome.failure() {
        tracing::debug!(stage = %failure.stage, "pipeline failed");
    } else if outcome.is_cancelled() {
        eprintln!("pipekit: {outcome}");
    }

    let code = u8::try_from(outcome.exit_code()).unwrap_or(1);
    // The reader thread behind stdin may still be blocked; don't wait for it.
    rt.shutdown_background();
    Ok(ExitCode::from(code))
}
