//! Command-line interface for citeguard.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use citeguard_engine::InMemoryFileCache;
use citeguard_pipeline::{
    AnthropicClient, CorrectionConfig, CorrectionEngine, Evaluator, JudgeConfig, JudgeSettings,
    LlmJudge, PipelineError,
};

use crate::error::{CliError, Result};
use crate::render;

/// Citeguard - verify and repair code citations in generated reports.
#[derive(Parser)]
#[command(name = "citeguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Inputs shared by every command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Inputs {
    /// Report containing `[path:start-end]` citations
    #[arg(short, long)]
    pub report: PathBuf,

    /// Repository the citations point into
    #[arg(long)]
    pub repo: PathBuf,

    /// Write the full result as JSON to this file
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Skip the language-model judge; abstractive claims stay unverified
    #[arg(long)]
    pub no_judge: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Evaluate the citations in a report.
    Evaluate {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Evaluate, then repair failing citations until clean or out of options.
    Correct {
        #[command(flatten)]
        inputs: Inputs,

        /// Fail when any citation failure remains
        #[arg(long)]
        strict: bool,

        /// Write the corrected report to this file
        #[arg(long)]
        write_report: Option<PathBuf>,

        /// Maximum correction passes (default: CORRECTION_MAX_ITERATIONS or 3)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Escalate instead of correcting above this many failures
        #[arg(long)]
        max_failures: Option<usize>,
    },
}

/// Run the CLI.
pub async fn run() -> Result<()> {
    run_with(Cli::parse()).await
}

/// Run a parsed command line.
pub async fn run_with(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Evaluate { inputs } => evaluate_command(&inputs).await,
        Commands::Correct {
            inputs,
            strict,
            write_report,
            max_iterations,
            max_failures,
        } => {
            let mut config = CorrectionConfig::from_env();
            if let Some(n) = max_iterations {
                config = config.with_max_iterations(n);
            }
            if let Some(n) = max_failures {
                config = config.with_max_failures_for_auto(n);
            }
            correct_command(&inputs, config, strict, write_report.as_deref()).await
        }
    }
}

/// Judge configuration from the environment, or `None` when running without one.
fn judge_config(inputs: &Inputs) -> Result<Option<JudgeConfig>> {
    if inputs.no_judge {
        return Ok(None);
    }
    match JudgeConfig::from_env() {
        Ok(config) => Ok(Some(config)),
        Err(PipelineError::Config(reason)) => {
            warn!(%reason, "running without a judge");
            println!(
                "{} {reason}; abstractive claims will be unverified",
                style("No judge:").yellow().bold()
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn read_report(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| CliError::file(path, e))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| CliError::file(path, e))
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Evaluator over `cache`, judged by `judge` when one is configured.
fn build_evaluator<'a>(
    cache: &'a InMemoryFileCache,
    judge: Option<&'a LlmJudge<'a, AnthropicClient>>,
    config: Option<&JudgeConfig>,
) -> Evaluator<'a> {
    let evaluator = Evaluator::new(cache);
    match (judge, config) {
        (Some(judge), Some(config)) => evaluator
            .with_judge(judge)
            .with_settings(JudgeSettings::from(config)),
        _ => evaluator,
    }
}

fn load(inputs: &Inputs) -> Result<(String, InMemoryFileCache)> {
    let report = read_report(&inputs.report)?;
    let cache = InMemoryFileCache::from_dir(&inputs.repo)?;
    info!(
        repo = %inputs.repo.display(),
        files = cache.len(),
        "file cache loaded"
    );
    println!(
        "{} {} against {} ({} files)",
        style("Checking").bold(),
        style(inputs.report.display()).cyan(),
        style(inputs.repo.display()).green(),
        cache.len()
    );
    Ok((report, cache))
}

/// Execute the evaluate command.
async fn evaluate_command(inputs: &Inputs) -> Result<()> {
    let (report, cache) = load(inputs)?;
    let config = judge_config(inputs)?;
    let client = config.as_ref().map(AnthropicClient::new).transpose()?;

    let judge = client.as_ref().zip(config.as_ref()).map(|(c, cfg)| LlmJudge::new(c, cfg));
    let evaluator = build_evaluator(&cache, judge.as_ref(), config.as_ref());

    let pb = spinner("Evaluating citations...");
    let result = evaluator.evaluate(&report).await;
    pb.finish_and_clear();

    println!();
    print!("{}", render::evaluation(&result));

    if let Some(path) = &inputs.json {
        write_file(path, &serde_json::to_string_pretty(&result)?)?;
        println!("{} {}", style("JSON written to:").green().bold(), path.display());
    }
    Ok(())
}

/// Execute the correct command.
async fn correct_command(
    inputs: &Inputs,
    correction: CorrectionConfig,
    strict: bool,
    write_report: Option<&Path>,
) -> Result<()> {
    let (report, cache) = load(inputs)?;
    let config = judge_config(inputs)?;
    let client = config.as_ref().map(AnthropicClient::new).transpose()?;

    let judge = client.as_ref().zip(config.as_ref()).map(|(c, cfg)| LlmJudge::new(c, cfg));
    let evaluator = build_evaluator(&cache, judge.as_ref(), config.as_ref());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, stopping after the current pass");
            on_signal.cancel();
        }
    });

    let mut engine = CorrectionEngine::new(evaluator, correction).with_cancellation(cancel);
    if let Some(judge) = &judge {
        engine = engine.with_rewriter(judge);
    }

    let pb = spinner("Evaluating and correcting citations...");
    let run = engine.run(&report).await;
    pb.finish_and_clear();

    println!();
    print!("{}", render::evaluation(&run.evaluation));
    print!("{}", render::correction(&run));

    if let Some(path) = write_report {
        write_file(path, &run.report)?;
        println!("{} {}", style("Report written to:").green().bold(), path.display());
    }
    if let Some(path) = &inputs.json {
        write_file(path, &serde_json::to_string_pretty(&run)?)?;
        println!("{} {}", style("JSON written to:").green().bold(), path.display());
    }

    if strict && !run.is_clean() {
        return Err(CliError::StrictFailure {
            remaining: run.result.remaining_failures.len(),
            state: run.state.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_parse_evaluate() {
        let cli = Cli::parse_from([
            "citeguard",
            "evaluate",
            "--report",
            "report.md",
            "--repo",
            ".",
        ]);

        let Commands::Evaluate { inputs } = cli.command else {
            unreachable!("expected evaluate");
        };
        assert_eq!(inputs.report, PathBuf::from("report.md"));
        assert_eq!(inputs.repo, PathBuf::from("."));
        assert!(inputs.json.is_none());
        assert!(!inputs.no_judge);
    }

    #[test]
    fn test_cli_parse_correct_strict() {
        let cli = Cli::parse_from([
            "citeguard",
            "correct",
            "-r",
            "report.md",
            "--repo",
            "repo",
            "--strict",
            "--write-report",
            "fixed.md",
            "--max-iterations",
            "5",
            "--no-judge",
        ]);

        let Commands::Correct {
            inputs,
            strict,
            write_report,
            max_iterations,
            max_failures,
        } = cli.command
        else {
            unreachable!("expected correct");
        };
        assert!(strict);
        assert!(inputs.no_judge);
        assert_eq!(write_report, Some(PathBuf::from("fixed.md")));
        assert_eq!(max_iterations, Some(5));
        assert_eq!(max_failures, None);
    }

    #[test]
    fn test_cli_requires_repo() {
        assert!(Cli::try_parse_from(["citeguard", "evaluate", "--report", "r.md"]).is_err());
    }
}
