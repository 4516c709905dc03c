mod cleanup;
mod config;
mod console;
mod diff;
mod engine;
mod evaluator;
mod executor;
mod header;
mod interactive;
mod render;
mod repository;
mod stress;
mod subtest;

#[cfg(test)]
mod engine_tests;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use config::ConfigOverrides;
use cpjudge_common::config::CleanupPolicy;
use cpjudge_common::types::WhitespacePolicy;
use executor::Judge;
use interactive::InteractiveVerdict;
use render::RenderConfig;
use std::path::PathBuf;
use stress::{StressOptions, StressTester};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "cpjudge")]
#[command(about = "cpjudge - Local judge for competitive programming solutions", long_about = None)]
struct Cli {
    /// Emit log events as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the program against every numbered case in the tests directory
    Run {
        /// Compiled program under test
        #[arg(short = 'o', long, default_value = "prog")]
        bin: PathBuf,

        /// Directory holding <N>.in / <N>.ans
        #[arg(short = 'd', long, default_value = "tests")]
        tests: PathBuf,

        /// Program source; its header time limit becomes the default
        #[arg(short = 'f', long, default_value = "main.cpp")]
        src: PathBuf,

        /// JSON config file (defaults to $JUDGE_CONFIG, then ./judge.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Time limit in seconds when no header sets one
        #[arg(short = 't', long)]
        time: Option<f64>,

        /// Whitespace handling
        #[arg(short = 'w', long, value_enum)]
        ws: Option<WsArg>,

        /// Token-wise numeric tolerance when the text comparison fails
        #[arg(short = 'e', long)]
        float_tol: Option<f64>,

        /// Case-insensitive comparison and diff
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Stop after the first failing case
        #[arg(short = 'x', long)]
        stop_on_fail: bool,

        /// Enforce header memory limits (POSIX)
        #[arg(short = 'L', long)]
        enforce_limits: bool,

        /// What to remove after a fully passing run
        #[arg(short = 'c', long, value_enum)]
        cleanup: Option<CleanupArg>,

        /// Lines of context around differences
        #[arg(long)]
        context: Option<usize>,

        /// Do not show whitespace glyphs in the diff
        #[arg(long)]
        no_mark_ws: bool,

        /// Disable ANSI colors
        #[arg(long)]
        no_color: bool,

        /// Write the run summary as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Judge a solution against an interactor program
    Interact {
        /// Solution binary
        #[arg(short, long)]
        solution: PathBuf,

        /// Interactor binary; exit code 0 means accepted
        #[arg(short, long)]
        interactor: PathBuf,

        /// Wall-clock limit in seconds for the whole session
        #[arg(short, long, default_value = "2.0")]
        time: f64,

        /// Disable ANSI colors
        #[arg(long)]
        no_color: bool,
    },

    /// Compare a solution with a brute force on generated inputs
    Stress {
        /// Generator; started as `gen <iteration>`, its stdout is the input
        #[arg(short, long, default_value = "gen")]
        generator: PathBuf,

        /// Solution under test; reads stdin, writes stdout
        #[arg(short, long, default_value = "prog")]
        solution: PathBuf,

        /// Trusted brute force; reads stdin, writes stdout
        #[arg(short, long, default_value = "brute")]
        brute: PathBuf,

        /// Number of generated tests
        #[arg(short = 'n', long, default_value_t = 1000)]
        iterations: u64,

        /// JSON config file (defaults to $JUDGE_CONFIG, then ./judge.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Time limit in seconds for each program run
        #[arg(short = 't', long)]
        time: Option<f64>,

        /// Whitespace handling
        #[arg(short = 'w', long, value_enum)]
        ws: Option<WsArg>,

        /// Token-wise numeric tolerance when the text comparison fails
        #[arg(short = 'e', long)]
        float_tol: Option<f64>,

        /// Case-insensitive comparison and diff
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Log file for every iteration
        #[arg(long, default_value = "stress_log.txt")]
        log: PathBuf,

        /// Do not write the log file
        #[arg(long)]
        no_log: bool,

        /// Where the failing input is saved
        #[arg(long, default_value = "input.txt")]
        save_input: PathBuf,

        /// Do not show whitespace glyphs in the diff
        #[arg(long)]
        no_mark_ws: bool,

        /// Disable ANSI colors
        #[arg(long)]
        no_color: bool,
    },

    /// Remove generated outputs (and the binary with `all`) without running
    Clean {
        #[arg(short = 'o', long, default_value = "prog")]
        bin: PathBuf,

        #[arg(short = 'd', long, default_value = "tests")]
        tests: PathBuf,

        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cleanup target (defaults to the configured policy)
        #[arg(short = 'c', long, value_enum)]
        cleanup: Option<CleanupArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WsArg {
    Auto,
    Strict,
    Ignore,
}

impl From<WsArg> for WhitespacePolicy {
    fn from(arg: WsArg) -> Self {
        match arg {
            WsArg::Auto => WhitespacePolicy::Auto,
            WsArg::Strict => WhitespacePolicy::Strict,
            WsArg::Ignore => WhitespacePolicy::Ignore,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CleanupArg {
    None,
    Outputs,
    All,
}

impl From<CleanupArg> for CleanupPolicy {
    fn from(arg: CleanupArg) -> Self {
        match arg {
            CleanupArg::None => CleanupPolicy::None,
            CleanupArg::Outputs => CleanupPolicy::Outputs,
            CleanupArg::All => CleanupPolicy::All,
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let success = match cli.command {
        Commands::Run {
            bin,
            tests,
            src,
            config: config_path,
            time,
            ws,
            float_tol,
            ignore_case,
            stop_on_fail,
            enforce_limits,
            cleanup: cleanup_arg,
            context,
            no_mark_ws,
            no_color,
            report,
        } => {
            let mut judge_config = config::load_default(config_path.as_deref())?;
            if let Some(ms) = config::adopt_source_header(&mut judge_config, &src)? {
                console::note(&format!("Using time limit {} ms from {}", ms, src.display()));
            }

            let overrides = ConfigOverrides {
                time_limit_s: time,
                whitespace: ws.map(Into::into),
                case_insensitive: ignore_case,
                numeric_tolerance: float_tol,
                enforce_memory: enforce_limits,
                stop_on_fail,
                context_lines: context,
                no_mark_whitespace: no_mark_ws,
                cleanup: cleanup_arg.map(Into::into),
            };
            overrides.apply(&mut judge_config);
            config::validate(&judge_config)?;
            debug!(?judge_config, "Effective configuration");

            let render = RenderConfig::detect(judge_config.mark_whitespace, judge_config.context_lines, no_color);
            colored::control::set_override(render.color);

            let judge = Judge::new(&bin, &tests, judge_config, render)?;
            let summary = judge.run_all().await?;
            if let Some(path) = report {
                executor::write_report(&summary, &path)?;
                console::note(&format!("Report written to {}", path.display()));
            }
            summary.is_success()
        }

        Commands::Interact {
            solution,
            interactor,
            time,
            no_color,
        } => {
            let limit = config::check_time_limit(time)?;
            let render = RenderConfig::detect(false, 0, no_color);
            colored::control::set_override(render.color);

            console::step(&format!(
                "Interactive: {} <-> {} (TL {:.2}s)",
                solution.display(),
                interactor.display(),
                time
            ));
            let report = interactive::run_interactive(&solution, &interactor, limit).await?;
            interactive::print_report(&report, limit);
            report.verdict == InteractiveVerdict::Accepted
        }

        Commands::Stress {
            generator,
            solution,
            brute,
            iterations,
            config: config_path,
            time,
            ws,
            float_tol,
            ignore_case,
            log,
            no_log,
            save_input,
            no_mark_ws,
            no_color,
        } => {
            let mut judge_config = config::load_default(config_path.as_deref())?;
            let overrides = ConfigOverrides {
                time_limit_s: time,
                whitespace: ws.map(Into::into),
                case_insensitive: ignore_case,
                numeric_tolerance: float_tol,
                no_mark_whitespace: no_mark_ws,
                ..ConfigOverrides::default()
            };
            overrides.apply(&mut judge_config);
            config::validate(&judge_config)?;

            let render = RenderConfig::detect(judge_config.mark_whitespace, judge_config.context_lines, no_color);
            colored::control::set_override(render.color);

            let options = StressOptions {
                iterations,
                time_limit: config::check_time_limit(judge_config.default_time_limit_s)?,
                whitespace: judge_config.whitespace,
                case_insensitive: judge_config.case_insensitive,
                numeric_tolerance: judge_config.numeric_tolerance,
                log_path: (!no_log).then_some(log),
                save_input,
            };
            console::step(&format!(
                "Stress: {} vs {} on {} input(s) from {}",
                solution.display(),
                brute.display(),
                iterations,
                generator.display()
            ));
            let tester = StressTester::new(&generator, &solution, &brute, options.clone())?;
            let outcome = tester.run().await?;
            stress::print_outcome(&outcome, &options, &render);
            outcome.is_success()
        }

        Commands::Clean {
            bin,
            tests,
            config: config_path,
            cleanup: cleanup_arg,
        } => {
            let judge_config = config::load_default(config_path.as_deref())?;
            let policy = cleanup_arg.map(CleanupPolicy::from).unwrap_or(judge_config.cleanup);
            console::step(&format!("Cleanup: {}", policy));
            let removed = cleanup::clean_directory(&tests, &bin, policy);
            cleanup::print_removed(&removed);
            true
        }
    };

    info!(success, "cpjudge finished");
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
