//! buildlens CLI
//!
//! Analyze finished build event streams, watch running builds, and replay
//! recorded streams for testing.

#![warn(missing_docs)]
#![warn(clippy::all)]

use buildlens_core::{AnalyzerConfig, DetailLevel, DEFAULT_MAX_CAPTURE_BYTES};
use buildlens_log::WireFormat;
use buildlens_replay::{AnalysisEngine, BuildSnapshot};
use buildlens_runtime::{
    DashboardMode, Emission, EmissionSink, LiveConfig, LiveIngestor, LogLineMode, RenderMode,
    StatusLineMode,
};
use buildlens_sim::{Pacing, SimConfig, SimError, StreamSimulator};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use console::Term;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "buildlens")]
#[command(about = "buildlens - Build event stream analyzer and live monitor", long_about = None)]
struct Cli {
    /// Log output format on stderr
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a finished event file and print the snapshot as JSON
    Analyze {
        /// Path to the event file
        file: PathBuf,
        /// Wire format, detected when omitted
        #[arg(short, long)]
        format: Option<WireFormat>,
        /// Capture policy for command lines and stderr
        #[arg(short, long, default_value_t = DetailLevel::Failed)]
        detail: DetailLevel,
        /// Cap on captured text per action
        #[arg(long, default_value_t = DEFAULT_MAX_CAPTURE_BYTES)]
        max_capture_bytes: usize,
        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },
    /// Follow a growing JSON event file and render progress
    Watch {
        /// Path to the event file
        file: PathBuf,
        /// Render mode
        #[arg(short, long, value_enum, default_value_t = Mode::Dashboard)]
        mode: Mode,
        /// Render tick period in milliseconds
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,
        /// Capture policy for command lines and stderr
        #[arg(short, long, default_value_t = DetailLevel::Failed)]
        detail: DetailLevel,
    },
    /// Replay a recorded event file into another file with pacing
    Simulate {
        /// Recorded event file
        input: PathBuf,
        /// Target file, created or truncated
        output: PathBuf,
        /// Playback speed; `inf` writes without delay
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        /// Longest pause between two records in milliseconds
        #[arg(long, default_value_t = 2000)]
        max_delay_ms: u64,
        /// Fixed pause between records, overrides speed
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Input wire format, detected when omitted
        #[arg(short, long)]
        format: Option<WireFormat>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Dashboard,
    Status,
    Log,
}

impl Mode {
    fn renderer(self) -> Box<dyn RenderMode> {
        match self {
            Self::Dashboard => Box::new(DashboardMode),
            Self::Status => Box::new(StatusLineMode),
            Self::Log => Box::new(LogLineMode),
        }
    }
}

/// Terminal sink that redraws blocks and rewrites status lines in place
struct TermSink {
    term: Term,
    drawn: usize,
    open_line: bool,
}

impl TermSink {
    fn new(term: Term) -> Self {
        Self {
            term,
            drawn: 0,
            open_line: false,
        }
    }

    fn fit(&self, line: &str) -> String {
        let width = self.term.size().1 as usize;
        console::truncate_str(line, width.max(1), "…").into_owned()
    }

    fn close_line(&mut self) -> io::Result<()> {
        if self.open_line {
            self.term.write_line("")?;
            self.open_line = false;
        }
        Ok(())
    }
}

impl EmissionSink for TermSink {
    fn emit(&mut self, emission: Emission) -> io::Result<()> {
        match emission {
            Emission::Redraw(lines) => {
                if self.drawn > 0 {
                    self.term.clear_last_lines(self.drawn)?;
                }
                for line in &lines {
                    self.term.write_line(&self.fit(line))?;
                }
                self.drawn = lines.len();
            }
            Emission::Replace(line) => {
                self.term.clear_line()?;
                self.term.write_str(&self.fit(&line))?;
                self.open_line = true;
            }
            Emission::Append(line) => {
                self.close_line()?;
                self.term.write_line(&line)?;
                self.drawn = 0;
            }
        }
        Ok(())
    }
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let default = if verbose { "buildlens=debug" } else { "buildlens=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn pacing(speed: f64, max_delay_ms: u64, interval_ms: Option<u64>) -> Pacing {
    match interval_ms {
        Some(ms) => Pacing::Fixed {
            interval: Duration::from_millis(ms),
        },
        None => Pacing::Scaled {
            speed,
            max_delay: Duration::from_millis(max_delay_ms),
        },
    }
}

fn print_snapshot(snapshot: &BuildSnapshot, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    println!("{}", json);
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    match cli.command {
        Commands::Analyze {
            file,
            format,
            detail,
            max_capture_bytes,
            pretty,
        } => {
            let config = AnalyzerConfig::new()
                .with_detail(detail)
                .with_max_capture_bytes(max_capture_bytes);
            let mut engine = AnalysisEngine::new(config);
            if let Some(format) = format {
                engine = engine.with_format(format);
            }

            match engine.analyze_path(&file) {
                Ok(snapshot) => {
                    print_snapshot(&snapshot, pretty)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    if let Some(partial) = e.partial() {
                        print_snapshot(partial, pretty)?;
                    }
                    Err(e).wrap_err_with(|| format!("Analysis of {} failed", file.display()))
                }
            }
        }
        Commands::Watch {
            file,
            mode,
            tick_ms,
            detail,
        } => {
            let config = LiveConfig::new()
                .with_tick_interval(Duration::from_millis(tick_ms.max(1)))
                .with_analyzer(AnalyzerConfig::new().with_detail(detail));
            let ingestor = LiveIngestor::new(config);
            let mut renderer = mode.renderer();
            let mut sink = TermSink::new(Term::stdout());
            let cancel = cancel_on_ctrl_c();

            let outcome = ingestor
                .run(&file, renderer.as_mut(), &mut sink, cancel)
                .await?;
            sink.close_line()?;

            if let Some(error) = outcome.source_error {
                return Err(eyre!("Cannot read {}: {}", file.display(), error));
            }
            tracing::debug!(
                lines = outcome.lines,
                skipped = outcome.skipped,
                state = %outcome.state,
                "Watch finished"
            );
            match outcome.snapshot.succeeded() {
                Some(false) => Ok(ExitCode::FAILURE),
                _ => Ok(ExitCode::SUCCESS),
            }
        }
        Commands::Simulate {
            input,
            output,
            speed,
            max_delay_ms,
            interval_ms,
            format,
        } => {
            let mut config = SimConfig::new().with_pacing(pacing(speed, max_delay_ms, interval_ms));
            if let Some(format) = format {
                config = config.with_format(format);
            }
            let simulator = StreamSimulator::new(config)?;
            let cancel = cancel_on_ctrl_c();

            let report = simulator.replay_file(&input, &output, &cancel).await?;
            eprintln!(
                "Replayed {} records ({} bytes) in {:.1}s{}",
                report.records,
                report.bytes,
                report.elapsed.as_secs_f64(),
                if report.cancelled { ", interrupted" } else { "" }
            );
            match report.input_error {
                Some(error) => Err(SimError::Decode(error))
                    .wrap_err_with(|| format!("Input {} ends early", input.display())),
                None => Ok(ExitCode::SUCCESS),
            }
        }
    }
}
