//! CLI binary for notecast.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PodcastConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use notecast::{
    convert_to_file, inspect, AudioFormat, ConversionProgressCallback, PodcastConfig,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-segment
/// log lines using [indicatif]. Designed to work correctly when segments
/// complete out-of-order (concurrent synthesis).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-segment wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of segments that errored out.
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically
    /// by `on_job_start` (called before any segment is synthesized).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_job_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} segments  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Narrating");
        self.bar.reset_eta();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_segments: usize) {
        self.activate_bar(total_segments);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Synthesizing {total_segments} segments…"))
        ));
    }

    fn on_segment_start(&self, index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(format!("segment {index}"));
    }

    fn on_segment_complete(&self, index: usize, total: usize, audio_bytes: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{:>7} bytes", audio_bytes)),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_segment_error(&self, index: usize, total: usize, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.len() > 80 {
            format!("{}\u{2026}", &first_line[..79])
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, total_segments: usize, success_count: usize) {
        let failed = total_segments.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} segments narrated successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} segments narrated  ({} failed — job aborted)",
                red("✘"),
                bold(&success_count.to_string()),
                total_segments,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes document.mp3 next to the PDF)
  notecast document.pdf

  # Choose the output path and voice
  notecast document.pdf -o talk.mp3 --voice nova

  # Self-hosted OpenAI-compatible speech endpoint
  notecast --backend-url http://localhost:8880/v1/audio/speech paper.pdf

  # Smaller segments, gentler concurrency (rate-limited backends)
  notecast --max-chunk-chars 1500 --concurrency 2 book.pdf

  # Keep the spoken transcript as JSON
  notecast document.pdf --transcript document.json

  # Inspect the PDF without synthesizing (no API key needed)
  notecast --inspect document.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY        API key; also selects the OpenAI speech endpoint
                        when no backend URL is configured
  NOTECAST_TTS_URL      OpenAI-compatible speech endpoint URL
  NOTECAST_TTS_API_KEY  API key for that endpoint (falls back to OPENAI_API_KEY)

SETUP:
  1. Install ffmpeg:  apt install ffmpeg | brew install ffmpeg
  2. Set API key:     export OPENAI_API_KEY=sk-...
  3. Convert:         notecast document.pdf
"#;

/// Turn PDF documents into narrated podcast audio.
#[derive(Parser, Debug)]
#[command(
    name = "notecast",
    version,
    about = "Turn PDF documents into narrated podcast audio",
    long_about = "Extract the text of a PDF, synthesize it segment by segment through an \
OpenAI-compatible text-to-speech endpoint, and merge the clips into a single audio file \
with ffmpeg.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Output audio file. Default: the input path with the audio extension.
    #[arg(short, long, env = "NOTECAST_OUTPUT")]
    output: Option<PathBuf>,

    /// Voice identifier passed to the TTS backend.
    #[arg(long, env = "NOTECAST_VOICE", default_value = "alloy")]
    voice: String,

    /// Speaking-rate multiplier (0.25–4.0).
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// TTS model for the HTTP backend (e.g. tts-1, tts-1-hd).
    #[arg(long, env = "NOTECAST_TTS_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible speech endpoint URL.
    #[arg(long, env = "NOTECAST_TTS_URL")]
    backend_url: Option<String>,

    /// Output format: mp3 or wav.
    #[arg(long, value_enum, default_value = "mp3")]
    format: FormatArg,

    /// Maximum characters per synthesized segment.
    #[arg(long, default_value_t = 3000)]
    max_chunk_chars: usize,

    /// Number of concurrent TTS calls.
    #[arg(short, long, env = "NOTECAST_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Max retries per segment on transient TTS failures.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Muxer binary used to concatenate clips.
    #[arg(long, env = "NOTECAST_MUX_PROGRAM", default_value = "ffmpeg")]
    mux_program: String,

    /// Write the spoken transcript as JSON to this path.
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Print document metadata as JSON and exit (no synthesis).
    #[arg(long)]
    inspect: bool,

    /// Suppress the progress bar.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum FormatArg {
    Mp3,
    Wav,
}

impl From<FormatArg> for AudioFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Mp3 => AudioFormat::Mp3,
            FormatArg::Wav => AudioFormat::Wav,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Quiet by default; RUST_LOG=notecast=debug for the firehose.
            EnvFilter::new("notecast=warn")
        }))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let pdf_bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("failed to read '{}'", cli.input.display()))?;

    if cli.inspect {
        let metadata = inspect(&pdf_bytes).await?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    let format: AudioFormat = cli.format.into();
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension(format.extension()));

    let mut builder = PodcastConfig::builder()
        .voice(cli.voice.as_str())
        .speed(cli.speed)
        .format(format)
        .max_chunk_chars(cli.max_chunk_chars)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .mux_program(cli.mux_program.as_str());
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref url) = cli.backend_url {
        builder = builder.backend_url(url.as_str());
    }
    if !cli.quiet {
        builder = builder.progress_callback(CliProgressCallback::new_dynamic() as ProgressCallback);
    }
    let config = builder.build()?;

    let started = Instant::now();
    let output = convert_to_file(&pdf_bytes, &output_path, &config).await?;

    if let Some(ref transcript_path) = cli.transcript {
        let json = serde_json::to_string_pretty(&output.transcript)?;
        tokio::fs::write(transcript_path, json)
            .await
            .with_context(|| format!("failed to write '{}'", transcript_path.display()))?;
        eprintln!("{} transcript: {}", dim("·"), transcript_path.display());
    }

    eprintln!(
        "{} {}  {}",
        green("✔"),
        bold(&output_path.display().to_string()),
        dim(&format!(
            "{} segments · {} · {:.1}s of audio · {:.1}s wall clock",
            output.stats.total_segments,
            human_bytes(output.stats.artifact_bytes),
            output.stats.audio_duration_ms as f64 / 1000.0,
            started.elapsed().as_secs_f64(),
        ))
    );

    Ok(())
}

fn human_bytes(n: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
