use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use drive_scope_core::{AnalysisEngine, AppConfig, SampleTap, VisualizerFrame};
use tracing_subscriber::EnvFilter;

const TICK_INTERVAL: Duration = Duration::from_millis(33);

fn main() -> drive_scope_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo(args) => run_demo(args),
        Commands::Defaults => print_defaults(),
    }
}

fn run_demo(args: DemoArgs) -> drive_scope_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(fft_size) = args.fft_size {
        config.analysis.fft_size = fft_size;
    }
    if let Some(scope_size) = args.scope_size {
        config.analysis.scope_size = scope_size;
    }

    tracing::info!(
        frequency = args.frequency,
        drive = args.drive,
        ticks = args.ticks,
        "starting demo"
    );

    let tap = Arc::new(SampleTap::from_config(&config.audio));
    tap.set_enabled(true);

    let running = Arc::new(AtomicBool::new(true));
    let producer = spawn_producer(tap.clone(), running.clone(), &config, &args);

    let mut engine = AnalysisEngine::with_config(tap, &config.analysis);
    let mut frame = VisualizerFrame::new();
    for tick in 0..args.ticks {
        thread::sleep(TICK_INTERVAL);
        engine.update_frame(&mut frame);
        if !frame.has_data {
            tracing::warn!(tick, "no analysis data");
            continue;
        }

        tracing::info!(
            tick,
            pre_peak = frame.pre.peak,
            post_peak = frame.post.peak,
            pre_crest = frame.pre.crest,
            post_crest = frame.post.crest,
            crest_change = frame.crest_change,
            delta_rms = frame.delta.rms,
            balance = frame.low_high_balance,
            "frame"
        );
    }

    running.store(false, Ordering::Relaxed);
    producer
        .join()
        .map_err(|_| drive_scope_core::DriveScopeError::msg("producer thread panicked"))?;
    tracing::info!("demo finished");
    Ok(())
}

/// Plays the part of the audio callback: a sine as the dry signal and a
/// soft-clipped copy as the processed one, pushed in real-time paced blocks.
fn spawn_producer(
    tap: Arc<SampleTap>,
    running: Arc<AtomicBool>,
    config: &AppConfig,
    args: &DemoArgs,
) -> thread::JoinHandle<()> {
    let sample_rate = config.audio.sample_rate;
    let block_size = config.audio.block_size.max(1);
    let block_period = Duration::from_secs_f64(block_size as f64 / sample_rate.max(1.0));
    let step = std::f64::consts::TAU * args.frequency / sample_rate.max(1.0);
    let drive = args.drive.max(f32::EPSILON);
    let makeup = 1.0 / drive.tanh();

    thread::spawn(move || {
        let mut pre = vec![0.0_f32; block_size];
        let mut post = vec![0.0_f32; block_size];
        let mut phase = 0.0_f64;

        while running.load(Ordering::Relaxed) {
            for (dry, wet) in pre.iter_mut().zip(post.iter_mut()) {
                *dry = phase.sin() as f32;
                *wet = (*dry * drive).tanh() * makeup;
                phase = (phase + step) % std::f64::consts::TAU;
            }
            tap.push_samples(&[&pre[..]], &[&post[..]]);
            thread::sleep(block_period);
        }
    })
}

fn print_defaults() -> drive_scope_core::Result<()> {
    println!("{}", AppConfig::default().to_json_pretty()?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Pre/post signal scope for saturation processing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Feed a synthetic signal through the tap and log analysis frames.
    Demo(DemoArgs),
    /// Print the default configuration as JSON.
    Defaults,
}

#[derive(clap::Args, Debug)]
struct DemoArgs {
    /// JSON configuration file to start from.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Frequency of the test tone in Hz.
    #[arg(short, long, default_value_t = 220.0)]
    frequency: f64,
    /// Soft-clip drive applied to the processed copy.
    #[arg(short, long, default_value_t = 4.0)]
    drive: f32,
    /// Number of analysis ticks to run.
    #[arg(short, long, default_value_t = 30)]
    ticks: u32,
    /// Overrides the configured FFT size.
    #[arg(long)]
    fft_size: Option<usize>,
    /// Overrides the configured waveform length.
    #[arg(long)]
    scope_size: Option<usize>,
}
