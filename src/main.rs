use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use pulse_compositor::{
    audio::BasicExtractor,
    composition::{Engine, NullSink, RenderScheduler},
    config::Config,
    modules::register_builtin_modules,
};

#[derive(Parser)]
#[command(
    name = "pulse-compositor",
    version,
    about = "Audio-reactive visual performance engine",
    long_about = "Pulse-Compositor drives a stack of compositing layers from live audio analysis \
                  and beat detection. This binary runs the engine headless against a WAV file and \
                  writes the final composited frame to an image."
)]
struct Cli {
    /// Audio file path (WAV)
    #[arg(short, long)]
    audio: PathBuf,

    /// Output image path for the final frame (PNG)
    #[arg(short, long, default_value = "output.png")]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to render (0 = the whole file)
    #[arg(short, long, default_value_t = 0)]
    frames: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting Pulse-Compositor v{}", env!("CARGO_PKG_VERSION"));
    info!("Audio: {:?}", cli.audio);
    info!("Output: {:?}", cli.output);

    // Load configuration
    let config = match cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    // Decode the audio file to mono samples
    let mut reader = hound::WavReader::open(&cli.audio)
        .with_context(|| format!("failed to open {:?}", cli.audio))?;
    let spec = reader.spec();
    info!("   Loaded: {} Hz, {} channels", spec.sample_rate, spec.channels);

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().filter_map(|s| s.ok()).collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / scale)
                .collect()
        }
    };

    let mono: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    // Build the engine with a default scene: a washed background layer and
    // a beat-reactive layer on top
    let mut config = config;
    config.audio.sample_rate = spec.sample_rate;
    let fps = config.render.fps;
    let window_size = config.audio.window_size;

    let mut engine = Engine::new(
        config,
        Box::new(BasicExtractor::new(window_size)),
        Box::new(NullSink),
    )?;
    register_builtin_modules(engine.runtime_mut().registry_mut());

    let background = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(background)?;
        layer.clearing = true;
        layer.inherit = false;
    }
    engine.add_module_to_layer("SolidWash", background, 0, true)?;

    let reactive = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(reactive)?;
        layer.clearing = true;
        layer.inherit = false;
    }
    let pulse = engine.add_module_to_layer("SpectrumPulse", reactive, 0, true)?;
    engine.feed_mut().assign(pulse_compositor::audio::FeatureAssignment {
        feature: "rms".to_string(),
        module_name: pulse.clone(),
        param: "gain".to_string(),
    });

    // Chunk the file into per-frame sample windows and drive the scheduler
    let samples_per_frame = (spec.sample_rate as f64 / fps) as usize;
    let total_frames = (mono.len() / samples_per_frame.max(1)) as u64;
    let frame_budget = if cli.frames > 0 {
        cli.frames.min(total_frames)
    } else {
        total_frames
    };

    info!("Rendering {} frames at {:.0} fps", frame_budget, fps);

    let scheduler = RenderScheduler::new(fps);
    scheduler
        .run(&mut engine, |frame| {
            if frame >= frame_budget {
                return None;
            }
            let start = frame as usize * samples_per_frame;
            let end = (start + samples_per_frame).min(mono.len());
            Some(mono[start..end].to_vec())
        })
        .await?;

    info!("Detected BPM: {:.0}", engine.tempo().bpm());

    engine
        .output()
        .save_png(&cli.output)
        .with_context(|| format!("failed to write {:?}", cli.output))?;

    info!("Final frame saved to: {:?}", cli.output);
    Ok(())
}
