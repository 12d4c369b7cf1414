//! Agora offline scene renderer
//!
//! Usage:
//!   agora-render --sources 4 --seconds 10 --output orbit.wav
//!   agora-render --config scene.json --mode bypass
//!
//! Renders sine-tone sources orbiting the listener through the full engine
//! (encode, rotate, binaural) and writes a 32-bit float stereo WAV.

use std::f64::consts::TAU;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use agora_spatial::{
    AmbisonicOrder, HrirBuffer, RenderingMode, RolloffModel, Scene, SceneConfig, SourceId, SourceInput,
    StreamInfo, Vec3,
};

#[derive(Parser)]
#[command(name = "agora-render", about = "Render an orbiting test scene to binaural WAV")]
struct Cli {
    /// Scene configuration (JSON); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ambisonic order (1-3)
    #[arg(long)]
    order: Option<f64>,

    /// Number of orbiting sources
    #[arg(short, long, default_value_t = 3)]
    sources: usize,

    /// Length of the render (seconds)
    #[arg(long, default_value_t = 8.0)]
    seconds: f64,

    /// Orbit radius (metres)
    #[arg(long, default_value_t = 2.0)]
    radius: f64,

    /// Source width (degrees)
    #[arg(long)]
    width: Option<f64>,

    /// Rolloff model (logarithmic, linear)
    #[arg(long)]
    rolloff: Option<String>,

    /// Rendering mode (ambisonic, direct, bypass, off)
    #[arg(long)]
    mode: Option<RenderingMode>,

    /// HRIR length in samples for the synthetic head model
    #[arg(long, default_value_t = 256)]
    hrir_length: usize,

    /// Output file
    #[arg(short, long, default_value = "agora-scene.wav")]
    output: PathBuf,
}

struct Orbiter {
    id: SourceId,
    input: SourceInput,
    frequency: f64,
    phase: f64,
    /// Orbit start angle (radians)
    offset: f64,
    /// Orbit speed (radians per second)
    speed: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    if cli.sources > config.max_sources {
        bail!("{} sources requested, scene allows {}", cli.sources, config.max_sources);
    }
    if !(cli.seconds.is_finite() && cli.seconds > 0.0) {
        bail!("render length must be positive, got {}", cli.seconds);
    }

    let sample_rate = config.sample_rate;
    let block_size = config.block_size;
    let (mut scene, _controller) = Scene::new(config).context("building scene")?;
    let order: AmbisonicOrder = scene.ambisonic_order();
    scene.set_hrir_buffer_list(&HrirBuffer::synthetic_set(order, sample_rate, cli.hrir_length));

    let mut orbiters = Vec::with_capacity(cli.sources);
    for i in 0..cli.sources {
        let (id, input) = scene
            .add_source(&StreamInfo::mono(sample_rate))
            .with_context(|| format!("adding source {i}"))?;
        scene.source_mut(id)?.set_gain(1.0 / cli.sources.max(1) as f64);
        orbiters.push(Orbiter {
            id,
            input,
            frequency: 220.0 * (1.0 + i as f64 * 0.5),
            phase: 0.0,
            offset: i as f64 * TAU / cli.sources as f64,
            speed: TAU / (6.0 + i as f64 * 2.0),
        });
    }

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&cli.output, spec)
        .with_context(|| format!("creating {}", cli.output.display()))?;

    let total_blocks = (cli.seconds * sample_rate as f64 / block_size as f64).ceil() as usize;
    let mut tone = vec![0.0f32; block_size];
    let mut left = vec![0.0f32; block_size];
    let mut right = vec![0.0f32; block_size];
    let mut peak = 0.0f32;

    log::info!(
        "rendering {} s, {} sources, order {} -> {}",
        cli.seconds,
        cli.sources,
        order.as_usize(),
        cli.output.display()
    );

    for block in 0..total_blocks {
        let t = (block * block_size) as f64 / sample_rate as f64;

        for orbiter in &mut orbiters {
            let angle = orbiter.offset + orbiter.speed * t;
            let position = Vec3::new(cli.radius * angle.cos(), cli.radius * angle.sin(), 0.3 * angle.sin());
            scene.source_mut(orbiter.id)?.set_position(position);

            let step = TAU * orbiter.frequency / sample_rate as f64;
            for sample in &mut tone {
                *sample = (0.5 * orbiter.phase.sin()) as f32;
                orbiter.phase = (orbiter.phase + step) % TAU;
            }
            let written = orbiter.input.push(&tone);
            if written < tone.len() {
                log::warn!("{}: input ring full, {} samples dropped", orbiter.id, tone.len() - written);
            }
        }

        // Slow head turn
        let yaw = 0.25 * (TAU * t / 10.0).sin();
        scene.set_listener_pose(Vec3::zeros(), &Vec3::new(yaw.cos(), yaw.sin(), 0.0), &Vec3::new(0.0, 0.0, 1.0));

        scene.process(&mut left, &mut right)?;
        for (&l, &r) in left.iter().zip(&right) {
            peak = peak.max(l.abs()).max(r.abs());
            writer.write_sample(l)?;
            writer.write_sample(r)?;
        }
    }

    writer.finalize().context("finalizing WAV")?;
    log::info!("done, peak {:.1} dBFS", 20.0 * peak.max(1e-9).log10());
    Ok(())
}

fn load_config(cli: &Cli) -> Result<SceneConfig> {
    let mut config = match &cli.config {
        Some(path) => SceneConfig::from_file(path).with_context(|| format!("reading {}", path.display()))?,
        None => SceneConfig::default(),
    };
    if let Some(order) = cli.order {
        config.ambisonic_order = order;
    }
    if let Some(width) = cli.width {
        config.source.width = width;
    }
    if let Some(name) = &cli.rolloff {
        config.source.rolloff = RolloffModel::from_name(name);
    }
    if let Some(mode) = cli.mode {
        config.rendering_mode = mode;
    }
    Ok(config)
}
