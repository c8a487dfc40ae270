//! Reverie offline renderer
//!
//! Usage:
//!   rv-render -o out.wav                      - Render an impulse response
//!   rv-render -i dry.wav -o wet.wav           - Process a WAV file
//!   rv-render -o out.wav --settings hall.json - Start from a saved settings file
//!   rv-render --layout                        - Print the parameter table as JSON

mod render;
mod wav;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use rv_core::{PARAM_LAYOUT, ParamId, ParamStore, ProcessSpec, Settings, descriptor_by_name};
use rv_dsp::ReverbEngine;
use rv_dsp::decorrelation::Decorrelation;

use crate::render::{impulse, render, with_tail};
use crate::wav::{WavAudio, load_wav, write_wav};

#[derive(Parser)]
#[command(name = "rv-render", about = "Render audio through the Reverie FDN reverb")]
struct Cli {
    /// Input WAV; renders a unit impulse when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output WAV (32-bit float)
    #[arg(short, long, required_unless_present = "layout")]
    output: Option<PathBuf>,

    /// JSON settings file; missing fields keep their defaults
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Override any parameter by name, e.g. --set "Pre-Delay=45"
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<String>,

    /// Feedback decay (0 to 0.999)
    #[arg(long)]
    decay: Option<f64>,

    /// Pre-delay in milliseconds
    #[arg(long)]
    pre_delay: Option<f64>,

    /// Diffusion stages (0 to 8)
    #[arg(long)]
    diffusion_steps: Option<u32>,

    /// Wet level (0 to 1)
    #[arg(long)]
    wet: Option<f64>,

    /// Dry level (0 to 1)
    #[arg(long)]
    dry: Option<f64>,

    /// Output gain (0 to 1)
    #[arg(long)]
    gain: Option<f64>,

    /// Seed for the decorrelation offsets; fresh entropy when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Frames per processing block
    #[arg(short, long, default_value_t = 512)]
    block_size: usize,

    /// Seconds of silence appended so the tail can ring out
    #[arg(short, long, default_value_t = 4.0)]
    tail: f64,

    /// Sample rate for the synthetic impulse
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Channel count for the synthetic impulse
    #[arg(long, default_value_t = 2)]
    channels: usize,

    /// Print the parameter layout as JSON and exit
    #[arg(long)]
    layout: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if cli.layout {
        let json = serde_json::to_string_pretty(&PARAM_LAYOUT[..])
            .context("serializing parameter layout")?;
        println!("{json}");
        return Ok(());
    }

    let Some(output) = cli.output.as_deref() else {
        bail!("--output is required");
    };

    let settings = resolve_settings(&cli)?;
    log::info!("settings: {settings:?}");

    let WavAudio {
        buffer,
        sample_rate,
    } = match &cli.input {
        Some(path) => load_wav(path)?,
        None => WavAudio {
            buffer: impulse(cli.channels.max(1), 1),
            sample_rate: cli.sample_rate,
        },
    };

    let tail_frames = tail_frames(cli.tail, sample_rate)?;
    let mut buffer = with_tail(buffer, tail_frames);
    let spec = ProcessSpec::new(f64::from(sample_rate), cli.block_size, buffer.num_channels());

    let decorrelation = cli.seed.map_or(Decorrelation::Entropy, Decorrelation::Seeded);
    let mut engine = ReverbEngine::new().with_decorrelation(decorrelation);
    engine
        .prepare(spec)
        .with_context(|| format!("preparing engine for {spec:?}"))?;
    log::info!(
        "{} channels at {} Hz, {} frames, offsets {:?}",
        spec.channel_count,
        sample_rate,
        buffer.frames(),
        engine.decorrelation_offsets()
    );

    let report = render(&mut engine, &spec, &settings, &mut buffer);
    engine.release();

    write_wav(output, &buffer, sample_rate)?;

    log::info!("wrote {}", output.display());
    println!("blocks:       {}", report.blocks);
    println!("peak:         {:.6} ({:.2} dBFS)", report.peak, report.peak_db);
    println!("tail (-60dB): {:.3} s", report.tail_seconds);
    if report.faults > 0 {
        log::warn!("{} blocks aborted by internal faults", report.faults);
    }
    Ok(())
}

/// Defaults, then the settings file, then typed flags, then `--set` overrides
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let store = ParamStore::new();

    if let Some(path) = &cli.settings {
        store.apply(&load_settings(path)?);
    }

    let typed = [
        (ParamId::DECAY, cli.decay),
        (ParamId::PRE_DELAY, cli.pre_delay),
        (ParamId::DIFFUSION_STEPS, cli.diffusion_steps.map(f64::from)),
        (ParamId::WET_LEVEL, cli.wet),
        (ParamId::DRY_LEVEL, cli.dry),
        (ParamId::GAIN, cli.gain),
    ];
    for (id, value) in typed {
        if let Some(value) = value {
            store.set(id, value);
        }
    }

    for assignment in &cli.overrides {
        let (id, value) = parse_override(assignment)?;
        store.set(id, value);
    }

    Ok(store.snapshot())
}

fn load_settings(path: &Path) -> Result<Settings> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Parse `NAME=VALUE`; booleans accept on/off/true/false
fn parse_override(assignment: &str) -> Result<(ParamId, f64)> {
    let Some((name, value)) = assignment.split_once('=') else {
        bail!("expected NAME=VALUE, got {assignment:?}");
    };
    let Some(desc) = descriptor_by_name(name.trim()) else {
        let names: Vec<_> = PARAM_LAYOUT.iter().map(|d| d.name).collect();
        bail!("unknown parameter {name:?}; known: {}", names.join(", "));
    };
    let value = match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" => 1.0,
        "off" | "false" => 0.0,
        other => other
            .parse::<f64>()
            .with_context(|| format!("invalid value for {}", desc.name))?,
    };
    Ok((desc.id, value))
}

fn tail_frames(seconds: f64, sample_rate: u32) -> Result<usize> {
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("tail must be a non-negative number of seconds, got {seconds}");
    }
    Ok((seconds * f64::from(sample_rate)).round() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("rv-render").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_override() {
        let (id, value) = parse_override("Pre-Delay=45").unwrap();
        assert_eq!(id, ParamId::PRE_DELAY);
        assert_eq!(value, 45.0);

        let (id, value) = parse_override("freeze mode = on").unwrap();
        assert_eq!(id, ParamId::FREEZE);
        assert_eq!(value, 1.0);

        assert!(parse_override("Decay").is_err());
        assert!(parse_override("Shimmer=1").is_err());
        assert!(parse_override("Decay=lots").is_err());
    }

    #[test]
    fn test_settings_precedence() {
        let path = std::env::temp_dir().join(format!("rv-render-settings-{}.json", std::process::id()));
        fs::write(&path, r#"{ "decay": 0.3, "wet_level": 0.9 }"#).unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let args = cli(&[
            "-o",
            "out.wav",
            "--settings",
            &path_arg,
            "--decay",
            "0.7",
            "--set",
            "Reverse=on",
        ]);
        let settings = resolve_settings(&args).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(settings.decay, 0.7);
        assert_eq!(settings.wet_level, 0.9);
        assert!(settings.reverse);
        assert_eq!(settings.pre_delay_ms, Settings::default().pre_delay_ms);
    }

    #[test]
    fn test_overrides_are_clamped() {
        let args = cli(&["-o", "out.wav", "--decay", "3.0", "--set", "Diffusion Steps=40"]);
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.decay, rv_core::MAX_DECAY);
        assert_eq!(settings.diffusion_steps, 8);
    }

    #[test]
    fn test_tail_frames() {
        assert_eq!(tail_frames(0.5, 48000).unwrap(), 24000);
        assert!(tail_frames(-1.0, 48000).is_err());
        assert!(tail_frames(f64::NAN, 48000).is_err());
    }

    #[test]
    fn test_layout_flag_needs_no_output() {
        let args = cli(&["--layout"]);
        assert!(args.layout);
        assert!(args.output.is_none());
    }
}
