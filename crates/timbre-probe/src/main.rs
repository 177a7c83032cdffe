//! Timbre Probe - offline driver for the conversion engine
//!
//! Plays a WAV file through the engine packet by packet, exactly as the
//! capture layer would, and prints a latency / degradation report.
//!
//! ## Usage
//!
//! ```text
//! timbre-probe <input.wav> [--model <path>] [--packet <samples>]
//!              [--config <engine.yaml>] [--bypass] [--output <out.wav>]
//! ```
//!
//! - `--model`: conversion model (`.tflite` / `.onnx`); without one every
//!   packet passes through
//! - `--packet`: samples per packet (default 480, 10 ms)
//! - `--config`: engine config (default `<config dir>/timbre/engine.yaml`)
//! - `--bypass`: disable conversion (low-power echo + dynamics path)
//! - `--output`: write the processed audio as mono 32-bit float WAV

mod report;
mod wav;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use timbre_core::config::{default_config_path, load_config};
use timbre_core::{Engine, SAMPLE_RATE};

use report::LatencyReport;

const DEFAULT_PACKET: usize = 480;

#[derive(Debug, PartialEq)]
struct Args {
    input: PathBuf,
    model: Option<PathBuf>,
    packet: usize,
    config: Option<PathBuf>,
    bypass: bool,
    output: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut input = None;
        let mut model = None;
        let mut packet = DEFAULT_PACKET;
        let mut config = None;
        let mut bypass = false;
        let mut output = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{} requires a value", flag))
            };
            match arg.as_str() {
                "--model" => model = Some(PathBuf::from(value("--model")?)),
                "--packet" => {
                    let raw = value("--packet")?;
                    packet = raw
                        .parse()
                        .with_context(|| format!("Invalid packet size: {}", raw))?;
                    if packet == 0 {
                        bail!("Packet size must be at least 1 sample");
                    }
                }
                "--config" => config = Some(PathBuf::from(value("--config")?)),
                "--output" => output = Some(PathBuf::from(value("--output")?)),
                "--bypass" => bypass = true,
                flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
                path => {
                    if input.replace(PathBuf::from(path)).is_some() {
                        bail!("Only one input file is supported");
                    }
                }
            }
        }

        Ok(Self {
            input: input.context("Missing input WAV file")?,
            model,
            packet,
            config,
            bypass,
            output,
        })
    }
}

fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path);
    if let Some(model) = &args.model {
        config.default_model = Some(model.clone());
    }
    // offline run: never touch the scheduler of the user's shell
    config.realtime.elevate_priority = false;

    let audio = wav::read_mono(&args.input)?;
    if audio.sample_rate != SAMPLE_RATE {
        log::warn!(
            "Input is {} Hz; the engine runs at {} Hz and will treat it as such",
            audio.sample_rate,
            SAMPLE_RATE
        );
    }
    log::info!(
        "Loaded {:?}: {} samples ({:.2} s)",
        args.input,
        audio.samples.len(),
        audio.samples.len() as f64 / audio.sample_rate.max(1) as f64
    );

    let budget = config.latency.budget();
    let fatal = config.latency.fatal();
    let mut engine = Engine::with_anonymous_region(config).context("Engine failed to start")?;
    if args.packet > engine.transport().capacity_samples() {
        bail!(
            "Packet of {} samples exceeds the {}-sample region",
            args.packet,
            engine.transport().capacity_samples()
        );
    }
    engine.set_conversion_enabled(!args.bypass);

    let mut report = LatencyReport::new(budget, fatal);
    let mut processed = Vec::with_capacity(audio.samples.len());
    let mut out = vec![0.0; args.packet];
    let started = Instant::now();

    for chunk in audio.samples.chunks(args.packet) {
        let out = &mut out[..chunk.len()];
        let converted = engine.process(chunk, out);
        report.record(engine.atomics().last_latency(), converted);
        processed.extend_from_slice(out);
    }

    report.transitions = engine.stability().transitions();
    report.final_mode = format!("{:?}", engine.stability().mode());

    println!("{}", report);
    println!(
        "wall time    {:.1} ms for {:.1} ms of audio",
        started.elapsed().as_secs_f64() * 1000.0,
        audio.samples.len() as f64 * 1000.0 / SAMPLE_RATE as f64
    );

    if let Some(path) = &args.output {
        wav::write_mono(path, &processed, SAMPLE_RATE)?;
        log::info!("Wrote {:?}", path);
    }
    Ok(())
}

fn main() -> Result<()> {
    // set RUST_LOG=debug for per-stage detail
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    run(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_all_flags() {
        let args = parse(&[
            "in.wav", "--model", "voice.onnx", "--packet", "256", "--bypass", "--output",
            "out.wav", "--config", "engine.yaml",
        ])
        .unwrap();
        assert_eq!(
            args,
            Args {
                input: "in.wav".into(),
                model: Some("voice.onnx".into()),
                packet: 256,
                config: Some("engine.yaml".into()),
                bypass: true,
                output: Some("out.wav".into()),
            }
        );
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["in.wav"]).unwrap();
        assert_eq!(args.packet, DEFAULT_PACKET);
        assert!(!args.bypass);
        assert!(args.model.is_none());
    }

    #[test]
    fn test_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["in.wav", "--packet"]).is_err());
        assert!(parse(&["in.wav", "--packet", "0"]).is_err());
        assert!(parse(&["in.wav", "--packet", "abc"]).is_err());
        assert!(parse(&["in.wav", "--frobnicate"]).is_err());
        assert!(parse(&["a.wav", "b.wav"]).is_err());
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        let model = dir.path().join("voice.tflite");
        std::fs::write(&model, [5u8; 1024]).unwrap();

        let tone: Vec<f32> = (0..4800).map(|i| 0.3 * (i as f32 * 0.05).sin()).collect();
        wav::write_mono(&input, &tone, SAMPLE_RATE).unwrap();

        run(Args {
            input,
            model: Some(model),
            packet: 480,
            config: Some(dir.path().join("missing.yaml")),
            bypass: false,
            output: Some(output.clone()),
        })
        .unwrap();

        let processed = wav::read_mono(&output).unwrap();
        assert_eq!(processed.samples.len(), 4800);
    }
}
