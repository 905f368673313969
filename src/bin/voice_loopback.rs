use std::env;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use voicelink_audio::{AudioEngine, Direction, EngineConfig, FRAME_SAMPLES};

const USAGE: &str = "Usage: voice-loopback <list | monitor [--config <file>] [--seconds <n>]>";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "list" => cmd_list(),
        "monitor" => cmd_monitor(&args),
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

fn cmd_list() -> Result<()> {
    let engine = AudioEngine::with_cpal(EngineConfig::default())?;

    println!("Capture devices:");
    for name in engine.discover_devices(Direction::Capture) {
        println!("  {}", name);
    }
    println!("Playback devices:");
    for name in engine.discover_devices(Direction::Playback) {
        println!("  {}", name);
    }
    Ok(())
}

fn cmd_monitor(args: &[String]) -> Result<()> {
    let mut config_path = None;
    let mut seconds: u64 = 10;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(args.get(i).ok_or_else(|| anyhow!("--config needs a path"))?.clone());
            }
            "--seconds" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| anyhow!("--seconds needs a value"))?;
                seconds = value
                    .parse()
                    .with_context(|| format!("invalid --seconds value '{}'", value))?;
            }
            other => return Err(anyhow!("unexpected argument '{}'\n{}", other, USAGE)),
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => EngineConfig::from_file(&path)?,
        None => EngineConfig::default(),
    };

    let mut engine = AudioEngine::with_cpal(config)?;
    engine.initialize_from_config()?;
    engine.start_capture()?;
    engine.start_playback()?;

    log::info!(
        "[Monitor] Looping microphone to speaker for {}s (resample factor {:.4})",
        seconds,
        engine.resample_ratio()
    );

    let frame_period = Duration::from_millis(20);
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut frame = [0i16; FRAME_SAMPLES];
    let mut frames = 0u64;

    while Instant::now() < deadline {
        let n = engine.read_frame(&mut frame);
        if n > 0 {
            engine.write(&mut frame[..n])?;
            frames += 1;
            if frames % 50 == 0 {
                log::info!(
                    "[Monitor] level={} gain={:.2} queued={}",
                    engine.level(),
                    engine.current_gain(),
                    engine.queued_samples()
                );
            }
        }
        thread::sleep(frame_period);
    }

    engine.stop_capture()?;
    engine.stop_playback()?;

    let dropped = engine.dropped_samples();
    log::info!("[Monitor] Done after {} frames, {} capture samples dropped", frames, dropped);
    Ok(())
}
