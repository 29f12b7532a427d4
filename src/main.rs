use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver};

mod core;
mod messaging;
mod utils;

use crate::core::audio::{self, PlaybackDriver, SequencePlayer};
use crate::core::midi::{self, MidiInputHandler};
use crate::core::synth::SynthConfig;
use crate::core::Synth;
use crate::messaging::{ChannelActivity, MessageBus};

const USAGE: &str = "\
usage:
  chipstudio play <file.mid> [--config <file>] [--device <name>]
  chipstudio export <file.mid> <out.wav> [--config <file>]
  chipstudio live [<port>] [--config <file>] [--device <name>]
  chipstudio ports

Press Enter to stop playback or live input.
Set RUST_LOG=debug for channel activity.";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Play { midi: PathBuf, device: Option<String> },
    Export { midi: PathBuf, output: PathBuf },
    Live { port: Option<String>, device: Option<String> },
    Ports,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
struct CliArgs {
    command: Command,
    config: Option<PathBuf>,
}

fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut positional = Vec::new();
    let mut config = None;
    let mut device = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliArgs { command: Command::Help, config: None }),
            "--config" => {
                let value = args.next().ok_or_else(|| anyhow!("--config needs a file"))?;
                config = Some(PathBuf::from(value));
            },
            "--device" => {
                device = Some(args.next().ok_or_else(|| anyhow!("--device needs a name"))?);
            },
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => positional.push(arg),
        }
    }

    let Some((name, rest)) = positional.split_first() else {
        return Ok(CliArgs { command: Command::Help, config });
    };

    let command = match (name.as_str(), rest) {
        ("play", [midi]) => Command::Play { midi: midi.into(), device },
        ("export", [midi, output]) if device.is_none() => Command::Export {
            midi: midi.into(),
            output: output.into(),
        },
        ("live", [port]) => Command::Live { port: Some(port.clone()), device },
        ("live", []) => Command::Live { port: None, device },
        ("ports", []) if device.is_none() && config.is_none() => Command::Ports,
        ("help", []) => Command::Help,
        ("play" | "export" | "live" | "ports", _) => bail!("wrong arguments for '{}'", name),
        _ => bail!("unknown command '{}'", name),
    };

    Ok(CliArgs { command, config })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {}\n\n{}", err, USAGE);
            std::process::exit(2);
        },
    };

    match args.command {
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        },
        Command::Ports => list_ports(),
        Command::Play { midi, device } => play(&midi, args.config.as_deref(), device.as_deref()),
        Command::Export { midi, output } => export(&midi, &output, args.config.as_deref()),
        Command::Live { port, device } => live(port.as_deref(), args.config.as_deref(), device.as_deref()),
    }
}

fn list_ports() -> Result<()> {
    println!("MIDI inputs:");
    for name in MidiInputHandler::list_ports()? {
        println!("  {}", name);
    }
    println!("Audio outputs:");
    for name in audio::list_output_devices()? {
        println!("  {}", name);
    }
    Ok(())
}

/// Builds the configured synth with channel activity routed to the log.
fn build_synth(config: Option<&Path>) -> Result<Arc<Synth>> {
    let config = SynthConfig::load(config)?;
    let (sender, receiver) = unbounded();
    let synth = config.build_synth().with_activity_observer(sender);
    spawn_activity_logger(receiver)?;
    Ok(Arc::new(synth))
}

// Exits once the synth, and with it the sender, is dropped.
fn spawn_activity_logger(receiver: Receiver<ChannelActivity>) -> Result<()> {
    thread::Builder::new()
        .name("channel-activity".into())
        .spawn(move || {
            for activity in receiver.iter() {
                log::debug!(
                    "channel {} {}",
                    activity.channel + 1,
                    if activity.active { "on" } else { "off" }
                );
            }
        })
        .context("Failed to spawn activity logger")?;
    Ok(())
}

/// Clears `flag` when a line (or EOF) arrives on stdin.
fn spawn_stop_on_enter(flag: Arc<AtomicBool>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-stop".into())
        .spawn(move || {
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
            flag.store(false, Ordering::Release);
        })
        .context("Failed to spawn stdin watcher")?;
    Ok(())
}

fn play(path: &Path, config: Option<&Path>, device: Option<&str>) -> Result<()> {
    let events = midi::load_midi_file(path)?;
    if events.is_empty() {
        bail!("{} contains no note events", path.display());
    }
    let synth = build_synth(config)?;
    log::info!("Sequence length {}", utils::helpers::format_time(midi::sequence_duration(&events)));

    let mut driver = PlaybackDriver::new(Arc::clone(&synth));
    driver.start(device)?;

    let mut player = SequencePlayer::new(Arc::clone(&synth));
    player.play(events)?;
    spawn_stop_on_enter(player.playing_flag())?;

    player.wait();
    driver.stop();
    Ok(())
}

fn export(path: &Path, output: &Path, config: Option<&Path>) -> Result<()> {
    let events = midi::load_midi_file(path)?;
    let synth = build_synth(config)?;

    let handle = audio::spawn_export(synth, events, output.to_path_buf())?;
    let frames = handle.join()
        .map_err(|_| anyhow!("export thread panicked"))??;
    println!("{}: {} frames", output.display(), frames);
    Ok(())
}

fn live(port: Option<&str>, config: Option<&Path>, device: Option<&str>) -> Result<()> {
    let synth = build_synth(config)?;
    let bus = MessageBus::new(Arc::clone(&synth));

    let mut input = MidiInputHandler::new(bus.sender());
    let port_name = input.connect(port)?;

    let mut driver = PlaybackDriver::new(Arc::clone(&synth));
    driver.start(device)?;
    println!("Listening on '{}', press Enter to stop", port_name);

    let running = Arc::new(AtomicBool::new(true));
    spawn_stop_on_enter(Arc::clone(&running))?;
    bus.run_until(&running);

    input.disconnect();
    driver.stop();
    synth.reset();
    Ok(())
}
