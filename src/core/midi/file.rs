use std::fs;
use std::path::Path;
use anyhow::{anyhow, bail, Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use super::MidiEvent;

/// Tempo assumed until the first tempo meta event, in microseconds per quarter note.
const DEFAULT_TEMPO: u32 = 500_000;

enum Timed {
    Tempo(u32),
    Note(MidiEvent),
}

/// Read a standard MIDI file into a note sequence
pub fn load_midi_file(path: &Path) -> Result<Vec<MidiEvent>> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read MIDI file {}", path.display()))?;
    let events = parse_midi(&bytes)
        .with_context(|| format!("Failed to load MIDI file {}", path.display()))?;
    log::info!("Loaded {} note events from {}", events.len(), path.display());
    Ok(events)
}

/// Parses SMF bytes into note events with deltas in seconds.
///
/// All tracks are merged on absolute ticks. Events other than notes are
/// dropped but their time is folded into the next note event. Whatever time
/// follows the last note is not represented.
pub fn parse_midi(bytes: &[u8]) -> Result<Vec<MidiEvent>> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Invalid MIDI data: {}", e))?;

    let mut timeline: Vec<(u64, Timed)> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            let timed = match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Timed::Tempo(tempo.as_int()),
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            Timed::Note(MidiEvent::note_on(key.as_int(), vel.as_int(), channel, 0.0))
                        },
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            Timed::Note(MidiEvent::note_off(key.as_int(), channel, 0.0))
                        },
                        _ => continue,
                    }
                },
                _ => continue,
            };
            timeline.push((tick, timed));
        }
    }
    // stable, so simultaneous events keep their track order
    timeline.sort_by_key(|(tick, _)| *tick);

    let seconds_per_tick = |tempo: u32| -> Result<f64> {
        match smf.header.timing {
            Timing::Metrical(ticks_per_beat) => {
                let ppq = ticks_per_beat.as_int();
                if ppq == 0 {
                    bail!("MIDI header declares 0 ticks per quarter note");
                }
                Ok(tempo as f64 / 1_000_000.0 / ppq as f64)
            },
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = fps.as_f32() as f64 * subframes as f64;
                if ticks_per_second <= 0.0 {
                    bail!("MIDI header declares 0 ticks per second");
                }
                Ok(1.0 / ticks_per_second)
            },
        }
    };

    let mut events = Vec::new();
    let mut tempo = DEFAULT_TEMPO;
    let mut last_tick = 0u64;
    let mut pending = 0.0f64;
    for (tick, timed) in timeline {
        pending += (tick - last_tick) as f64 * seconds_per_tick(tempo)?;
        last_tick = tick;
        match timed {
            Timed::Tempo(value) => tempo = value,
            Timed::Note(mut event) => {
                event.delta_seconds = pending;
                pending = 0.0;
                events.push(event);
            },
        }
    }

    Ok(events)
}
