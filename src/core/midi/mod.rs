mod file;
mod input;

pub use file::load_midi_file;
pub use input::MidiInputHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn,
    NoteOff,
}

/// A note event in a playable sequence.
///
/// `delta_seconds` is the time since the previous event in the sequence (or
/// since the start for the first one).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    pub kind: MidiEventKind,
    pub note: u8,
    pub velocity: u8,
    pub channel: u8,
    pub delta_seconds: f64,
}

impl MidiEvent {
    pub fn note_on(note: u8, velocity: u8, channel: u8, delta_seconds: f64) -> Self {
        Self {
            kind: MidiEventKind::NoteOn,
            note,
            velocity,
            channel,
            delta_seconds,
        }
    }

    pub fn note_off(note: u8, channel: u8, delta_seconds: f64) -> Self {
        Self {
            kind: MidiEventKind::NoteOff,
            note,
            velocity: 0,
            channel,
            delta_seconds,
        }
    }

    /// Note-offs and note-ons with velocity 0.
    pub fn is_note_off(&self) -> bool {
        self.kind == MidiEventKind::NoteOff || self.velocity == 0
    }
}

/// Sum of all deltas in `events`, in seconds.
pub fn sequence_duration(events: &[MidiEvent]) -> f64 {
    events.iter().map(|e| e.delta_seconds.max(0.0)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_note_off() {
        assert!(!MidiEvent::note_on(60, 1, 0, 0.0).is_note_off());
        assert!(MidiEvent::note_on(60, 0, 0, 0.0).is_note_off());
        assert!(MidiEvent::note_off(60, 0, 0.0).is_note_off());
    }

    #[test]
    fn test_sequence_duration() {
        let events = [
            MidiEvent::note_on(60, 100, 0, 0.0),
            MidiEvent::note_off(60, 0, 0.5),
            MidiEvent::note_on(62, 100, 0, 0.25),
        ];
        assert!((sequence_duration(&events) - 0.75).abs() < 1e-12);
        assert_eq!(sequence_duration(&[]), 0.0);
    }
}
