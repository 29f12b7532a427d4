use crate::core::oscillator::{EnvelopePhase, EnvelopeState};
use crate::core::synth::audio::midi_note_to_freq;

/// Kick notes sit below this note number on the drum channel; everything
/// from it upwards plays the snare.
pub const SNARE_LOWEST_NOTE: u8 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    Melody,
    Kick,
    Snare,
}

impl VoiceKind {
    pub fn classify(note: u8, channel: u8, drum_channel: u8) -> Self {
        if channel != drum_channel {
            VoiceKind::Melody
        } else if note < SNARE_LOWEST_NOTE {
            VoiceKind::Kick
        } else {
            VoiceKind::Snare
        }
    }
}

/// One sounding note.
#[derive(Debug, Clone)]
pub struct Voice {
    /// Unique per note-on, so a restruck note is never mistaken for the old one.
    pub id: u64,
    pub note: u8,
    pub frequency: f64,
    pub velocity: f32,
    pub kind: VoiceKind,
    pub channel: u8,
    /// Absolute sample index at which the note started.
    pub start_sample: u64,
    pub envelope: EnvelopeState,
    /// Last pulse width the oscillator used.
    pub pulse_width: f32,
}

impl Voice {
    pub fn new(note: u8, velocity: u8, channel: u8, kind: VoiceKind, start_sample: u64) -> Self {
        Self {
            id: 0,
            note,
            frequency: midi_note_to_freq(note),
            velocity: velocity.min(127) as f32 / 127.0,
            kind,
            channel,
            start_sample,
            envelope: EnvelopeState::default(),
            pulse_width: 0.0,
        }
    }

    /// Melody voices that never got past their attack are cut on note-off.
    pub fn cuts_on_note_off(&self) -> bool {
        self.kind == VoiceKind::Melody && self.envelope.phase == EnvelopePhase::Attack
    }

    /// True when `other` is a copy of this very note instance.
    pub fn same_instance(&self, other: &Voice) -> bool {
        self.id == other.id && self.note == other.note
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_drum_channel() {
        assert_eq!(VoiceKind::classify(36, 9, 9), VoiceKind::Kick);
        assert_eq!(VoiceKind::classify(37, 9, 9), VoiceKind::Kick);
        assert_eq!(VoiceKind::classify(38, 9, 9), VoiceKind::Snare);
        assert_eq!(VoiceKind::classify(42, 9, 9), VoiceKind::Snare);
        assert_eq!(VoiceKind::classify(36, 0, 9), VoiceKind::Melody);
        assert_eq!(VoiceKind::classify(36, 9, 3), VoiceKind::Melody);
    }

    #[test]
    fn test_new_voice_starts_in_attack() {
        let voice = Voice::new(69, 127, 0, VoiceKind::Melody, 42);
        assert_eq!(voice.frequency, 440.0);
        assert_eq!(voice.velocity, 1.0);
        assert_eq!(voice.start_sample, 42);
        assert_eq!(voice.envelope.phase, EnvelopePhase::Attack);
        assert_eq!(voice.envelope.level, 0.0);
        assert!(voice.cuts_on_note_off());
    }

    #[test]
    fn test_same_instance_needs_matching_id() {
        let first = Voice { id: 1, ..Voice::new(60, 100, 0, VoiceKind::Melody, 500) };
        let restruck = Voice { id: 2, ..Voice::new(60, 100, 0, VoiceKind::Melody, 500) };
        assert!(first.same_instance(&first.clone()));
        assert!(!first.same_instance(&restruck));
    }

    #[test]
    fn test_drums_never_cut_on_note_off() {
        let kick = Voice::new(36, 100, 9, VoiceKind::Kick, 0);
        let snare = Voice::new(40, 100, 9, VoiceKind::Snare, 0);
        assert!(!kick.cuts_on_note_off());
        assert!(!snare.cuts_on_note_off());
    }
}
