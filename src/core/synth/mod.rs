pub mod audio;
pub mod channel;
pub mod config;
pub mod params;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use crossbeam_channel::Sender;
use crate::core::midi::MidiEvent;
use crate::core::voice::{Voice, VoiceKind};
use crate::messaging::ChannelActivity;
use channel::{ChannelTimbre, CHANNEL_COUNT};
use params::SynthParams;

pub use config::SynthConfig;

/// Most voices that may sound at once; the oldest are dropped first.
pub const MAX_POLYPHONY: usize = 16;

pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [11025, 22050, 44100, 48000];

/// Channel-mode controller numbers handled by `control_change`.
const CC_VOLUME: u8 = 7;
const CC_PAN: u8 = 10;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Main synthesizer engine.
///
/// Shared by reference (usually behind an `Arc`) between the thread that
/// schedules notes and the thread that pulls audio. The voice map is the only
/// locked state; parameters live in atomics and the running sample counter is
/// an `AtomicU64`.
pub struct Synth {
    sample_rate: u32,
    params: SynthParams,
    channels: [ChannelTimbre; CHANNEL_COUNT],
    voices: Mutex<BTreeMap<u8, Voice>>,
    current_sample: AtomicU64,
    next_voice_id: AtomicU64,
    activity: Option<Sender<ChannelActivity>>,
}

impl Synth {
    /// Create a new synthesizer instance
    pub fn new(sample_rate: u32) -> Self {
        Synth {
            sample_rate: sample_rate.max(1),
            params: SynthParams::new(),
            channels: ChannelTimbre::table(),
            voices: Mutex::new(BTreeMap::new()),
            current_sample: AtomicU64::new(0),
            next_voice_id: AtomicU64::new(1),
            activity: None,
        }
    }

    /// Reports channel activity changes to `sender`. Sends never block.
    pub fn with_activity_observer(mut self, sender: Sender<ChannelActivity>) -> Self {
        self.activity = Some(sender);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    /// Timbre slot of a 0-based MIDI channel.
    pub fn channel(&self, index: usize) -> Option<&ChannelTimbre> {
        self.channels.get(index)
    }

    /// Handle note on event
    pub fn note_on(&self, note: u8, velocity: u8, channel: u8) {
        let note = note.min(127);
        let channel = channel.min(CHANNEL_COUNT as u8 - 1);
        let kind = VoiceKind::classify(note, channel, self.params.drum_channel());
        let voice = Voice {
            id: self.next_voice_id.fetch_add(1, Ordering::Relaxed),
            ..Voice::new(note, velocity, channel, kind, self.current_sample_index())
        };

        self.lock_voices().insert(note, voice);
        self.notify(channel, true);
    }

    /// Handle note off event.
    ///
    /// Only melody voices still in their attack are removed. Drums ring out
    /// through their decay and melody voices past attack keep sustaining
    /// until evicted or reset.
    pub fn note_off(&self, note: u8) {
        let (channel, still_active) = {
            let mut voices = self.lock_voices();
            let Some(voice) = voices.get(&note) else {
                return;
            };
            let channel = voice.channel;
            if voice.cuts_on_note_off() {
                voices.remove(&note);
            }
            (channel, voices.values().any(|v| v.channel == channel))
        };
        self.notify(channel, still_active);
    }

    /// Silences everything and rewinds the sample counter.
    pub fn all_notes_off(&self) {
        self.lock_voices().clear();
        self.current_sample.store(0, Ordering::Release);
        for channel in 0..CHANNEL_COUNT as u8 {
            self.notify(channel, false);
        }
    }

    pub fn reset(&self) {
        self.all_notes_off();
    }

    /// Apply a sequence event. A note-on with velocity 0 is a note-off.
    pub fn handle_event(&self, event: &MidiEvent) {
        if event.is_note_off() {
            self.note_off(event.note);
        } else {
            self.note_on(event.note, event.velocity, event.channel);
        }
    }

    /// Channel volume, pan and the all-off controllers; other controllers are ignored.
    pub fn control_change(&self, channel: u8, controller: u8, value: u8) {
        let Some(timbre) = self.channel(channel as usize) else {
            return;
        };
        let value = value.min(127);
        match controller {
            CC_VOLUME => timbre.set_volume(value as f32 / 127.0),
            CC_PAN => timbre.set_pan((value as f32 - 64.0) / 63.0),
            CC_ALL_SOUND_OFF | CC_ALL_NOTES_OFF => self.all_notes_off(),
            _ => log::trace!("ignoring controller {} on channel {}", controller, channel),
        }
    }

    pub fn current_sample_index(&self) -> u64 {
        self.current_sample.load(Ordering::Acquire)
    }

    /// Moves the sample counter forward, returning the new position.
    pub fn advance(&self, frames: u64) -> u64 {
        self.current_sample.fetch_add(frames, Ordering::AcqRel) + frames
    }

    pub fn voice_count(&self) -> usize {
        self.lock_voices().len()
    }

    /// Drops the oldest voices until at most `MAX_POLYPHONY` remain. Among
    /// voices that started on the same sample the earlier note-on survives.
    ///
    /// A poisoned lock skips eviction for this call only; the poison is
    /// cleared so the next chunk evicts normally.
    pub(crate) fn enforce_polyphony(&self) {
        let mut voices = match self.voices.lock() {
            Ok(voices) => voices,
            Err(_) => {
                log::warn!("voice lock poisoned, skipping polyphony check");
                self.voices.clear_poison();
                return;
            },
        };
        if voices.len() <= MAX_POLYPHONY {
            return;
        }

        let mut by_age: Vec<(u64, u64, u8)> = voices.values().map(|v| (v.start_sample, v.id, v.note)).collect();
        by_age.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for &(_, _, note) in &by_age[MAX_POLYPHONY..] {
            voices.remove(&note);
        }
    }

    /// Copy of the active voices, ordered by note number.
    pub(crate) fn voice_snapshot(&self) -> Vec<Voice> {
        self.lock_voices().values().cloned().collect()
    }

    /// Stores envelope progress of rendered copies back into voices that are
    /// still the same note instance.
    pub(crate) fn store_voice_progress(&self, rendered: &[Voice]) {
        let mut voices = self.lock_voices();
        for copy in rendered {
            if let Some(voice) = voices.get_mut(&copy.note) {
                if voice.same_instance(copy) {
                    voice.envelope = copy.envelope;
                    voice.pulse_width = copy.pulse_width;
                }
            }
        }
    }

    // The map stays consistent even if a holder panicked, so poisoning is ignored.
    fn lock_voices(&self) -> MutexGuard<'_, BTreeMap<u8, Voice>> {
        self.voices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, channel: u8, active: bool) {
        if let Some(sender) = &self.activity {
            let _ = sender.try_send(ChannelActivity { channel, active });
        }
    }
}
