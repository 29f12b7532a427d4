use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use crate::core::synth::Synth;
use super::SynthMessage;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const MAX_BATCH: usize = 64;

/// MessageBus carries note and controller messages from input callbacks to the synth
pub struct MessageBus {
    sender: Sender<SynthMessage>,
    receiver: Receiver<SynthMessage>,
    synth: Arc<Synth>,
}

impl MessageBus {
    /// Create a new message bus connected to the synth engine
    pub fn new(synth: Arc<Synth>) -> Self {
        let (sender, receiver) = unbounded();

        MessageBus {
            sender,
            receiver,
            synth,
        }
    }

    /// Get a sender that can be cloned and moved into input callbacks
    pub fn sender(&self) -> Sender<SynthMessage> {
        self.sender.clone()
    }

    /// Process pending messages, at most `max_messages` of them. Returns how many were handled.
    pub fn process_messages(&self, max_messages: usize) -> usize {
        let mut count = 0;

        while count < max_messages {
            let Ok(msg) = self.receiver.try_recv() else {
                break;
            };
            count += 1;

            self.handle_message(msg);
        }

        count
    }

    /// Handles messages until `running` is cleared.
    pub fn run_until(&self, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(msg) => {
                    self.handle_message(msg);
                    self.process_messages(MAX_BATCH);
                },
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle_message(&self, msg: SynthMessage) {
        match msg {
            SynthMessage::NoteOn { note, velocity, channel } => {
                self.synth.note_on(note, velocity, channel);
            },
            SynthMessage::NoteOff { note, channel } => {
                log::trace!("note off {} on channel {}", note, channel);
                self.synth.note_off(note);
            },
            SynthMessage::ControlChange { channel, controller, value } => {
                self.synth.control_change(channel, controller, value);
            },
            SynthMessage::AllNotesOff => {
                self.synth.all_notes_off();
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_process_messages_applies_to_synth() {
        let synth = Arc::new(Synth::new(44100));
        let bus = MessageBus::new(Arc::clone(&synth));
        let sender = bus.sender();

        sender.send(SynthMessage::NoteOn { note: 60, velocity: 100, channel: 0 }).unwrap();
        sender.send(SynthMessage::NoteOn { note: 36, velocity: 100, channel: 9 }).unwrap();
        sender.send(SynthMessage::ControlChange { channel: 0, controller: 7, value: 127 }).unwrap();

        assert_eq!(bus.process_messages(16), 3);
        assert_eq!(synth.voice_count(), 2);
        assert_eq!(synth.channel(0).unwrap().snapshot().volume, 1.0);

        sender.send(SynthMessage::NoteOff { note: 60, channel: 0 }).unwrap();
        sender.send(SynthMessage::AllNotesOff).unwrap();
        bus.process_messages(16);
        assert_eq!(synth.voice_count(), 0);
    }

    #[test]
    fn test_process_messages_respects_limit() {
        let synth = Arc::new(Synth::new(44100));
        let bus = MessageBus::new(Arc::clone(&synth));
        for note in 40..50 {
            bus.sender().send(SynthMessage::NoteOn { note, velocity: 90, channel: 9 }).unwrap();
        }

        assert_eq!(bus.process_messages(4), 4);
        assert_eq!(synth.voice_count(), 4);
        assert_eq!(bus.process_messages(100), 6);
        assert_eq!(synth.voice_count(), 10);
    }

    #[test]
    fn test_run_until_stops_when_flag_clears() {
        let synth = Arc::new(Synth::new(44100));
        let bus = MessageBus::new(Arc::clone(&synth));
        let sender = bus.sender();
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let running = Arc::clone(&running);
            thread::spawn(move || bus.run_until(&running))
        };

        sender.send(SynthMessage::NoteOn { note: 36, velocity: 100, channel: 9 }).unwrap();
        while synth.voice_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        running.store(false, Ordering::Release);
        worker.join().unwrap();

        assert_eq!(synth.voice_count(), 1);
    }
}
