use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use crate::core::midi::MidiEvent;
use crate::core::synth::Synth;

/// Longest single sleep, so a stop request is noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Replays a note sequence against the synth in real time.
///
/// Due times are cumulative from the moment playback starts, so sleep
/// overshoot on one event does not delay the ones after it.
pub struct SequencePlayer {
    synth: Arc<Synth>,
    is_playing: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SequencePlayer {
    pub fn new(synth: Arc<Synth>) -> Self {
        Self {
            synth,
            is_playing: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Starts replaying `events` on a new thread, stopping any earlier playback first.
    pub fn play(&mut self, events: Vec<MidiEvent>) -> Result<()> {
        self.stop();

        let synth = Arc::clone(&self.synth);
        let is_playing = Arc::clone(&self.is_playing);
        is_playing.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("sequence-player".into())
            .spawn(move || run_sequence(&synth, &events, &is_playing))
            .context("Failed to spawn player thread");

        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            },
            Err(err) => {
                self.is_playing.store(false, Ordering::Release);
                Err(err)
            },
        }
    }

    /// Flag shared with the playback thread; clearing it stops playback.
    pub fn playing_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.is_playing)
    }

    /// Requests a stop and waits for the playback thread to finish.
    pub fn stop(&mut self) {
        self.is_playing.store(false, Ordering::Release);
        self.wait();
    }

    /// Blocks until the sequence ends or is stopped.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("sequence player thread panicked");
                self.is_playing.store(false, Ordering::Release);
                self.synth.all_notes_off();
            }
        }
    }
}

impl Drop for SequencePlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_sequence(synth: &Synth, events: &[MidiEvent], is_playing: &AtomicBool) {
    log::info!("Playing {} events", events.len());
    let start = Instant::now();
    let mut due = 0.0f64;

    for event in events {
        due += event.delta_seconds.max(0.0);
        if !sleep_until(start + Duration::from_secs_f64(due), is_playing) {
            log::info!("Playback stopped");
            break;
        }
        synth.handle_event(event);
    }

    is_playing.store(false, Ordering::Release);
    log::debug!("Silencing {} remaining voices", synth.voice_count());
    synth.all_notes_off();
    log::debug!("Player finished after {:.2} s", start.elapsed().as_secs_f64());
}

/// Sleeps until `deadline` in short slices. Returns false if `is_playing`
/// was cleared first.
fn sleep_until(deadline: Instant, is_playing: &AtomicBool) -> bool {
    loop {
        if !is_playing.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use crate::messaging::ChannelActivity;

    #[test]
    fn test_plays_sequence_to_the_end() {
        let (tx, rx) = unbounded();
        let synth = Arc::new(Synth::new(22050).with_activity_observer(tx));
        let mut player = SequencePlayer::new(Arc::clone(&synth));

        let events = vec![
            MidiEvent::note_on(36, 100, 9, 0.0),
            MidiEvent::note_on(60, 100, 0, 0.01),
            MidiEvent::note_off(60, 0, 0.01),
        ];
        let started = Instant::now();
        player.play(events).unwrap();
        player.wait();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!player.playing_flag().load(Ordering::Acquire));
        assert_eq!(synth.voice_count(), 0);

        let seen: Vec<ChannelActivity> = rx.try_iter().collect();
        assert_eq!(seen[0], ChannelActivity { channel: 9, active: true });
        assert_eq!(seen[1], ChannelActivity { channel: 0, active: true });
        assert_eq!(seen[2], ChannelActivity { channel: 0, active: false });
    }

    #[test]
    fn test_stop_cancels_long_wait() {
        let synth = Arc::new(Synth::new(22050));
        let mut player = SequencePlayer::new(Arc::clone(&synth));
        player.play(vec![
            MidiEvent::note_on(36, 100, 9, 0.0),
            MidiEvent::note_on(38, 100, 9, 30.0),
        ]).unwrap();

        let waiting = Instant::now();
        while synth.voice_count() == 0 {
            assert!(waiting.elapsed() < Duration::from_secs(5));
            thread::sleep(Duration::from_millis(1));
        }
        assert!(player.playing_flag().load(Ordering::Acquire));

        let stopping = Instant::now();
        player.stop();
        assert!(stopping.elapsed() < Duration::from_secs(1));
        assert!(!player.playing_flag().load(Ordering::Acquire));
        assert_eq!(synth.voice_count(), 0);
    }

    #[test]
    fn test_clearing_shared_flag_stops_playback() {
        let synth = Arc::new(Synth::new(22050));
        let mut player = SequencePlayer::new(Arc::clone(&synth));
        player.play(vec![MidiEvent::note_on(60, 100, 0, 30.0)]).unwrap();

        player.playing_flag().store(false, Ordering::Release);
        player.wait();
        assert_eq!(synth.voice_count(), 0);
    }
}
