/// Messages sent from MIDI input callbacks to the control thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthMessage {
    NoteOn { note: u8, velocity: u8, channel: u8 },
    NoteOff { note: u8, channel: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    AllNotesOff,
}

/// Sent on every note start or stop; `active` tells whether the channel
/// (0-based) still has sounding voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelActivity {
    pub channel: u8,
    pub active: bool,
}
