use anyhow::{anyhow, bail, Result};
use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection};
use crate::messaging::SynthMessage;

const CLIENT_NAME: &str = "chipstudio MIDI input";

/// Handles MIDI input from connected devices
pub struct MidiInputHandler {
    connection: Option<MidiInputConnection<()>>,
    port_name: Option<String>,
    message_sender: Sender<SynthMessage>,
}

impl MidiInputHandler {
    /// Create a new MIDI input handler
    pub fn new(message_sender: Sender<SynthMessage>) -> Self {
        Self {
            connection: None,
            port_name: None,
            message_sender,
        }
    }

    /// Names of all available MIDI input ports
    pub fn list_ports() -> Result<Vec<String>> {
        let midi_in = MidiInput::new(CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to create MIDI input: {}", e))?;

        Ok(midi_in.ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    /// Connects to the first port whose name contains `pattern` (case
    /// insensitive), or to the first port at all. Returns the port name.
    pub fn connect(&mut self, pattern: Option<&str>) -> Result<String> {
        // First disconnect if already connected
        self.disconnect();

        let midi_in = MidiInput::new(CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to create MIDI input: {}", e))?;

        let wanted = pattern.map(str::to_lowercase);
        let found = midi_in.ports().into_iter().find_map(|port| {
            let name = midi_in.port_name(&port).ok()?;
            match &wanted {
                Some(wanted) if !name.to_lowercase().contains(wanted.as_str()) => None,
                _ => Some((port, name)),
            }
        });

        let Some((port, name)) = found else {
            match pattern {
                Some(pattern) => bail!("No MIDI input port matches '{}'", pattern),
                None => bail!("No MIDI input ports available"),
            }
        };

        let sender = self.message_sender.clone();
        let connection = midi_in
            .connect(&port, "chipstudio-read-input", move |_stamp, message, _| {
                if let Some(msg) = decode_message(message) {
                    sender.send(msg).ok();
                }
            }, ())
            .map_err(|e| anyhow!("Failed to connect to MIDI port '{}': {}", name, e))?;

        log::info!("Listening on MIDI port '{}'", name);
        self.connection = Some(connection);
        self.port_name = Some(name.clone());
        Ok(name)
    }

    /// Disconnect from the currently connected MIDI port
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            if let Some(name) = self.port_name.take() {
                log::info!("Disconnected from MIDI port '{}'", name);
            }
        }
    }
}

impl Drop for MidiInputHandler {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Converts raw MIDI bytes into a synth message. Only note and control
/// change messages are understood.
pub fn decode_message(message: &[u8]) -> Option<SynthMessage> {
    let (&status, data) = message.split_first()?;
    let channel = status & 0x0F;

    match (status & 0xF0, data) {
        (0x80, &[note, _, ..]) => Some(SynthMessage::NoteOff { note, channel }),
        // Note On with velocity 0 is equivalent to Note Off
        (0x90, &[note, 0, ..]) => Some(SynthMessage::NoteOff { note, channel }),
        (0x90, &[note, velocity, ..]) => Some(SynthMessage::NoteOn { note, velocity, channel }),
        (0xB0, &[controller, value, ..]) => Some(SynthMessage::ControlChange { channel, controller, value }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_notes() {
        assert_eq!(
            decode_message(&[0x90, 60, 100]),
            Some(SynthMessage::NoteOn { note: 60, velocity: 100, channel: 0 })
        );
        assert_eq!(
            decode_message(&[0x99, 36, 127]),
            Some(SynthMessage::NoteOn { note: 36, velocity: 127, channel: 9 })
        );
        assert_eq!(decode_message(&[0x83, 60, 64]), Some(SynthMessage::NoteOff { note: 60, channel: 3 }));
        assert_eq!(decode_message(&[0x90, 60, 0]), Some(SynthMessage::NoteOff { note: 60, channel: 0 }));
    }

    #[test]
    fn test_decode_control_change() {
        assert_eq!(
            decode_message(&[0xB2, 7, 90]),
            Some(SynthMessage::ControlChange { channel: 2, controller: 7, value: 90 })
        );
    }

    #[test]
    fn test_decode_ignores_other_messages() {
        assert_eq!(decode_message(&[]), None);
        assert_eq!(decode_message(&[0x90, 60]), None);
        assert_eq!(decode_message(&[0xC0, 5]), None);
        assert_eq!(decode_message(&[0xE0, 0, 64]), None);
        assert_eq!(decode_message(&[0xF8]), None);
    }

    #[test]
    fn test_disconnect_without_connection() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut handler = MidiInputHandler::new(tx);
        handler.disconnect();
        assert!(handler.connection.is_none());
    }
}
