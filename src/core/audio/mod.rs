//! Audio back ends that pull chunks from the synth

mod offline;
mod playback;
mod player;

pub use offline::spawn_export;
pub use playback::{list_output_devices, PlaybackDriver};
pub use player::SequencePlayer;
