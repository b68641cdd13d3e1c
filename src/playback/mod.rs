//! Playback of synthesized speech
//!
//! `AudioPlaybackManager` decodes clips with symphonia and hands them to an
//! [`AudioOutput`]; only one clip plays at a time. The `speaker` feature adds
//! a rodio output for the default device.

mod decode;
mod manager;
mod output;
#[cfg(feature = "speaker")]
mod speaker;

pub use decode::{decode, DecodedAudio};
pub use manager::{AudioPlaybackManager, PlaybackState};
pub use output::{default_output, AudioOutput, SimulatedOutput};
#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;
