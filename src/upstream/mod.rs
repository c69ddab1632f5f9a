//! Streaming transcription service connections
//!
//! `UpstreamAdapter` is the seam between a relay session and the service; the
//! Deepgram live API is the production implementation.

pub mod adapter;
pub mod deepgram;
pub mod messages;

pub use adapter::{TranscriptEvent, UpstreamAdapter, UpstreamEvent, UpstreamFactory};
pub use deepgram::{DeepgramAdapter, DeepgramFactory};
pub use messages::{LiveResponse, LiveResults, StreamControl};
