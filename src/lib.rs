pub mod audio;
pub mod config;
pub mod http;
pub mod session;
pub mod upstream;

pub use audio::{
    decode_pcm16, encode_pcm16, AudioFile, AudioFrame, BufferedSource, CaptureConfig,
    CapturePipeline, CaptureStats, SampleSource,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    CaptureMode, ClientFrame, ClientMessage, CloseReason, RelaySession, ServerMessage,
    SessionId, SessionRegistry, SessionState, SessionStats,
};
pub use upstream::{
    DeepgramAdapter, DeepgramFactory, TranscriptEvent, UpstreamAdapter, UpstreamEvent,
    UpstreamFactory,
};
