pub mod capture;
pub mod file;
pub mod frame;
pub mod pcm;

pub use capture::{BufferedSource, CaptureConfig, CapturePipeline, CaptureStats, SampleSource};
pub use file::AudioFile;
pub use frame::{AudioFrame, CHANNELS, SAMPLE_RATE};
pub use pcm::{decode_pcm16, encode_pcm16, sample_to_i16};
