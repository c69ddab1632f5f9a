use super::pcm::BYTES_PER_SAMPLE;

/// Sample rate of every frame crossing the relay (Hz)
pub const SAMPLE_RATE: u32 = 16_000;

/// Channel count of every frame crossing the relay
pub const CHANNELS: u16 = 1;

/// One sampling window of mono 16 kHz signed 16-bit little-endian PCM
///
/// Frames are forwarded verbatim; the relay never inspects or re-encodes the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of whole samples in the frame
    pub fn sample_count(&self) -> usize {
        self.data.len() / BYTES_PER_SAMPLE
    }

    /// Audio duration covered by the frame, in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.sample_count() as u64 * 1000 / SAMPLE_RATE as u64
    }
}

impl From<Vec<u8>> for AudioFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}
