//! Client-side capture pipeline
//!
//! Samples a source at a fixed interval, encodes each window to PCM and hands the
//! frame to the transport only once the relay has reported it is ready. Windows
//! sampled before that are skipped, mirroring the relay's own pre-ready drop rule.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::frame::AudioFrame;
use super::pcm::encode_pcm16;

/// Something that yields fixed-size windows of normalized samples
pub trait SampleSource: Send {
    /// Next window of exactly `len` samples, or `None` once the source is exhausted
    fn next_window(&mut self, len: usize) -> Option<Vec<f32>>;
}

/// In-memory sample source; the last partial window is zero-padded
pub struct BufferedSource {
    samples: Vec<f32>,
    position: usize,
}

impl BufferedSource {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }
}

impl SampleSource for BufferedSource {
    fn next_window(&mut self, len: usize) -> Option<Vec<f32>> {
        if len == 0 || self.position >= self.samples.len() {
            return None;
        }
        let end = (self.position + len).min(self.samples.len());
        let mut window = self.samples[self.position..end].to_vec();
        window.resize(len, 0.0);
        self.position = end;
        Some(window)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Samples per window
    pub window_samples: usize,
    /// Time between two samplings
    pub interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_samples: 1600,               // 100ms at 16kHz
            interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub windows_sampled: u64,
    pub windows_skipped: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

pub struct CapturePipeline {
    config: CaptureConfig,
    ready: watch::Receiver<bool>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig, ready: watch::Receiver<bool>) -> Self {
        Self { config, ready }
    }

    /// Run until the source is exhausted or the frame receiver goes away
    pub async fn run<S: SampleSource>(
        self,
        mut source: S,
        frames: mpsc::Sender<AudioFrame>,
    ) -> CaptureStats {
        let mut stats = CaptureStats::default();
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let Some(window) = source.next_window(self.config.window_samples) else {
                break;
            };
            stats.windows_sampled += 1;

            if !*self.ready.borrow() {
                stats.windows_skipped += 1;
                continue;
            }

            let frame = AudioFrame::new(encode_pcm16(&window));
            let len = frame.len() as u64;
            if frames.send(frame).await.is_err() {
                debug!("Frame receiver closed, stopping capture");
                break;
            }
            stats.frames_sent += 1;
            stats.bytes_sent += len;
        }

        info!(
            "Capture finished: {} windows sampled, {} sent, {} skipped before ready",
            stats.windows_sampled, stats.frames_sent, stats.windows_skipped
        );

        stats
    }
}
