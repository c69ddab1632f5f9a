// Reference capture client: stream a WAV file through the relay
//
// 1. Connect to the relay and declare the capture mode
// 2. Wait for "Ready to receive audio"
// 3. Sample the file in fixed windows at real-time pace, encode to PCM, send
// 4. Print transcripts as they arrive, then send stop
//
// Usage: cargo run --bin relay-client -- --file meeting.wav

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn, Level};
use transcription_relay::audio::SAMPLE_RATE;
use transcription_relay::{
    AudioFile, BufferedSource, CaptureConfig, CaptureMode, CapturePipeline, ClientMessage,
    ServerMessage,
};

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Microphone,
    ScreenShare,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Microphone => CaptureMode::Microphone,
            ModeArg::ScreenShare => CaptureMode::ScreenShare,
        }
    }
}

#[derive(Parser)]
#[command(name = "relay-client")]
#[command(about = "Stream a WAV file to the transcription relay")]
struct Args {
    /// Relay WebSocket URL
    #[arg(short, long, default_value = "ws://localhost:3001/websocket")]
    url: String,

    /// WAV file to stream (resampled to 16kHz mono)
    #[arg(short, long)]
    file: PathBuf,

    /// Capture mode to declare
    #[arg(short, long, value_enum, default_value = "microphone")]
    mode: ModeArg,

    /// Audio window length in milliseconds
    #[arg(long, default_value = "100")]
    window_ms: u64,

    /// Seconds to wait for the relay to become ready
    #[arg(long, default_value = "15")]
    ready_timeout: u64,

    /// Seconds to keep listening for transcripts after the file ends
    #[arg(long, default_value = "3")]
    linger: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();
    let mode = CaptureMode::from(args.mode);

    let audio = AudioFile::open(&args.file)?;
    let samples = audio.to_mono_16khz()?;
    info!("Streaming {:.1}s of audio as {}", audio.duration_seconds, mode);

    let (ws, _response) = connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    info!("Connected to {}", args.url);

    let (mut write, mut read) = ws.split();
    let start = serde_json::to_string(&ClientMessage::start(mode))?;
    write.send(Message::Text(start)).await.context("Failed to send start action")?;

    let (ready_tx, mut ready_rx) = watch::channel(false);
    let reader = tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) if message.is_ready() => {
                        info!("Relay ready, streaming audio");
                        ready_tx.send_replace(true);
                    }
                    Ok(ServerMessage::Status { message }) => info!("Status: {}", message),
                    Ok(ServerMessage::Transcript { data }) => {
                        let text = data["channel"]["alternatives"][0]["transcript"]
                            .as_str()
                            .unwrap_or_default();
                        if !text.is_empty() {
                            println!("{}", text);
                        }
                    }
                    Ok(ServerMessage::Error { message }) => error!("Relay error: {}", message),
                    Err(e) => warn!("Unrecognized message from relay: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Relay connection error: {}", e);
                    break;
                }
            }
        }
        info!("Relay connection closed");
    });

    match timeout(Duration::from_secs(args.ready_timeout), ready_rx.wait_for(|ready| *ready)).await {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => anyhow::bail!("Relay closed before it was ready"),
        Err(_) => anyhow::bail!("Relay not ready after {}s", args.ready_timeout),
    }

    let capture_config = CaptureConfig {
        window_samples: (SAMPLE_RATE as u64 * args.window_ms / 1000) as usize,
        interval: Duration::from_millis(args.window_ms),
    };
    let (frame_tx, mut frame_rx) = mpsc::channel(16);
    let pipeline = CapturePipeline::new(capture_config, ready_rx);
    let capture = tokio::spawn(pipeline.run(BufferedSource::new(samples), frame_tx));

    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = write.send(Message::Binary(frame.into_bytes())).await {
            warn!("Failed to send audio: {}", e);
            break;
        }
    }
    drop(frame_rx);

    let stats = capture.await.context("Capture task panicked")?;
    info!("Sent {} frames ({} bytes)", stats.frames_sent, stats.bytes_sent);

    sleep(Duration::from_secs(args.linger)).await;

    let stop = serde_json::to_string(&ClientMessage::Stop)?;
    if let Err(e) = write.send(Message::Text(stop)).await {
        warn!("Failed to send stop: {}", e);
    }
    let _ = write.close().await;

    if timeout(Duration::from_secs(5), reader).await.is_err() {
        warn!("Relay did not close the connection in time");
    }

    Ok(())
}
