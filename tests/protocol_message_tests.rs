// Wire format tests for client control messages and Deepgram live responses

use serde_json::json;
use transcription_relay::upstream::messages::LiveError;
use transcription_relay::upstream::{LiveResponse, StreamControl};
use transcription_relay::{CaptureMode, ClientMessage, ServerMessage, TranscriptEvent};

// ============================================================================
// Client <-> relay
// ============================================================================

#[test]
fn test_client_actions_parse() {
    let start: ClientMessage = serde_json::from_str(r#"{"action":"start_microphone"}"#).unwrap();
    assert_eq!(start.capture_mode(), Some(CaptureMode::Microphone));

    let start: ClientMessage = serde_json::from_str(r#"{"action":"start_screenshare"}"#).unwrap();
    assert_eq!(start.capture_mode(), Some(CaptureMode::ScreenShare));

    let stop: ClientMessage = serde_json::from_str(r#"{"action":"stop"}"#).unwrap();
    assert_eq!(stop, ClientMessage::Stop);
    assert_eq!(stop.capture_mode(), None);
}

#[test]
fn test_unknown_or_missing_action_rejected() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"record"}"#).is_err());
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"stop"}"#).is_err());
    assert!(serde_json::from_str::<ClientMessage>("stop").is_err());
}

#[test]
fn test_extra_fields_tolerated() {
    let message: ClientMessage =
        serde_json::from_str(r#"{"action":"start_microphone","deviceId":"default"}"#).unwrap();
    assert_eq!(message, ClientMessage::StartMicrophone);
}

#[test]
fn test_start_action_for_mode() {
    assert_eq!(
        serde_json::to_value(ClientMessage::start(CaptureMode::ScreenShare)).unwrap(),
        json!({"action": "start_screenshare"})
    );
}

#[test]
fn test_server_messages_serialize() {
    assert_eq!(
        serde_json::to_value(ServerMessage::ready()).unwrap(),
        json!({"type": "status", "message": "Ready to receive audio"})
    );
    assert_eq!(
        serde_json::to_value(ServerMessage::error("nope")).unwrap(),
        json!({"type": "error", "message": "nope"})
    );

    let data = json!({"channel": {"alternatives": [{"transcript": "hi"}]}});
    assert_eq!(
        serde_json::to_value(ServerMessage::Transcript { data: data.clone() }).unwrap(),
        json!({"type": "transcript", "data": data})
    );
}

#[test]
fn test_only_ready_status_is_ready() {
    assert!(ServerMessage::ready().is_ready());
    assert!(!ServerMessage::Status {
        message: "Connecting".to_string()
    }
    .is_ready());
    assert!(!ServerMessage::error("Ready to receive audio").is_ready());
}

// ============================================================================
// Relay <-> Deepgram
// ============================================================================

#[test]
fn test_results_parse() {
    let text = r#"{
        "type": "Results",
        "channel_index": [0, 1],
        "duration": 1.5,
        "start": 0.0,
        "is_final": true,
        "speech_final": true,
        "channel": {
            "alternatives": [{
                "transcript": "hello world",
                "confidence": 0.99,
                "words": [
                    {"word": "hello", "start": 0.1, "end": 0.4, "confidence": 0.99, "punctuated_word": "Hello"},
                    {"word": "world", "start": 0.5, "end": 0.9, "confidence": 0.98}
                ]
            }]
        },
        "metadata": {"request_id": "abc"}
    }"#;

    match serde_json::from_str::<LiveResponse>(text).unwrap() {
        LiveResponse::Results(results) => {
            assert!(results.is_final);
            assert_eq!(results.duration, 1.5);
            let best = &results.channel.alternatives[0];
            assert_eq!(best.transcript, "hello world");
            assert_eq!(best.words.len(), 2);
            assert_eq!(best.words[0].punctuated_word.as_deref(), Some("Hello"));
            assert_eq!(best.words[1].punctuated_word, None);
        }
        other => panic!("expected results, got {:?}", other),
    }
}

#[test]
fn test_metadata_and_unknown_types_parse() {
    assert!(matches!(
        serde_json::from_str::<LiveResponse>(r#"{"type":"Metadata","request_id":"r1","channels":1}"#)
            .unwrap(),
        LiveResponse::Metadata(meta) if meta.request_id == "r1"
    ));
    assert!(matches!(
        serde_json::from_str::<LiveResponse>(r#"{"type":"SpeechStarted","timestamp":1.0}"#).unwrap(),
        LiveResponse::Other
    ));
}

#[test]
fn test_error_detail_prefers_description() {
    let error = LiveError {
        description: Some("bad audio".to_string()),
        message: Some("ignored".to_string()),
        variant: None,
    };
    assert_eq!(error.detail(), "bad audio");
    assert_eq!(LiveError::default().detail(), "unknown error");
}

#[test]
fn test_stream_control_serialization() {
    assert_eq!(
        serde_json::to_string(&StreamControl::KeepAlive).unwrap(),
        r#"{"type":"KeepAlive"}"#
    );
    assert_eq!(
        serde_json::to_string(&StreamControl::CloseStream).unwrap(),
        r#"{"type":"CloseStream"}"#
    );
}

#[test]
fn test_transcript_event_from_text_has_service_shape() {
    let event = TranscriptEvent::from_text("good morning", true);

    assert!(event.is_final);
    assert_eq!(event.text(), "good morning");
    assert_eq!(event.payload["type"], "Results");
    assert_eq!(event.payload["is_final"], true);
    assert_eq!(
        event.payload["channel"]["alternatives"][0]["transcript"],
        "good morning"
    );

    // The payload parses back as a service result
    let reparsed: LiveResponse = serde_json::from_value(event.payload).unwrap();
    assert!(matches!(reparsed, LiveResponse::Results(r) if r.is_final));
}
