use base64::Engine;
use consult_stream::protocol::{decode, encode, CodecError, InboundMessage, OutboundMessage, StatusKind};

fn round_trip_outbound(msg: OutboundMessage) {
    let wire = encode(&msg).unwrap();
    let back: OutboundMessage = decode(wire.as_bytes()).unwrap();
    assert_eq!(back, msg);
}

fn round_trip_inbound(msg: InboundMessage) {
    let wire = encode(&msg).unwrap();
    let back: InboundMessage = decode(wire.as_bytes()).unwrap();
    assert_eq!(back, msg);
}

#[test]
fn test_outbound_round_trips() {
    round_trip_outbound(OutboundMessage::Authorize {
        token: "Bearer abc123".to_string(),
    });
    round_trip_outbound(OutboundMessage::AttachSession {
        consultation_id: "consultation-1".to_string(),
        patient_id: "patient-1".to_string(),
        expert_id: "expert-1".to_string(),
        practice_id: "practice-1".to_string(),
    });
    round_trip_outbound(OutboundMessage::SessionStart {
        sample_rate: 16000,
        bit_depth: 16,
        channel_count: 1,
    });
    round_trip_outbound(OutboundMessage::audio_chunk(&[1, 2, 3, 4], 7));
    round_trip_outbound(OutboundMessage::SessionEnd {
        final_sequence_count: 42,
    });
}

#[test]
fn test_inbound_round_trips() {
    for kind in [
        StatusKind::Connected,
        StatusKind::Authenticated,
        StatusKind::Attached,
        StatusKind::Other,
    ] {
        round_trip_inbound(InboundMessage::Status { kind, error: None });
    }
    round_trip_inbound(InboundMessage::Status {
        kind: StatusKind::Error,
        error: Some("consultation not found".to_string()),
    });
    round_trip_inbound(InboundMessage::Event {
        name: "transcribing".to_string(),
    });
    round_trip_inbound(InboundMessage::Summary);
}

#[test]
fn test_wire_format_is_tagged_json() {
    let wire = encode(&OutboundMessage::audio_chunk(&[0u8; 4], 3)).unwrap();
    assert!(wire.contains("\"type\":\"audio_chunk\""));
    assert!(wire.contains("\"sequence\":3"));

    let wire = encode(&OutboundMessage::SessionStart {
        sample_rate: 16000,
        bit_depth: 16,
        channel_count: 1,
    })
    .unwrap();
    assert!(wire.contains("\"type\":\"session_start\""));
    assert!(wire.contains("\"sample_rate\":16000"));
}

#[test]
fn test_unknown_status_kind_folds_into_other() {
    let wire = r#"{"type":"status","kind":"rebalancing"}"#;
    let msg: InboundMessage = decode(wire.as_bytes()).unwrap();
    assert_eq!(
        msg,
        InboundMessage::Status {
            kind: StatusKind::Other,
            error: None,
        }
    );
}

#[test]
fn test_unknown_message_shape_is_rejected() {
    let result = decode::<InboundMessage>(b"{\"type\":\"telemetry\"}");
    assert!(matches!(result, Err(CodecError::UnknownMessageFormat)));

    let result = decode::<InboundMessage>(b"not json at all");
    assert!(matches!(result, Err(CodecError::UnknownMessageFormat)));
}

#[test]
fn test_audio_payload_round_trips_through_base64() {
    let samples: Vec<i16> = vec![100, -200, 300, -400];
    let pcm_bytes: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()).collect();

    let msg = OutboundMessage::audio_chunk(&pcm_bytes, 0);
    let wire = encode(&msg).unwrap();
    let back: OutboundMessage = decode(wire.as_bytes()).unwrap();

    let OutboundMessage::AudioChunk { payload, sequence } = back else {
        panic!("wrong message type");
    };
    assert_eq!(sequence, 0);

    let decoded_bytes = base64::engine::general_purpose::STANDARD
        .decode(&payload)
        .unwrap();
    let decoded_samples: Vec<i16> = decoded_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    assert_eq!(decoded_samples, samples);
}

#[test]
fn test_empty_chunk_is_valid() {
    let msg = OutboundMessage::audio_chunk(&[], 9);
    let wire = encode(&msg).unwrap();
    let back: OutboundMessage = decode(wire.as_bytes()).unwrap();
    let OutboundMessage::AudioChunk { payload, sequence } = back else {
        panic!("wrong message type");
    };
    assert!(payload.is_empty());
    assert_eq!(sequence, 9);
}
