// Verify wire format matches what clients expect.
// These tests ensure protocol compatibility is never broken.

use conflux_core::types::UserId;
use conflux_protocol::frames::{EventEnvelope, EventFrame, InboundFrame, ResFrame, RoutingKey};
use conflux_protocol::handshake::{ConnectParams, HelloOk, ServerInfo};

#[test]
fn req_frame_round_trip() {
    let json = r#"{"type":"req","id":"abc-123","method":"chat.message.send","params":{"content":"hello"}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, "req");

    let req = frame.as_req().unwrap();
    assert_eq!(req.method, "chat.message.send");
    assert_eq!(req.id, "abc-123");
}

#[test]
fn res_ok_serialization() {
    let res = ResFrame::ok("req-1", serde_json::json!({"pong": true}));
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""type":"res""#));
    assert!(json.contains(r#""ok":true"#));
    assert!(json.contains(r#""pong":true"#));
    // error field must be absent on success
    assert!(!json.contains(r#""error""#));
}

#[test]
fn res_err_serialization() {
    let res = ResFrame::err("req-2", "unauthenticated", "bad token");
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""ok":false"#));
    assert!(json.contains(r#""unauthenticated""#));
    // payload must be absent on error
    assert!(!json.contains(r#""payload""#));
}

#[test]
fn event_frame_with_seq() {
    let ev = EventFrame::new("message.created", serde_json::json!({"seq_num": 7})).with_seq(42);
    let json = serde_json::to_string(&ev).unwrap();

    assert!(json.contains(r#""type":"event""#));
    assert!(json.contains(r#""event":"message.created""#));
    assert!(json.contains(r#""seq":42"#));
}

#[test]
fn event_frame_from_envelope_extracts_seq_num() {
    let envelope = EventEnvelope::new(
        RoutingKey::MessageCreated,
        UserId::new(),
        vec![UserId::new(), UserId::new()],
        serde_json::json!({"message_id": "m1", "seq_num": 11}),
    )
    .with_chat_id("c1");

    let frame = EventFrame::from_envelope(&envelope);
    assert_eq!(frame.event, "message.created");
    assert_eq!(frame.seq, Some(11));
}

#[test]
fn connect_params_carries_bearer_token() {
    let json = r#"{"token":"secret-123"}"#;
    let params: ConnectParams = serde_json::from_str(json).unwrap();
    assert_eq!(params.token, "secret-123");
}

#[test]
fn hello_ok_protocol_version() {
    let hello = HelloOk {
        protocol: 1,
        server: ServerInfo {
            name: "conflux".into(),
            version: "0.1.0".into(),
            node_id: "test".into(),
        },
        policy: Default::default(),
    };
    let json = serde_json::to_string(&hello).unwrap();
    assert!(json.contains(r#""protocol":1"#));
}

#[test]
fn inbound_frame_rejects_non_req() {
    let json = r#"{"type":"event","event":"typing","payload":{}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert!(frame.as_req().is_none(), "event frame must not parse as req");
}

#[test]
fn routing_key_serializes_as_dotted_wire_name() {
    let json = serde_json::to_string(&RoutingKey::ParticipantMuted).unwrap();
    assert_eq!(json, r#""participant.muted""#);
}
