use std::time::Duration;

use bot_supervisor::control::protocol::{self, Packet};
use serde_json::json;

#[test]
fn decodes_engine_open_handshake() {
    let packet = protocol::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#)
        .expect("valid open");

    let Packet::Open(handshake) = packet else {
        panic!("expected open packet, got {packet:?}");
    };
    assert_eq!(handshake.sid, "abc");
    assert_eq!(handshake.liveness_window(), Duration::from_millis(30_000));
}

#[test]
fn decodes_engine_control_packets() {
    assert_eq!(protocol::decode("1").unwrap(), Packet::Close);
    assert_eq!(protocol::decode("2").unwrap(), Packet::Ping);
    assert_eq!(protocol::decode("3").unwrap(), Packet::Pong);
    assert_eq!(protocol::decode("6").unwrap(), Packet::Ignored);
}

#[test]
fn decodes_socket_connect_and_disconnect() {
    assert_eq!(protocol::decode(r#"40{"sid":"xyz"}"#).unwrap(), Packet::Connected);
    assert_eq!(protocol::decode("40").unwrap(), Packet::Connected);
    assert_eq!(protocol::decode("41").unwrap(), Packet::Disconnected);
    assert!(matches!(
        protocol::decode(r#"44{"message":"denied"}"#).unwrap(),
        Packet::ConnectError(_)
    ));
}

#[test]
fn decodes_event_with_payload() {
    let packet = protocol::decode(r#"42["botControl",{"botName":"echo","action":"stop"}]"#)
        .expect("valid event");

    assert_eq!(
        packet,
        Packet::Event {
            name: "botControl".into(),
            payload: json!({ "botName": "echo", "action": "stop" }),
        }
    );
}

#[test]
fn decodes_event_with_namespace_and_ack_id() {
    let packet = protocol::decode(r#"42/admin,7["fileUpdate",{"botId":3}]"#).expect("valid event");

    assert_eq!(
        packet,
        Packet::Event {
            name: "fileUpdate".into(),
            payload: json!({ "botId": 3 }),
        }
    );
}

#[test]
fn event_without_argument_has_null_payload() {
    let packet = protocol::decode(r#"42["ping_check"]"#).expect("valid event");

    assert_eq!(
        packet,
        Packet::Event {
            name: "ping_check".into(),
            payload: serde_json::Value::Null,
        }
    );
}

#[test]
fn rejects_empty_and_malformed_frames() {
    assert!(protocol::decode("").is_err());
    assert!(protocol::decode("42[not json").is_err());
    assert!(protocol::decode("42[12]").is_err());
    assert!(protocol::decode("0{broken").is_err());
}

#[test]
fn encodes_events_for_default_namespace() {
    let frame = protocol::encode_event("register", &json!({ "type": "raspberry", "name": "pi" }));

    assert!(frame.starts_with(r#"42["register",{"#));
    assert_eq!(
        protocol::decode(&frame).unwrap(),
        Packet::Event {
            name: "register".into(),
            payload: json!({ "type": "raspberry", "name": "pi" }),
        }
    );
}

#[test]
fn channel_url_maps_scheme_and_path() {
    assert_eq!(
        protocol::channel_url("http://localhost:3001").unwrap(),
        "ws://localhost:3001/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(
        protocol::channel_url("https://control.example.com/base/").unwrap(),
        "wss://control.example.com/base/socket.io/?EIO=4&transport=websocket"
    );
    assert!(protocol::channel_url("ftp://example.com").is_err());
    assert!(protocol::channel_url("nonsense").is_err());
}
