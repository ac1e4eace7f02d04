use bot_supervisor::models::command::{ControlCommand, OutboundEvent};
use bot_supervisor::models::host::HostStatus;
use bot_supervisor::models::worker::ControlAction;
use bot_supervisor::AppError;
use chrono::{TimeZone, Utc};
use serde_json::json;

#[test]
fn decodes_bot_control() {
    let command =
        ControlCommand::decode("botControl", json!({ "botName": "echo", "action": "restart" }))
            .expect("valid command");

    assert_eq!(
        command,
        Some(ControlCommand::Worker {
            name: "echo".into(),
            action: ControlAction::Restart,
        })
    );
}

#[test]
fn rejects_unknown_action() {
    let result =
        ControlCommand::decode("botControl", json!({ "botName": "echo", "action": "explode" }));

    assert!(matches!(result, Err(AppError::UnsupportedAction(ref a)) if a == "explode"));
}

#[test]
fn rejects_bot_control_without_name() {
    let missing = ControlCommand::decode("botControl", json!({ "action": "start" }));
    let empty = ControlCommand::decode("botControl", json!({ "botName": "", "action": "start" }));
    let null = ControlCommand::decode("botControl", serde_json::Value::Null);

    assert!(matches!(missing, Err(AppError::Channel(_))));
    assert!(matches!(empty, Err(AppError::Channel(_))));
    assert!(matches!(null, Err(AppError::Channel(_))));
}

#[test]
fn decodes_file_update_with_numeric_or_string_id() {
    let numeric = ControlCommand::decode("fileUpdate", json!({ "botId": 42 })).expect("valid");
    let string = ControlCommand::decode("fileUpdate", json!({ "botId": "b-7" })).expect("valid");

    assert_eq!(
        numeric,
        Some(ControlCommand::FileUpdate {
            bot_id: "42".into()
        })
    );
    assert_eq!(
        string,
        Some(ControlCommand::FileUpdate {
            bot_id: "b-7".into()
        })
    );
}

#[test]
fn rejects_file_update_without_usable_id() {
    assert!(ControlCommand::decode("fileUpdate", json!({})).is_err());
    assert!(ControlCommand::decode("fileUpdate", json!({ "botId": true })).is_err());
    assert!(ControlCommand::decode("fileUpdate", json!({ "botId": "" })).is_err());
}

#[test]
fn ignores_unhandled_events() {
    let command = ControlCommand::decode("serverNotice", json!({ "text": "hi" })).expect("ok");

    assert_eq!(command, None);
}

#[test]
fn register_payload_identifies_host() {
    let event = OutboundEvent::Register {
        name: "garage-pi".into(),
    };

    assert_eq!(event.name(), "register");
    assert_eq!(
        event.payload(),
        json!({ "type": "raspberry", "name": "garage-pi" })
    );
}

#[test]
fn crash_payload_reports_auto_restart() {
    let timestamp = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
    let event = OutboundEvent::BotCrashed {
        bot_name: "echo".into(),
        timestamp,
    };

    let payload = event.payload();
    assert_eq!(event.name(), "bot_crashed");
    assert_eq!(payload["botName"], "echo");
    assert_eq!(payload["action"], "auto_restart");
    assert_eq!(payload["timestamp"], timestamp.to_rfc3339());
}

#[test]
fn heartbeat_payload_uses_snapshot_fields() {
    let status = HostStatus {
        name: "garage-pi".into(),
        ip_address: "10.0.0.5".into(),
        running_bots: vec!["echo".into()],
        total_bots: 2,
        uptime: 3600,
        ..HostStatus::default()
    };
    let event = OutboundEvent::Heartbeat(status);

    let payload = event.payload();
    assert_eq!(event.name(), "raspberry_heartbeat");
    assert_eq!(payload["name"], "garage-pi");
    assert_eq!(payload["ip_address"], "10.0.0.5");
    assert_eq!(payload["running_bots"], json!(["echo"]));
    assert_eq!(payload["total_bots"], 2);
    assert_eq!(payload["uptime"], 3600);
    assert!(payload.get("cpu_usage").is_some());
    assert!(payload.get("memory_usage").is_some());
    assert!(payload.get("disk_usage").is_some());
}
