//! Crash monitor, heartbeat, command and restart loops.

use std::sync::Arc;
use std::time::Duration;

use bot_supervisor::models::command::ControlCommand;
use bot_supervisor::models::worker::{ControlAction, WorkerState};
use bot_supervisor::supervisor::{commands, heartbeat, monitor};
use bot_supervisor::sync::ArtifactSynchronizer;
use tokio::sync::mpsc;

use super::test_helpers::{
    bundle, eventually, supervisor_for, write_worker, FakeSource, FakeUplink, EXITS_AT_ONCE,
    LONG_RUNNING,
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn crash_monitor_keeps_reviving_a_crashing_worker() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_worker(temp.path(), "flaky", EXITS_AT_ONCE);
    let uplink = FakeUplink::connected();
    let supervisor = supervisor_for(temp.path(), true, uplink.clone()).await;
    supervisor.start("flaky").await.expect("start");

    let handle = monitor::spawn_crash_monitor(Arc::clone(&supervisor));

    let revived = eventually(WAIT, || {
        let supervisor = Arc::clone(&supervisor);
        async move {
            supervisor
                .status("flaky")
                .await
                .is_some_and(|status| status.restart_count >= 3)
        }
    })
    .await;
    assert!(revived, "monitor should restart the worker repeatedly");
    assert!(uplink.emitted().len() >= 2);

    supervisor.shutdown().await;
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("monitor exits after shutdown")
        .expect("monitor task");
}

#[tokio::test]
async fn heartbeat_loop_uses_http_while_disconnected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let uplink = FakeUplink::disconnected();
    let supervisor = supervisor_for(temp.path(), true, uplink.clone()).await;

    let handle = heartbeat::spawn_heartbeat(Arc::clone(&supervisor), Duration::from_millis(100));

    let delivered = eventually(WAIT, || {
        let uplink = Arc::clone(&uplink);
        async move { uplink.posted().len() >= 2 }
    })
    .await;
    assert!(delivered, "heartbeats should reach the http fallback");
    assert_eq!(uplink.posted()[0].name, "test-host");

    supervisor.shutdown().await;
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("heartbeat exits after shutdown")
        .expect("heartbeat task");
}

#[tokio::test]
async fn command_loop_applies_worker_and_file_commands() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_worker(temp.path(), "echo", LONG_RUNNING);
    let supervisor = supervisor_for(temp.path(), true, FakeUplink::connected()).await;
    let source = FakeSource::new();
    source.serve("2", bundle("fresh", "index.sh", LONG_RUNNING, None));
    let synchronizer = Arc::new(ArtifactSynchronizer::new(source, Arc::clone(&supervisor)));
    let (tx, rx) = mpsc::channel(8);

    let handle = commands::spawn_command_loop(Arc::clone(&supervisor), synchronizer, rx);
    tx.send(ControlCommand::Worker {
        name: "echo".into(),
        action: ControlAction::Start,
    })
    .await
    .expect("send");
    tx.send(ControlCommand::FileUpdate {
        bot_id: "2".into(),
    })
    .await
    .expect("send");

    let both_running = eventually(WAIT, || {
        let supervisor = Arc::clone(&supervisor);
        async move { supervisor.running_workers().await == ["echo", "fresh"] }
    })
    .await;
    assert!(both_running, "both commands should take effect");

    supervisor.shutdown().await;
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("command loop exits after shutdown")
        .expect("command loop task");
}

#[tokio::test]
async fn restart_consumer_coalesces_queued_changes() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_worker(temp.path(), "echo", LONG_RUNNING);
    let supervisor = supervisor_for(temp.path(), true, FakeUplink::connected()).await;
    supervisor.start("echo").await.expect("start");
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = commands::spawn_restart_consumer(Arc::clone(&supervisor), rx);
    tx.send("echo".to_owned()).expect("send");
    tx.send("ghost".to_owned()).expect("send");
    tx.send("echo".to_owned()).expect("send");

    let restarted = eventually(WAIT, || {
        let supervisor = Arc::clone(&supervisor);
        async move {
            supervisor.status("echo").await.is_some_and(|status| {
                status.restart_count == 2 && status.status == WorkerState::Running
            })
        }
    })
    .await;
    assert!(restarted, "change should restart the worker");
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        supervisor.status("echo").await.expect("registered").restart_count,
        2
    );
    assert!(!supervisor.contains("ghost").await);

    supervisor.shutdown().await;
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("consumer exits after shutdown")
        .expect("consumer task");
}
