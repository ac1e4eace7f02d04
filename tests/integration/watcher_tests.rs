//! Change watcher against a real directory tree.

use std::time::Duration;

use bot_supervisor::watcher::ChangeWatcher;
use bot_supervisor::AppError;
use tokio::sync::mpsc;

use super::test_helpers::{write_worker, LONG_RUNNING};

#[tokio::test]
async fn script_modification_reports_owner() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().canonicalize().expect("canonicalize");
    let entry = write_worker(&root, "echo", LONG_RUNNING);
    std::fs::create_dir_all(root.join("other")).expect("mkdir");
    std::fs::write(root.join("other/notes.txt"), "a").expect("write");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watcher = ChangeWatcher::start(&root, "sh", tx).expect("watcher");
    assert_eq!(watcher.root(), root.as_path());
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::write(root.join("other/notes.txt"), "b").expect("modify notes");
    std::fs::write(&entry, "sleep 5\n").expect("modify script");

    let owner = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("change reported in time")
        .expect("channel open");
    assert_eq!(owner, "echo");
}

#[tokio::test]
async fn missing_root_is_a_watcher_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = ChangeWatcher::start(&temp.path().join("absent"), "sh", tx);

    assert!(matches!(result, Err(AppError::Watcher(_))));
}
