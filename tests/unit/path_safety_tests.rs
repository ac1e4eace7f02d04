use std::path::Path;

use bot_supervisor::sync::path_safety::{resolve_in, validate_worker_name};
use bot_supervisor::sync::writer::{local_hash, sha256_hex, write_atomic};
use bot_supervisor::AppError;

#[test]
fn resolves_plain_and_nested_names_inside_worker_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().canonicalize().expect("canonicalize");

    let plain = resolve_in(temp.path(), "index.js").expect("valid");
    let nested = resolve_in(temp.path(), "lib/./util.js").expect("valid");

    assert_eq!(plain, root.join("index.js"));
    assert_eq!(nested, root.join("lib").join("util.js"));
}

#[test]
fn rejects_traversal() {
    let temp = tempfile::tempdir().expect("tempdir");

    let shallow = resolve_in(temp.path(), "../secret.js");
    let deep = resolve_in(temp.path(), "lib/../../secret.js");

    assert!(matches!(shallow, Err(AppError::PathViolation(_))));
    assert!(matches!(deep, Err(AppError::PathViolation(_))));
}

#[test]
fn allows_traversal_that_stays_inside() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().canonicalize().expect("canonicalize");

    let resolved = resolve_in(temp.path(), "lib/../index.js").expect("valid");

    assert_eq!(resolved, root.join("index.js"));
}

#[test]
fn rejects_absolute_and_empty_names() {
    let temp = tempfile::tempdir().expect("tempdir");

    assert!(matches!(
        resolve_in(temp.path(), "/etc/passwd"),
        Err(AppError::PathViolation(_))
    ));
    assert!(resolve_in(temp.path(), "").is_err());
    assert!(resolve_in(temp.path(), ".").is_err());
}

#[cfg(unix)]
#[test]
fn rejects_symlink_escape() {
    let outside = tempfile::tempdir().expect("outside");
    let temp = tempfile::tempdir().expect("tempdir");
    std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).expect("symlink");

    let result = resolve_in(temp.path(), "link/payload.js");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn worker_names_must_be_single_components() {
    assert!(validate_worker_name("echo").is_ok());
    assert!(validate_worker_name("relay-2").is_ok());

    for bad in ["", ".", "..", "../echo", "a/b", "/abs"] {
        assert!(
            matches!(validate_worker_name(bad), Err(AppError::PathViolation(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn sha256_hex_is_lowercase_hex() {
    assert_eq!(
        sha256_hex(b"hello"),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
}

#[test]
fn local_hash_of_missing_file_is_none() {
    let temp = tempfile::tempdir().expect("tempdir");

    assert_eq!(local_hash(&temp.path().join("missing.js")), None);
}

#[test]
fn write_atomic_creates_parents_and_replaces_content() {
    let temp = tempfile::tempdir().expect("tempdir");
    let target = temp.path().join("lib").join("util.js");

    write_atomic(&target, b"first").expect("first write");
    write_atomic(&target, b"second").expect("second write");

    assert_eq!(std::fs::read(&target).expect("read"), b"second");
    assert_eq!(local_hash(&target), Some(sha256_hex(b"second")));
    let leftovers = std::fs::read_dir(target.parent().unwrap_or(Path::new(".")))
        .expect("list")
        .count();
    assert_eq!(leftovers, 1, "no temporary files left behind");
}
