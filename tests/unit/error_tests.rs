use bot_supervisor::AppError;

#[test]
fn display_prefixes_identify_the_failure_domain() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Spawn("bad".into()), "spawn: bad"),
        (AppError::Signal("bad".into()), "signal: bad"),
        (AppError::Http("bad".into()), "http: bad"),
        (AppError::Channel("bad".into()), "channel: bad"),
        (AppError::Sync("bad".into()), "sync: bad"),
        (AppError::Watcher("bad".into()), "watcher: bad"),
        (AppError::PathViolation("bad".into()), "path violation: bad"),
        (AppError::NotFound("bad".into()), "not found: bad"),
        (AppError::UnsupportedAction("bad".into()), "unsupported action: bad"),
        (AppError::Io("bad".into()), "io: bad"),
        (AppError::ShuttingDown("bad".into()), "shutting down: bad"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_errors_convert_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: AppError = io.into();

    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("missing")));
}

#[test]
fn toml_errors_convert_to_config_variant() {
    let parse = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    let err: AppError = parse.into();

    assert!(matches!(err, AppError::Config(_)));
}
