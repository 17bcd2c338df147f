use keba_control::error::KebaError;

#[test]
fn rejections_are_classified() {
    assert!(KebaError::validation("current", "out of range").is_rejection());
    assert!(KebaError::reserved("out", 3).is_rejection());
    assert!(KebaError::cooldown(10).is_rejection());
    assert!(KebaError::unknown_station("garage").is_rejection());
    assert!(!KebaError::transport("refused").is_rejection());
}

#[test]
fn delivery_failures_are_classified() {
    assert!(KebaError::transport("refused").is_delivery_failure());
    assert!(KebaError::timeout("late").is_delivery_failure());
    assert!(!KebaError::invalid_state("busy").is_delivery_failure());
}

#[test]
fn codes_are_stable() {
    let cases = [
        (KebaError::validation("f", "m"), "validation_error"),
        (KebaError::reserved("out", 9), "reserved_value"),
        (KebaError::cooldown(1), "cooldown_active"),
        (KebaError::invalid_state("x"), "invalid_state"),
        (KebaError::unknown_station("x"), "unknown_station"),
        (KebaError::unknown_action("x"), "unknown_action"),
        (KebaError::transport("x"), "transport_failure"),
        (KebaError::timeout("x"), "transport_timeout"),
        (KebaError::config("x"), "config_error"),
        (KebaError::io("x"), "io_error"),
        (KebaError::generic("x"), "internal_error"),
    ];
    for (err, code) in cases {
        assert_eq!(err.code(), code, "{err}");
    }
}

#[test]
fn from_conversions() {
    let io = std::io::Error::other("disk full");
    assert!(matches!(KebaError::from(io), KebaError::Io { .. }));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(
        KebaError::from(json),
        KebaError::Serialization { .. }
    ));
}
