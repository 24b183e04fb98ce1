use asmbox_core::{Error, InstanceConfig, MunmapFlags, SandboxFlags};
use pretty_assertions::assert_eq;

#[test]
fn test_defaults() {
    let config = InstanceConfig::default();
    assert_eq!(config.sandbox, SandboxFlags::NONE);
    assert_eq!(config.munmap, MunmapFlags::NONE);
    assert_eq!(config.stack_limit, 128 * 1024);
    assert_eq!(config.niceness, 19);
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_json_full() {
    let config = InstanceConfig::from_json(
        r#"{"sandbox": 31, "munmap": 7, "stack_limit": 65536, "niceness": 10}"#,
    )
    .unwrap();
    assert_eq!(config.sandbox, SandboxFlags::ALL);
    assert_eq!(config.munmap, MunmapFlags::ALL);
    assert_eq!(config.stack_limit, 65536);
    assert_eq!(config.niceness, 10);
}

#[test]
fn test_from_json_partial_uses_defaults() {
    let config = InstanceConfig::from_json(r#"{"sandbox": 2}"#).unwrap();
    assert_eq!(
        config,
        InstanceConfig::new(SandboxFlags::SYSCALLS, MunmapFlags::NONE)
    );
    assert_eq!(InstanceConfig::from_json("{}").unwrap(), InstanceConfig::default());
}

#[test]
fn test_from_json_rejects_undefined_bits() {
    for json in [r#"{"sandbox": 32}"#, r#"{"sandbox": -1}"#, r#"{"munmap": 8}"#] {
        let err = InstanceConfig::from_json(json).unwrap_err();
        assert!(
            matches!(err, Error::InvalidConfiguration { .. }),
            "{json}: {err}"
        );
    }
}

#[test]
fn test_from_json_rejects_malformed() {
    let err = InstanceConfig::from_json(r#"{"sandbox": "all"}"#).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidConfiguration {
            what: "configuration",
            ..
        }
    ));
    assert!(InstanceConfig::from_json("not json").is_err());
}

#[test]
fn test_validate_ranges() {
    let mut config = InstanceConfig::default();
    config.stack_limit = 100;
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfiguration {
            what: "stack limit",
            ..
        })
    ));

    let mut config = InstanceConfig::default();
    config.niceness = 20;
    assert!(config.validate().is_err());
    config.niceness = -20;
    assert!(config.validate().is_ok());
}
