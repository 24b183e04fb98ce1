use asmbox_core::Error;
use asmbox_core::common::SpawnStage;
use nix::errno::Errno;

#[test]
fn test_errno_mapping() {
    let cases = [
        (
            Error::InvalidConfiguration {
                what: "sandbox flags",
                value: "64".into(),
            },
            Errno::EINVAL,
        ),
        (
            Error::SpawnFailed {
                stage: SpawnStage::Seccomp,
                errno: Errno::EACCES,
            },
            Errno::EACCES,
        ),
        (Error::ProcessGone { pid: 1 }, Errno::ESRCH),
        (Error::BadAddress { address: 0 }, Errno::EFAULT),
        (
            Error::CodeTooLarge {
                len: 5000,
                capacity: 4096,
            },
            Errno::E2BIG,
        ),
    ];
    for (err, errno) in cases {
        assert_eq!(err.errno(), errno, "{err}");
    }
}

#[test]
fn test_messages() {
    let err = Error::SpawnFailed {
        stage: SpawnStage::Exec,
        errno: Errno::EPERM,
    };
    let msg = err.to_string();
    assert!(msg.contains("exec"), "{msg}");
    assert_eq!(
        Error::BadAddress { address: 0x10 }.to_string(),
        "bad address 0x10"
    );
}

#[test]
fn test_stage_codes_round_trip() {
    for code in 1..=13u8 {
        let stage = SpawnStage::from_code(code).unwrap();
        assert_eq!(stage as u8, code);
    }
    assert_eq!(SpawnStage::from_code(0), None);
    assert_eq!(SpawnStage::from_code(14), None);
}
