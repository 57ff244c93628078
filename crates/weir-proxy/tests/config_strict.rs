#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use weir_core::WeirError;
use weir_proxy::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
ops:
  listen: "0.0.0.0:6060"
  listne: "127.0.0.1:1" # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(err, WeirError::BadRequest(_)));
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.ops.listen, "0.0.0.0:6060");
}

#[test]
fn rejects_unsupported_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert!(matches!(err, WeirError::UnsupportedVersion));
}

#[test]
fn rejects_bad_listen_addr() {
    let bad = r#"
version: 1
ops:
  listen: "not-an-addr"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(err, WeirError::BadRequest(_)));
}

#[test]
fn path_prefers_arg_then_env_then_default() {
    use std::path::PathBuf;

    let arg = Some("a.yaml".to_string());
    let env = Some("e.yaml".to_string());
    assert_eq!(config::resolve_path(arg.clone(), env.clone()), PathBuf::from("a.yaml"));
    assert_eq!(config::resolve_path(None, env), PathBuf::from("e.yaml"));
    assert_eq!(
        config::resolve_path(Some(" ".into()), Some(String::new())),
        PathBuf::from(config::DEFAULT_CONFIG_PATH)
    );
    assert_eq!(config::resolve_path(None, None), PathBuf::from("weirproxy.yaml"));
}

#[test]
fn load_from_file_reads_and_validates() {
    let dir = std::env::temp_dir().join(format!("weir-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("weirproxy.yaml");
    std::fs::write(&path, "version: 1\nops:\n  listen: \"127.0.0.1:9099\"\n").unwrap();

    let cfg = config::load_from_file(&path).unwrap();
    assert_eq!(cfg.ops.listen_addr().unwrap().port(), 9099);

    let missing = dir.join("absent.yaml");
    let err = config::load_from_file(&missing).expect_err("must fail");
    assert!(matches!(err, WeirError::Internal(_)));

    std::fs::remove_dir_all(&dir).unwrap();
}
