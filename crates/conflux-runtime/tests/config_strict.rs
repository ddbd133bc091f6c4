#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use conflux_runtime::config;
use conflux_runtime::path::ResultReturnPolicy;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
graph:
  nodes:
    - name: "a"
      addon: "echo"
      extention_group: "g1" # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "INVALID_ARGUMENT");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.app.uri, "localhost");
    assert_eq!(cfg.app.graph_id, "default");
    assert!(!cfg.app.one_event_loop_per_engine);
    assert_eq!(cfg.timeouts.lifecycle_phase(), Duration::from_secs(5));
    assert!(cfg.graph.nodes.is_empty());
}

#[test]
fn routes_and_policies_parse() {
    let ok = r#"
version: 1
app:
  uri: "msgpack://127.0.0.1:8001/"
graph:
  nodes:
    - name: "front"
      addon: "echo"
      extension_group: "io"
      property: { greeting: "hi" }
    - name: "b1"
      addon: "echo"
    - name: "b2"
      addon: "echo"
  connections:
    - extension: "front"
      cmd:
        - name: "hello"
          result_return_policy: first_error_or_last_ok
          dest:
            - extension: "b1"
            - extension: "b2"
      data:
        - name: "blob"
          dest:
            - extension: "b1"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let conn = &cfg.graph.connections[0];
    assert_eq!(conn.cmd[0].dest.len(), 2);
    assert_eq!(conn.cmd[0].result_return_policy, ResultReturnPolicy::FirstErrorOrLastOk);
    assert_eq!(conn.data[0].result_return_policy, ResultReturnPolicy::EachOkAndError);
    assert_eq!(cfg.graph.group_names(), vec!["io", "default"]);
    assert_eq!(cfg.graph.group_addon("io"), "default_extension_group");
}

#[test]
fn route_to_unknown_node_is_rejected() {
    let bad = r#"
version: 1
graph:
  nodes:
    - name: "a"
      addon: "echo"
  connections:
    - extension: "a"
      cmd:
        - name: "x"
          dest:
            - extension: "ghost"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn duplicate_node_is_rejected() {
    let bad = r#"
version: 1
graph:
  nodes:
    - name: "a"
      addon: "echo"
    - name: "a"
      addon: "echo"
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn non_object_property_is_rejected() {
    let bad = r#"
version: 1
graph:
  nodes:
    - name: "a"
      addon: "echo"
      property: [1, 2]
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn timeout_ranges_are_checked() {
    let bad = r#"
version: 1
timeouts:
  lifecycle_phase_ms: 5
"#;
    assert!(config::load_from_str(bad).is_err());

    let bad = r#"
version: 1
timeouts:
  out_path_us: 0
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn unsupported_version_is_rejected() {
    assert!(config::load_from_str("version: 2\n").is_err());
}
