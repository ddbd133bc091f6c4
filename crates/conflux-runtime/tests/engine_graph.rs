#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conflux_core::msg::{Cmd, CmdResult, Data, Loc, Msg, StatusCode};
use conflux_core::{ErrorCode, Value};
use conflux_runtime::addon::{extension_addon, AddonKind, AddonStore};
use conflux_runtime::extension::{EnvProxy, NotifyMode};
use conflux_runtime::{builtin, config, App, Extension, ExtensionEnv};

async fn start(yaml: &str, extra: impl FnOnce(&AddonStore)) -> App {
    let cfg = config::load_from_str(yaml).expect("config must parse");
    let store = AddonStore::new();
    builtin::register_builtin(&store).unwrap();
    extra(&store);
    App::start(cfg, store).await.expect("app must start")
}

fn cmd_to(name: &str, extension: &str) -> Cmd {
    let mut cmd = Cmd::new(name);
    cmd.add_dest(Loc::extension(extension));
    cmd
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn detail(result: &CmdResult) -> String {
    result
        .detail()
        .and_then(|d| d.as_str().ok())
        .unwrap_or_default()
        .to_owned()
}

/// Fans a `work` command out along its routes and answers the client once
/// every destination answered, with the number of results seen.
struct Relay;

impl Extension for Relay {
    fn on_cmd(&mut self, env: &mut ExtensionEnv<'_>, cmd: Cmd) {
        let seen = AtomicUsize::new(0);
        let original = Mutex::new(Some(cmd));
        env.send_cmd_with(Cmd::new("work"), move |env, result| {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            if !result.is_completed() {
                return;
            }
            if let Some(cmd) = original.lock().unwrap().take() {
                let mut reply = CmdResult::for_cmd(StatusCode::Ok, &cmd);
                reply.set_property("results", n as u64).unwrap();
                env.return_result(reply).unwrap();
            }
        })
        .unwrap();
    }
}

/// Keeps every command and never answers.
#[derive(Default)]
struct Sink {
    held: Vec<Cmd>,
}

impl Extension for Sink {
    fn on_cmd(&mut self, _env: &mut ExtensionEnv<'_>, cmd: Cmd) {
        self.held.push(cmd);
    }
}

struct Collector(Arc<Mutex<Vec<String>>>);

impl Extension for Collector {
    fn on_data(&mut self, _env: &mut ExtensionEnv<'_>, data: Data) {
        self.0.lock().unwrap().push(data.name().to_owned());
    }
}

#[tokio::test]
async fn client_command_is_echoed() {
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "a"
      addon: "echo"
"#,
        |_| {},
    )
    .await;

    let conn = app.connect().unwrap();
    let mut cmd = cmd_to("hello", "a");
    cmd.set_property("greeting", "hi").unwrap();
    let result = conn.send_cmd(cmd).await.unwrap();

    assert_eq!(result.status_code(), StatusCode::Ok);
    assert!(result.is_final());
    assert!(result.is_completed());
    assert_eq!(result.peek_property("greeting").unwrap(), Some(Value::from("hi")));
    assert_eq!(conn.pending(), 0);

    app.close().await.unwrap();
}

#[tokio::test]
async fn dedicated_engine_loop_routes_the_same() {
    let app = start(
        r#"
version: 1
app:
  one_event_loop_per_engine: true
graph:
  nodes:
    - name: "a"
      addon: "echo"
      extension_group: "g1"
"#,
        |_| {},
    )
    .await;

    let conn = app.connect().unwrap();
    let result = conn.send_cmd(cmd_to("ping", "a")).await.unwrap();
    assert!(result.is_ok());
    app.close().await.unwrap();
    app.close().await.unwrap();
}

#[tokio::test]
async fn fan_out_reaches_every_destination() {
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "front"
      addon: "relay"
    - name: "b1"
      addon: "echo"
      extension_group: "back"
    - name: "b2"
      addon: "echo"
      extension_group: "back"
    - name: "b3"
      addon: "echo"
  connections:
    - extension: "front"
      cmd:
        - name: "work"
          dest:
            - extension: "b1"
            - extension: "b2"
            - extension: "b3"
"#,
        |store| {
            store
                .register(AddonKind::Extension, "relay", extension_addon(|_name: &str| Relay), None)
                .unwrap();
        },
    )
    .await;

    let conn = app.connect().unwrap();
    let result = conn.send_cmd(cmd_to("job", "front")).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(result.peek_property("results").unwrap(), Some(Value::from(3u64)));

    app.close().await.unwrap();
}

#[tokio::test]
async fn unknown_extension_answers_with_error() {
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "a"
      addon: "echo"
"#,
        |_| {},
    )
    .await;

    let conn = app.connect().unwrap();
    let result = conn.send_cmd(cmd_to("hello", "ghost")).await.unwrap();
    assert_eq!(result.status_code(), StatusCode::Error);
    assert!(result.is_completed());
    assert!(detail(&result).contains("extension not found"), "{}", detail(&result));

    app.close().await.unwrap();
}

#[tokio::test]
async fn closing_a_connection_fails_every_pending_command() {
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "sink"
      addon: "sink"
"#,
        |store| {
            store
                .register(AddonKind::Extension, "sink", extension_addon(|_name: &str| Sink::default()), None)
                .unwrap();
        },
    )
    .await;

    let conn = app.connect().unwrap();
    let results = Arc::new(Mutex::new(Vec::new()));
    for i in 0..5 {
        let results = results.clone();
        conn.send_cmd_with_handler(
            cmd_to(&format!("c{i}"), "sink"),
            Arc::new(move |r: CmdResult| results.lock().unwrap().push(r)),
        )
        .unwrap();
    }
    assert_eq!(conn.pending(), 5);

    assert_eq!(conn.close(), 5);
    assert!(conn.is_closed());
    let results = results.lock().unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.status_code() == StatusCode::Error && r.is_completed()));

    let err = conn.send_cmd_with_handler(cmd_to("late", "sink"), Arc::new(|_: CmdResult| {})).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Closed);
    drop(results);

    app.close().await.unwrap();
}

#[tokio::test]
async fn data_is_forwarded_along_graph_routes() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "a"
      addon: "echo"
    - name: "collector"
      addon: "collector"
      extension_group: "other"
  connections:
    - extension: "a"
      data:
        - name: "blob"
          dest:
            - extension: "collector"
"#,
        move |store| {
            store
                .register(
                    AddonKind::Extension,
                    "collector",
                    extension_addon(move |_name: &str| Collector(sink.clone())),
                    None,
                )
                .unwrap();
        },
    )
    .await;

    let conn = app.connect().unwrap();
    let mut data = Data::new("blob");
    data.set_buf(vec![1u8, 2, 3]);
    data.add_dest(Loc::extension("a"));
    conn.send_data(data).unwrap();

    wait_until(|| seen.lock().unwrap().len() == 1).await;
    assert_eq!(seen.lock().unwrap()[0], "blob");

    app.close().await.unwrap();
}

struct OutOfOrder(Arc<Mutex<Vec<ErrorCode>>>);

impl Extension for OutOfOrder {
    fn on_configure(&mut self, env: &mut ExtensionEnv<'_>) {
        let err = env.on_start_done().unwrap_err();
        self.0.lock().unwrap().push(err.code());
        env.on_configure_done().unwrap();
    }
}

#[tokio::test]
async fn lifecycle_acks_out_of_order_are_rejected() {
    let codes = Arc::new(Mutex::new(Vec::new()));
    let recorded = codes.clone();
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "x"
      addon: "out_of_order"
"#,
        move |store| {
            store
                .register(
                    AddonKind::Extension,
                    "out_of_order",
                    extension_addon(move |_name: &str| OutOfOrder(recorded.clone())),
                    None,
                )
                .unwrap();
        },
    )
    .await;

    assert_eq!(*codes.lock().unwrap(), vec![ErrorCode::LifecycleViolation]);
    // a broken lifecycle is terminal even though the right ack followed
    wait_until(|| app.engine().failed_extensions().iter().any(|(name, _)| name == "x")).await;
    let conn = app.connect().unwrap();
    let result = conn.send_cmd(cmd_to("hello", "x")).await.unwrap();
    assert_eq!(result.status_code(), StatusCode::Error);

    app.close().await.unwrap();
}

/// Sends `ping` to the node named `ghost` once started and records the
/// status of the answer.
struct Pinger(Arc<Mutex<Vec<StatusCode>>>);

impl Extension for Pinger {
    fn on_start(&mut self, env: &mut ExtensionEnv<'_>) {
        let statuses = self.0.clone();
        let mut ping = Cmd::new("ping");
        ping.add_dest(Loc::extension("ghost"));
        env.send_cmd_with(ping, move |_env, result| {
            if result.is_completed() {
                statuses.lock().unwrap().push(result.status_code());
            }
        })
        .unwrap();
        env.on_start_done().unwrap();
    }
}

#[tokio::test]
async fn node_with_unregistered_addon_fails_and_answers_its_senders() {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let recorded = statuses.clone();
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "ghost"
      addon: "not_registered"
      extension_group: "g1"
    - name: "a"
      addon: "echo"
      extension_group: "g1"
    - name: "pinger"
      addon: "pinger"
      extension_group: "g2"
"#,
        move |store| {
            store
                .register(
                    AddonKind::Extension,
                    "pinger",
                    extension_addon(move |_name: &str| Pinger(recorded.clone())),
                    None,
                )
                .unwrap();
        },
    )
    .await;

    wait_until(|| statuses.lock().unwrap().len() == 1).await;
    assert_eq!(statuses.lock().unwrap()[0], StatusCode::Error);
    let failed = app.engine().failed_extensions();
    assert!(failed.iter().any(|(name, _)| name == "ghost"), "{failed:?}");

    // the rest of its group came up
    let conn = app.connect().unwrap();
    assert!(conn.send_cmd(cmd_to("hello", "a")).await.unwrap().is_ok());

    app.close().await.unwrap();
}

/// Never acknowledges init.
struct Stuck;

impl Extension for Stuck {
    fn on_init(&mut self, _env: &mut ExtensionEnv<'_>) {}
}

#[tokio::test]
async fn extension_missing_its_deadline_is_failed() {
    let app = start(
        r#"
version: 1
timeouts:
  lifecycle_phase_ms: 200
graph:
  nodes:
    - name: "stuck"
      addon: "stuck"
    - name: "a"
      addon: "echo"
"#,
        |store| {
            store
                .register(AddonKind::Extension, "stuck", extension_addon(|_name: &str| Stuck), None)
                .unwrap();
        },
    )
    .await;

    let failed = app.engine().failed_extensions();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "stuck");

    let conn = app.connect().unwrap();
    let result = conn.send_cmd(cmd_to("hello", "stuck")).await.unwrap();
    assert_eq!(result.status_code(), StatusCode::Error);
    // the rest of the graph keeps working
    assert!(conn.send_cmd(cmd_to("hello", "a")).await.unwrap().is_ok());

    app.close().await.unwrap();
}

struct Boom;

impl Extension for Boom {
    fn on_cmd(&mut self, _env: &mut ExtensionEnv<'_>, _cmd: Cmd) {
        panic!("boom");
    }
}

#[tokio::test]
async fn panicking_callback_fails_the_extension() {
    let app = start(
        r#"
version: 1
graph:
  nodes:
    - name: "boom"
      addon: "boom"
"#,
        |store| {
            store
                .register(AddonKind::Extension, "boom", extension_addon(|_name: &str| Boom), None)
                .unwrap();
        },
    )
    .await;

    let conn = app.connect().unwrap();
    let result = conn.send_cmd(cmd_to("hello", "boom")).await.unwrap();
    assert_eq!(result.status_code(), StatusCode::Error);
    wait_until(|| !app.engine().failed_extensions().is_empty()).await;

    app.close().await.unwrap();
}

/// Hands a proxy of itself out when started.
struct Holder(Arc<Mutex<Vec<EnvProxy>>>);

impl Extension for Holder {
    fn on_start(&mut self, env: &mut ExtensionEnv<'_>) {
        self.0.lock().unwrap().push(env.proxy());
        env.on_start_done().unwrap();
    }
}

#[tokio::test]
async fn proxy_runs_jobs_and_holds_back_deinit() {
    let proxies = Arc::new(Mutex::new(Vec::new()));
    let handed = proxies.clone();
    let app = Arc::new(
        start(
            r#"
version: 1
timeouts:
  lifecycle_phase_ms: 3000
graph:
  nodes:
    - name: "holder"
      addon: "holder"
"#,
            move |store| {
                store
                    .register(
                        AddonKind::Extension,
                        "holder",
                        extension_addon(move |_name: &str| Holder(handed.clone())),
                        None,
                    )
                    .unwrap();
            },
        )
        .await,
    );

    let proxy = proxies.lock().unwrap().pop().expect("proxy handed out");
    assert_eq!(proxy.target(), "holder");

    proxy
        .notify_async(|env| env.set_property("touched", true).unwrap())
        .await
        .unwrap();

    let blocking = proxy.clone();
    tokio::task::spawn_blocking(move || {
        blocking.notify(|env| env.set_property("count", 2i32).unwrap(), NotifyMode::Sync)
    })
    .await
    .unwrap()
    .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    proxy
        .notify(
            move |env| {
                let _ = tx.send((env.peek_property("touched"), env.peek_property("count")));
            },
            NotifyMode::Async,
        )
        .unwrap();
    let (touched, count) = rx.await.unwrap();
    assert_eq!(touched.unwrap(), Some(Value::from(true)));
    assert_eq!(count.unwrap(), Some(Value::from(2i32)));

    let closing = tokio::spawn({
        let app = app.clone();
        async move { app.close().await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!closing.is_finished(), "deinit must wait for the proxy");

    drop(proxy);
    tokio::time::timeout(Duration::from_secs(3), closing)
        .await
        .expect("close finishes once the proxy is gone")
        .unwrap()
        .unwrap();
}
