use std::sync::Arc;
use std::sync::Mutex;

use tempfile::tempdir;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener as TcpServer;
use tokio::sync::watch;

use super::Dispatcher;
use super::Listener;
use super::Supervisor;
use crate::cache::init_cache_db;
use crate::cache::HandlerStateStore;
use crate::cache::MasterCursor;
use crate::cache::SledEntryCache;
use crate::config::BackoffPolicy;
use crate::config::ListenerConfig;
use crate::directory::MockDirectoryService;
use crate::handlers::HandlerDescriptor;
use crate::handlers::HandlerSet;
use crate::handlers::PrivilegeGuard;
use crate::model::entry_with;
use crate::notifier::NotifierClient;
use crate::test_utils::hook_log;
use crate::test_utils::log_lines;
use crate::test_utils::RecordingHandler;

fn split_request(line: &str) -> (String, String, Option<String>) {
    let mut fields = line.trim_end().split('\t');
    (
        fields.next().unwrap_or_default().to_string(),
        fields.next().unwrap_or_default().to_string(),
        fields.next().map(str::to_string),
    )
}

/// Scripted notifier for the idle-outage scenario.
///
/// Connection 1 processes transaction 1 normally, then goes silent on
/// `GET_ID 2` and answers the eventual `ALIVE` probe with `FAIL`.
/// Connection 2 sees the reissued `GET_ID 2`, answers it after the schema
/// probe, and requests shutdown once the pipeline asks for transaction 3.
async fn run_fake_notifier(
    server: TcpServer,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: watch::Sender<()>,
) {
    let record = |line: &str| {
        let (msg_id, command, arg) = split_request(line);
        requests.lock().expect("requests").push(match &arg {
            Some(arg) => format!("{command} {arg}"),
            None => command.clone(),
        });
        (msg_id, command, arg)
    };

    let (stream, _) = server.accept().await.expect("accept #1");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            // The client tore the connection down after the failed probe.
            break;
        }
        let (msg_id, command, arg) = record(&line);
        let payload = match (command.as_str(), arg.as_deref()) {
            ("GET_SCHEMA_ID", _) => Some("0".to_string()),
            ("GET_ID", Some("1")) => Some("1\tcn=alice,ou=p\ta".to_string()),
            ("GET_ID", Some("2")) => None, // outage begins
            ("ALIVE", _) => Some("FAIL".to_string()),
            _ => None,
        };
        if let Some(payload) = payload {
            let frame = format!("{msg_id}\t{payload}\n");
            if write_half.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    let (stream, _) = server.accept().await.expect("accept #2");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut reissued_get_id: Option<String> = None;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
            break;
        }
        let (msg_id, command, arg) = record(&line);
        match (command.as_str(), arg.as_deref()) {
            ("GET_ID", Some("2")) => reissued_get_id = Some(msg_id),
            ("GET_SCHEMA_ID", _) => {
                let frame = format!("{msg_id}\t0\n");
                write_half.write_all(frame.as_bytes()).await.expect("write schema");
                if let Some(get_id) = reissued_get_id.take() {
                    let frame = format!("{get_id}\t2\tcn=alice,ou=p\tm\n");
                    write_half.write_all(frame.as_bytes()).await.expect("write announcement");
                }
            }
            ("GET_ID", Some("3")) => {
                let _ = shutdown_tx.send(());
                break;
            }
            _ => {}
        }
    }
}

// Idle outage: the pipeline processes one transaction, goes idle, runs
// postrun exactly once while closing the directory connection, fails the
// ALIVE probe, reconnects with the same GET_ID in flight, and resumes
// without skipping or repeating a transaction.
#[tokio::test]
async fn test_idle_outage_runs_postrun_once_and_resumes_after_reconnect() {
    let dir = tempdir().expect("tempdir");
    let log = hook_log();

    let db = init_cache_db(dir.path().join("cache")).expect("open db");
    let cache = SledEntryCache::new(Arc::new(db)).expect("open trees");
    let cursor =
        MasterCursor::load(dir.path().join("cache").join("master.state")).expect("cursor");

    let mut handlers = HandlerSet::new(
        HandlerStateStore::new(dir.path().join("cache")),
        PrivilegeGuard::default(),
        false,
    );
    handlers
        .register(
            RecordingHandler::boxed(
                HandlerDescriptor::new("replication", "raw replication"),
                log.clone(),
            ),
            None,
            None,
        )
        .expect("register");
    handlers.initialize_all().await.expect("initialize");

    let mut directory = MockDirectoryService::new();
    directory
        .expect_read()
        .times(2)
        .returning(|_| Ok(Some(entry_with(&[("uid", &["alice"])]))));
    // Exactly one close: the idle phase. The schema generation never moves.
    directory.expect_close().times(1).returning(|| ());

    let server = TcpServer::bind("127.0.0.1:0").await.expect("bind");
    let port = server.local_addr().expect("addr").port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (_reload_tx, reload_rx) = watch::channel(());
    tokio::spawn(run_fake_notifier(server, requests.clone(), shutdown_tx));

    let mut config = ListenerConfig::default();
    config.runtime.data_dir = dir.path().to_path_buf();
    config.runtime.postrun_idle_secs = 1;
    config.notifier.host = "127.0.0.1".to_string();
    config.notifier.port = port;
    config.notifier.alive_idle_secs = 1;
    config.notifier.retry = BackoffPolicy {
        max_retries: 5,
        timeout_ms: 5_000,
        base_delay_ms: 1,
        max_delay_ms: 4,
    };

    let dispatcher = Dispatcher::new(directory, cache, handlers, cursor, None);
    let supervisor = Supervisor::new(&config.runtime);
    let notifier = NotifierClient::new(config.notifier.clone());
    let mut listener = Listener::new(
        dispatcher,
        notifier,
        supervisor,
        config,
        shutdown_rx,
        reload_rx,
    );

    listener.run().await.expect("run");

    let lines = log_lines(&log);
    let postruns = lines.iter().filter(|l| l.starts_with("postrun:")).count();
    assert_eq!(postruns, 1, "postrun fires exactly once during the outage");

    let handles: Vec<String> = lines
        .iter()
        .filter(|l| l.starts_with("handle:"))
        .cloned()
        .collect();
    assert_eq!(
        handles,
        vec![
            "handle:replication:cn=alice,ou=p:a",
            "handle:replication:cn=alice,ou=p:m",
        ]
    );

    let preruns = lines.iter().filter(|l| l.starts_with("prerun:")).count();
    assert_eq!(preruns, 2, "a fresh run starts after postrun");

    let requests = requests.lock().expect("requests").clone();
    assert!(requests.contains(&"ALIVE".to_string()));
    let reissues = requests.iter().filter(|r| *r == "GET_ID 2").count();
    assert_eq!(reissues, 2, "the in-flight GET_ID is reissued after reconnect");

    // The cursor moved only for the two committed transactions; nothing
    // advanced during the outage itself.
    let cursor =
        MasterCursor::load(dir.path().join("cache").join("master.state")).expect("reload");
    assert_eq!(cursor.notifier_id(), 2);
}
