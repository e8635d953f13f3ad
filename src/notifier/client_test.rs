use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;

use super::NotifierClient;
use super::ProtocolVersion;
use crate::config::NotifierConfig;
use crate::model::ChangeCommand;

fn config_for(port: u16) -> NotifierConfig {
    let mut config = NotifierConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = port;
    config.retry.max_retries = 2;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 4;
    config.retry.timeout_ms = 2_000;
    config
}

/// One-shot fake notifier: accepts a connection and answers each request
/// line with the scripted payloads, keyed by command.
async fn spawn_fake(replies: Vec<(&'static str, String)>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut replies = replies.into_iter();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let msg_id = line.split('\t').next().unwrap_or("0").to_string();
            let command = line
                .trim_end()
                .split('\t')
                .nth(1)
                .unwrap_or_default()
                .to_string();

            let Some((expected, payload)) = replies.next() else {
                break;
            };
            assert_eq!(command, expected, "unexpected request order");
            let reply = format!("{msg_id}\t{payload}\n");
            if write_half.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    port
}

#[tokio::test]
async fn test_get_id_legacy_reply() {
    let port = spawn_fake(vec![("GET_ID", "43\tcn=alice,ou=p\ta".to_string())]).await;
    let mut client = NotifierClient::new(config_for(port));

    client.connect().await.expect("connect");
    client.send_get_id(43).await.expect("send");

    let ann = client
        .wait(Duration::from_secs(2))
        .await
        .expect("wait")
        .expect("announcement");
    assert_eq!(ann.id, 43);
    let (dn, command) = ann.detail.expect("detail");
    assert_eq!(dn.as_str(), "cn=alice,ou=p");
    assert_eq!(command, ChangeCommand::Add);
    assert_eq!(client.version(), Some(ProtocolVersion::Legacy));
}

#[tokio::test]
async fn test_get_id_modern_reply() {
    let port = spawn_fake(vec![("GET_ID", "44".to_string())]).await;
    let mut client = NotifierClient::new(config_for(port));

    client.connect().await.expect("connect");
    client.send_get_id(44).await.expect("send");

    let ann = client
        .wait(Duration::from_secs(2))
        .await
        .expect("wait")
        .expect("announcement");
    assert_eq!(ann.id, 44);
    assert!(ann.detail.is_none());
    assert_eq!(client.version(), Some(ProtocolVersion::Modern));
}

#[tokio::test]
async fn test_wait_times_out_and_keeps_request_pending() {
    // Fake server never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let mut client = NotifierClient::new(config_for(port));
    client.connect().await.expect("connect");
    client.send_get_id(1).await.expect("send");

    let out = client.wait(Duration::from_millis(50)).await.expect("wait");
    assert!(out.is_none());
    assert!(client.has_pending_get_id());
}

#[tokio::test]
async fn test_alive_and_schema_id() {
    let port = spawn_fake(vec![
        ("ALIVE", "OK".to_string()),
        ("GET_SCHEMA_ID", "17".to_string()),
    ])
    .await;
    let mut client = NotifierClient::new(config_for(port));

    client.connect().await.expect("connect");
    assert!(client.alive().await.expect("alive"));
    assert_eq!(client.get_schema_id().await.expect("schema"), 17);
}

#[tokio::test]
async fn test_reconnect_reissues_pending_get_id() {
    // First server accepts and immediately closes; second one answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        // First connection: close without a reply.
        let (stream, _) = listener.accept().await.expect("accept");
        drop(stream);

        // Second connection: behave like a legacy notifier.
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read");
        assert!(line.contains("GET_ID\t5"), "pending id must be reissued: {line:?}");
        let msg_id = line.split('\t').next().unwrap().to_string();
        write_half
            .write_all(format!("{msg_id}\t5\tcn=x\tm\n").as_bytes())
            .await
            .expect("write");
    });

    let mut client = NotifierClient::new(config_for(port));
    client.connect().await.expect("connect");
    client.send_get_id(5).await.expect("send");

    // The peer closed; the wait surfaces a transient connection error.
    let err = client.wait(Duration::from_secs(2)).await.expect_err("closed");
    assert!(err.is_transient());

    client.reconnect().await.expect("reconnect");
    let ann = client
        .wait(Duration::from_secs(2))
        .await
        .expect("wait")
        .expect("announcement");
    assert_eq!(ann.id, 5);
}

#[tokio::test]
async fn test_unmatched_replies_are_dropped() {
    // Server answers with a bogus message id first, then the real one.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read");
        let msg_id = line.split('\t').next().unwrap().to_string();
        write_half.write_all(b"9999\tstale\n").await.expect("write");
        write_half
            .write_all(format!("{msg_id}\t7\n").as_bytes())
            .await
            .expect("write");
    });

    let mut client = NotifierClient::new(config_for(port));
    client.connect().await.expect("connect");
    client.send_get_id(7).await.expect("send");

    let ann = client
        .wait(Duration::from_secs(2))
        .await
        .expect("wait")
        .expect("announcement");
    assert_eq!(ann.id, 7);
}
