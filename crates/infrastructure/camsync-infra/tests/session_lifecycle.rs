use camsync_core::{CommandCode, DeviceCommand, DeviceMessage, ResponseStatus};
use camsync_infra::device::{
    BridgeTransport, DeviceError, DeviceSession, RetryPolicy, ScriptedTransport,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const LIST: CommandCode = CommandCode::GET_FILE_LIST;

fn quick_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(5))
}

fn session_with(transport: &Arc<ScriptedTransport>) -> DeviceSession {
    DeviceSession::new(transport.clone())
}

#[tokio::test]
async fn open_retries_until_the_device_accepts() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_opens(2);
    let session = session_with(&transport);

    session.open(&quick_retry(5)).await.unwrap();
    assert_eq!(transport.open_attempts(), 3);
}

#[tokio::test]
async fn open_gives_up_after_max_attempts() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_opens(100);
    let session = session_with(&transport);

    let err = session.open(&quick_retry(3)).await.unwrap_err();
    assert!(matches!(err, DeviceError::ConnectionFailed { attempts: 3, .. }));
    assert_eq!(transport.open_attempts(), 3);
}

#[tokio::test]
async fn list_files_decodes_listing() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.set_reply_delay(Duration::from_millis(20));
    transport.reply(
        LIST,
        vec![DeviceMessage::ok(
            LIST,
            json!({ "uri": ["DCIM/A/clip1.mp4", "DCIM/A/clip2.mp4"], "total_count": 2 }),
        )],
    );
    let session = session_with(&transport);
    session.open(&quick_retry(1)).await.unwrap();

    let listing = session.list_files(Duration::from_secs(5)).await.unwrap();
    assert_eq!(listing.uris, vec!["DCIM/A/clip1.mp4", "DCIM/A/clip2.mp4"]);
    assert_eq!(listing.total_count, 2);
    assert_eq!(transport.sent(), vec![DeviceCommand::GetFileList]);
}

#[tokio::test]
async fn non_ok_status_is_a_protocol_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.reply(
        LIST,
        vec![DeviceMessage::new(
            ResponseStatus::Other("busy".into()),
            LIST,
            json!({}),
        )],
    );
    let session = session_with(&transport);

    let err = session.list_files(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, DeviceError::Protocol { code, .. } if code == LIST));
}

#[tokio::test]
async fn malformed_payload_is_a_protocol_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.reply(LIST, vec![DeviceMessage::ok(LIST, json!({ "uri": "nope" }))]);
    let session = session_with(&transport);

    let err = session.list_files(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, DeviceError::Protocol { .. }));
}

#[tokio::test]
async fn device_error_is_surfaced() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.reply(LIST, vec![DeviceMessage::error(LIST)]);
    let session = session_with(&transport);

    let err = session.list_files(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, DeviceError::Device { .. }));
}

#[tokio::test]
async fn silent_device_times_out() {
    let transport = Arc::new(ScriptedTransport::new());
    let session = session_with(&transport);

    let err = session
        .list_files(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, DeviceError::Timeout { .. }));
    assert!(!session.correlator().is_pending(LIST));
}

#[tokio::test]
async fn close_failure_is_swallowed() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_close();
    let session = session_with(&transport);

    session.close().await;
    assert_eq!(transport.close_calls(), 1);
}

#[tokio::test]
async fn bridge_transport_speaks_json_lines() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let bridge = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let request = lines.next_line().await.unwrap().unwrap();
        // Unsolicited noise first, then the real answer.
        write_half
            .write_all(b"{\"status\":\"ok\",\"code\":99,\"payload\":{}}\nnot json\n")
            .await
            .unwrap();
        write_half
            .write_all(
                b"{\"status\":\"ok\",\"code\":8,\"payload\":{\"uri\":[\"DCIM/x.insv\"],\"total_count\":1}}\n",
            )
            .await
            .unwrap();
        request
    });

    let transport = Arc::new(BridgeTransport::new(
        addr.to_string(),
        Duration::from_secs(2),
    ));
    let session = DeviceSession::new(transport);
    session.open(&quick_retry(1)).await.unwrap();

    let listing = session.list_files(Duration::from_secs(5)).await.unwrap();
    assert_eq!(listing.uris, vec!["DCIM/x.insv"]);

    let request = bridge.await.unwrap();
    assert_eq!(request, r#"{"command":"get_file_list"}"#);
    session.close().await;
}
