use axum::{body::Body, routing::get, Router};
use camino::Utf8PathBuf;
use camsync_cli::{commands, Overrides, RunConfig};
use camsync_config::Settings;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const LISTING: &str = r#"{"status":"ok","code":8,"payload":{"uri":["DCIM/Camera01/VID_001.insv","DCIM/Camera01/VID_002.insv"],"total_count":2}}"#;

async fn start_camera_http(hits: Arc<AtomicUsize>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(
        "/DCIM/Camera01/*name",
        get(move || {
            hits.fetch_add(1, Ordering::SeqCst);
            async { Body::from(vec![7u8; 4_096]) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

/// Answers every `get_file_list` line with the same listing, one connection
/// at a time.
async fn start_bridge() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.contains("get_file_list") {
                    let mut reply = LISTING.as_bytes().to_vec();
                    reply.push(b'\n');
                    if write_half.write_all(&reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    (addr, handle)
}

fn config(dest: Utf8PathBuf, bridge: SocketAddr, http: SocketAddr) -> RunConfig {
    let overrides = Overrides {
        dest: Some(dest),
        camera_ip: Some(bridge.ip().to_string()),
        bridge_port: Some(bridge.port()),
        base_url: Some(format!("http://{http}")),
        no_wifi: true,
        list_timeout_secs: Some(5),
        ..Default::default()
    };
    RunConfig::resolve(&Settings::default(), &overrides).unwrap()
}

#[tokio::test]
async fn sync_then_resync_downloads_nothing_new() {
    let hits = Arc::new(AtomicUsize::new(0));
    let (http, _server) = start_camera_http(hits.clone()).await;
    let (bridge, _bridge) = start_bridge().await;

    let work_dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap();
    let dest = root.join("camera");
    let cfg = config(dest.clone(), bridge, http);

    // Phase 1: fresh sync into a directory that does not exist yet
    let report = commands::cmd_sync(&cfg).await.expect("first sync failed");
    assert_eq!(report.planned, 2);
    assert_eq!(report.summary.succeeded, 2);
    assert!(report.summary.is_clean());
    assert_eq!(
        std::fs::metadata(dest.join("VID_001.insv")).unwrap().len(),
        4_096
    );
    assert!(!dest.join("VID_001.insv.part").exists());
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // Phase 2: the plan now sees both files locally
    let preview = commands::cmd_plan(&cfg).await.expect("plan failed");
    assert_eq!(preview.planned, 0);
    assert_eq!(preview.already_present(), 2);

    // Phase 3: a second sync is a no-op
    let again = commands::cmd_sync(&cfg).await.expect("second sync failed");
    assert_eq!(again.planned, 0);
    assert_eq!(again.summary.attempted, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_bridge_is_an_error() {
    let hits = Arc::new(AtomicUsize::new(0));
    let (http, _server) = start_camera_http(hits.clone()).await;

    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let bridge = closed.local_addr().unwrap();
    drop(closed);

    let work_dir = tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(work_dir.path().to_path_buf()).unwrap();
    let mut cfg = config(root, bridge, http);
    cfg.options.retry = camsync_infra::RetryPolicy::new(2, std::time::Duration::from_millis(10));

    let err = commands::cmd_sync(&cfg).await.unwrap_err();
    assert!(err.to_string().contains("could not connect"), "{err:#}");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
