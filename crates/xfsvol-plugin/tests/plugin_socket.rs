//! Plugin API over a real Unix socket, backed by the in-memory quota backend.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::oneshot;

use xfsvol_core::{ManagerConfig, MemoryBackend, VolumeManager};
use xfsvol_plugin::server;
use xfsvol_plugin::{Driver, Reply};

struct Plugin {
    _dir: TempDir,
    root: std::path::PathBuf,
    socket: std::path::PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl Plugin {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("volumes");
        std::fs::create_dir(&root).unwrap();
        let socket = dir.path().join("plugins/xfsvol.sock");

        let manager = VolumeManager::with_backend(
            ManagerConfig::new(&root),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap();
        let driver = Arc::new(Driver::with_manager(manager, 64 * 1024 * 1024));

        let listener = server::bind(&socket).unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(listener, driver, async move {
            let _ = rx.await;
        }));

        Self {
            root: root.canonicalize().unwrap(),
            _dir: dir,
            socket,
            shutdown: Some(tx),
            task,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).unwrap();
        }
        self.task.await.unwrap().unwrap();
    }
}

async fn send(
    reader: &mut BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    endpoint: &str,
    body: Value,
) -> (u16, Value) {
    let body = body.to_string();
    let request = format!(
        "POST {endpoint} HTTP/1.1\r\nHost: plugin\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    writer.write_all(request.as_bytes()).await.unwrap();

    let reply = read_reply(reader).await;
    (reply.status, serde_json::from_slice(&reply.body).unwrap())
}

async fn read_reply(reader: &mut BufReader<tokio::net::unix::OwnedReadHalf>) -> Reply {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await.unwrap();
    let status: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

    let mut length = 0usize;
    let mut content_type = String::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').unwrap();
        match name.to_ascii_lowercase().as_str() {
            "content-length" => length = value.trim().parse().unwrap(),
            "content-type" => content_type = value.trim().to_string(),
            _ => {}
        }
    }
    assert_eq!(content_type, "application/vnd.docker.plugins.v1+json");

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.unwrap();
    Reply { status, body }
}

async fn connect(socket: &Path) -> (BufReader<tokio::net::unix::OwnedReadHalf>, tokio::net::unix::OwnedWriteHalf) {
    let stream = UnixStream::connect(socket).await.unwrap();
    let (read, write) = stream.into_split();
    (BufReader::new(read), write)
}

#[tokio::test]
async fn test_volume_lifecycle_over_socket() {
    let plugin = Plugin::start().await;
    let (mut reader, mut writer) = connect(&plugin.socket).await;

    let (status, body) = send(&mut reader, &mut writer, "/Plugin.Activate", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"Implements": ["VolumeDriver"]}));

    // all on one persistent connection
    let (status, body) = send(
        &mut reader,
        &mut writer,
        "/VolumeDriver.Create",
        json!({"Name": "cache", "Opts": {"size": "20M"}}),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    assert!(plugin.root.join("cache").is_dir());

    let (status, body) = send(
        &mut reader,
        &mut writer,
        "/VolumeDriver.Mount",
        json!({"Name": "cache", "ID": "c0ffee"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["Mountpoint"],
        plugin.root.join("cache").display().to_string()
    );

    let (_, body) = send(&mut reader, &mut writer, "/VolumeDriver.List", json!({})).await;
    assert_eq!(body["Volumes"].as_array().unwrap().len(), 1);
    assert_eq!(body["Volumes"][0]["Name"], "cache");

    let (status, _) = send(
        &mut reader,
        &mut writer,
        "/VolumeDriver.Remove",
        json!({"Name": "cache"}),
    )
    .await;
    assert_eq!(status, 200);
    assert!(!plugin.root.join("cache").exists());

    let (status, body) = send(
        &mut reader,
        &mut writer,
        "/VolumeDriver.Get",
        json!({"Name": "cache"}),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body["Err"], "volume cache not found");

    drop(writer);
    plugin.stop().await;
}

#[tokio::test]
async fn test_unknown_endpoint_and_method() {
    let plugin = Plugin::start().await;
    let (mut reader, mut writer) = connect(&plugin.socket).await;

    let (status, body) = send(&mut reader, &mut writer, "/VolumeDriver.Resize", json!({})).await;
    assert_eq!(status, 404);
    assert!(body["Err"].is_string());

    writer
        .write_all(b"GET /Plugin.Activate HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut reader).await;
    assert_eq!(reply.status, 405);

    drop(writer);
    plugin.stop().await;
}

#[tokio::test]
async fn test_concurrent_creates_get_distinct_volumes() {
    let plugin = Plugin::start().await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let socket = plugin.socket.clone();
        tasks.push(tokio::spawn(async move {
            let (mut reader, mut writer) = connect(&socket).await;
            send(
                &mut reader,
                &mut writer,
                "/VolumeDriver.Create",
                json!({"Name": format!("vol-{i}")}),
            )
            .await
        }));
    }
    for task in tasks {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, 200, "{body}");
    }

    let (mut reader, mut writer) = connect(&plugin.socket).await;
    let (_, body) = send(&mut reader, &mut writer, "/VolumeDriver.List", json!({})).await;
    assert_eq!(body["Volumes"].as_array().unwrap().len(), 8);

    drop(writer);
    plugin.stop().await;
}

#[tokio::test]
async fn test_connection_close_is_honored() {
    let plugin = Plugin::start().await;
    let (mut reader, mut writer) = connect(&plugin.socket).await;

    writer
        .write_all(b"POST /VolumeDriver.Capabilities HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let reply = read_reply(&mut reader).await;
    assert_eq!(reply.status, 200);
    let body: Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body, json!({"Capabilities": {"Scope": "global"}}));

    // server hung up
    let mut rest = Vec::new();
    assert_eq!(reader.read_to_end(&mut rest).await.unwrap(), 0);

    drop(writer);
    plugin.stop().await;
}
