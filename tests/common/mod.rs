//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use scopelog::config::source::ConfigSource;
use scopelog::observability::appender::RecordingAppender;
use scopelog::LogPipeline;

/// Config with a single recording appender named `memory`, pattern
/// `[%x{requestId}] %c %p %m`, and `default` at the given level.
pub fn recording_config(default_level: &str) -> String {
    format!(
        r#"
[appenders.memory]
type = "recording"
layout = {{ type = "pattern", pattern = "[%x{{requestId}}] %c %p %m" }}

[categories.default]
level = "{default_level}"
appenders = ["memory"]
"#
    )
}

pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("logging.toml");
    std::fs::write(&path, content).unwrap();
    path
}

/// A pipeline loaded from a temp config file.
pub struct TestPipeline {
    pub dir: tempfile::TempDir,
    pub path: PathBuf,
    pub source: Arc<ConfigSource>,
    pub pipeline: Arc<LogPipeline>,
}

impl TestPipeline {
    pub fn new(content: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), content);
        let source = Arc::new(ConfigSource::new(&path));
        let pipeline = LogPipeline::from_source(source.clone()).unwrap();
        Self {
            dir,
            path,
            source,
            pipeline,
        }
    }

    pub fn rewrite(&self, content: &str) {
        std::fs::write(&self.path, content).unwrap();
    }

    pub fn memory(&self) -> Arc<RecordingAppender> {
        self.pipeline.recording("memory").unwrap()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

/// Start a mock backend on an ephemeral port. `f` yields status and JSON body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
