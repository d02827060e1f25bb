use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use axum::http::StatusCode;
use clap::Parser;
use tokio::sync::mpsc;

use super::*;
use crate::config::Config;
use crate::multiplexer::{CpuPriority, MultiplexerAdapter, ReadChunk};

struct FakeAdapter {
    existing: Mutex<HashSet<String>>,
}

impl FakeAdapter {
    fn new() -> Self {
        Self { existing: Mutex::new(HashSet::new()) }
    }
}

impl MultiplexerAdapter for FakeAdapter {
    fn create_session(&self, name: &str, _working_dir: &Path, _command: &[String], _env: &[(String, String)], _cpu_priority: CpuPriority) -> Result<(), crate::error::AppError> {
        self.existing.lock().expect("lock").insert(name.to_owned());
        Ok(())
    }

    fn attach_read_stream(&self, _name: &str) -> Result<mpsc::Receiver<ReadChunk>, crate::error::AppError> {
        let (_tx, rx) = mpsc::channel(4);
        Ok(rx)
    }

    fn write(&self, _name: &str, _bytes: &[u8]) -> Result<(), crate::error::AppError> {
        Ok(())
    }

    fn resize(&self, _name: &str, _cols: u16, _rows: u16) -> Result<(), crate::error::AppError> {
        Ok(())
    }

    fn kill(&self, name: &str) -> Result<(), crate::error::AppError> {
        self.existing.lock().expect("lock").remove(name);
        Ok(())
    }

    fn list(&self) -> Result<HashSet<String>, crate::error::AppError> {
        Ok(self.existing.lock().expect("lock").clone())
    }

    fn exists(&self, name: &str) -> Result<bool, crate::error::AppError> {
        Ok(self.existing.lock().expect("lock").contains(name))
    }
}

fn test_router(state_dir: &Path) -> Router {
    let config = Config::parse_from(["foreman", "--state-dir", state_dir.to_str().expect("utf8 path")]);
    let adapter: Arc<dyn MultiplexerAdapter> = Arc::new(FakeAdapter::new());
    build_router(Arc::new(Supervisor::new(&config, adapter)))
}

#[tokio::test]
async fn unrouted_paths_fall_through_to_a_404() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = axum_test::TestServer::new(test_router(dir.path()))?;

    let resp = server.get("/not/a/real/route").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn session_scoped_routes_reject_an_unknown_id_with_not_found() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let server = axum_test::TestServer::new(test_router(dir.path()))?;

    for (method_resp, path) in [
        (server.post("/api/v1/sessions/missing/stop").await, "stop"),
        (server.post("/api/v1/sessions/missing/input").json(&serde_json::json!({"text": "hi"})).await, "input"),
        (server.post("/api/v1/sessions/missing/resize").json(&serde_json::json!({"cols": 80, "rows": 24})).await, "resize"),
    ] {
        method_resp.assert_status(StatusCode::NOT_FOUND);
        let body: serde_json::Value = method_resp.json();
        assert_eq!(body["code"], "NOT_FOUND", "endpoint: {path}");
    }
    Ok(())
}
