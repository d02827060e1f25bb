use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use axum::http::StatusCode;
use clap::Parser;
use tokio::sync::mpsc;

use super::*;
use crate::config::Config;
use crate::multiplexer::{CpuPriority, MultiplexerAdapter, ReadChunk};
use crate::transport::build_router;

struct FakeAdapter {
    existing: Mutex<HashSet<String>>,
}

impl FakeAdapter {
    fn new() -> Self {
        Self { existing: Mutex::new(HashSet::new()) }
    }
}

impl MultiplexerAdapter for FakeAdapter {
    fn create_session(&self, name: &str, _working_dir: &Path, _command: &[String], _env: &[(String, String)], _cpu_priority: CpuPriority) -> Result<(), AppError> {
        self.existing.lock().expect("lock").insert(name.to_owned());
        Ok(())
    }

    fn attach_read_stream(&self, _name: &str) -> Result<mpsc::Receiver<ReadChunk>, AppError> {
        let (_tx, rx) = mpsc::channel(4);
        Ok(rx)
    }

    fn write(&self, _name: &str, _bytes: &[u8]) -> Result<(), AppError> {
        Ok(())
    }

    fn resize(&self, _name: &str, _cols: u16, _rows: u16) -> Result<(), AppError> {
        Ok(())
    }

    fn kill(&self, name: &str) -> Result<(), AppError> {
        self.existing.lock().expect("lock").remove(name);
        Ok(())
    }

    fn list(&self) -> Result<HashSet<String>, AppError> {
        Ok(self.existing.lock().expect("lock").clone())
    }

    fn exists(&self, name: &str) -> Result<bool, AppError> {
        Ok(self.existing.lock().expect("lock").contains(name))
    }
}

fn test_supervisor(state_dir: &Path) -> Arc<Supervisor> {
    let config = Config::parse_from(["foreman", "--state-dir", state_dir.to_str().expect("utf8 path")]);
    let adapter: Arc<dyn MultiplexerAdapter> = Arc::new(FakeAdapter::new());
    Arc::new(Supervisor::new(&config, adapter))
}

#[tokio::test]
async fn health_reports_ok_and_session_count() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let supervisor = test_supervisor(dir.path());
    let server = axum_test::TestServer::new(build_router(supervisor))?;

    let resp = server.get("/api/v1/health").await;
    resp.assert_status(StatusCode::OK);
    let body = resp.text();
    assert!(body.contains("\"ok\":true"), "body: {body}");
    assert!(body.contains("\"sessionCount\":0"), "body: {body}");
    Ok(())
}

#[tokio::test]
async fn creating_a_session_returns_its_id_and_it_is_then_listed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let supervisor = test_supervisor(dir.path());
    let server = axum_test::TestServer::new(build_router(supervisor))?;

    let resp = server
        .post("/api/v1/sessions")
        .json(&serde_json::json!({"workingDir": "/tmp", "command": ["claude"]}))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert!(body["ok"].as_bool().unwrap_or(false));
    let id = body["data"]["id"].as_str().expect("id field").to_owned();

    let resp = server.get("/api/v1/sessions").await;
    let body: serde_json::Value = resp.json();
    let ids = body["data"].as_array().expect("array");
    assert!(ids.iter().any(|v| v.as_str() == Some(id.as_str())));
    Ok(())
}

#[tokio::test]
async fn fetching_an_unknown_session_returns_a_not_found_envelope() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let supervisor = test_supervisor(dir.path());
    let server = axum_test::TestServer::new(build_router(supervisor))?;

    let resp = server.get("/api/v1/sessions/missing").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn starting_a_scheduled_run_returns_an_id_and_it_is_then_listed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let supervisor = test_supervisor(dir.path());
    let server = axum_test::TestServer::new(build_router(supervisor))?;

    let resp = server
        .post("/api/v1/scheduled-runs")
        .json(&serde_json::json!({"prompt": "say hello", "workingDir": "/tmp", "durationMinutes": 0.1}))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    let id = body["data"]["id"].as_str().expect("id field").to_owned();

    let resp = server.get("/api/v1/scheduled-runs").await;
    let body: serde_json::Value = resp.json();
    let ids = body["data"].as_array().expect("array");
    assert!(ids.iter().any(|v| v.as_str() == Some(id.as_str())));

    let resp = server.get(&format!("/api/v1/scheduled-runs/{id}")).await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["status"], "running");
    Ok(())
}

#[tokio::test]
async fn stopping_an_unknown_scheduled_run_is_not_found() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let supervisor = test_supervisor(dir.path());
    let server = axum_test::TestServer::new(build_router(supervisor))?;

    let resp = server.post("/api/v1/scheduled-runs/missing/stop").await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}
