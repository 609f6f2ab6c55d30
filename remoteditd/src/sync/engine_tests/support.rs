use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use remotedit_core::{
    Connector, ConnectorError, LocalConnector, RemoteEntry, ServerConfig, TransferRequest,
};
use tempfile::{TempDir, tempdir};
use tokio::sync::Notify;

use crate::sync::editor::EditorHost;
use crate::sync::engine::SyncEngine;
use crate::sync::prompt::{ConfirmPrompt, Confirmation};
use crate::sync::server::ServerRoot;

pub const SERVER: &str = "site";

/// One-shot pause point. The held call finishes its work, reports that it
/// got there, then waits for `release` before returning.
#[derive(Default)]
pub struct Gate {
    reached: Notify,
    released: Notify,
}

impl Gate {
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

/// LocalConnector that logs every call as `"<op> <path>"`, can be told to
/// fail the n-th call of one operation and can hold the next call of one.
pub struct RecordingConnector {
    inner: LocalConnector,
    calls: Mutex<Vec<String>>,
    failing: Mutex<Option<(&'static str, usize)>>,
    held: Mutex<Option<(&'static str, Arc<Gate>)>>,
}

impl RecordingConnector {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalConnector::new(root),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(None),
            held: Mutex::new(None),
        }
    }

    /// Holds the next call of `op` after it has run.
    pub fn hold(&self, op: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.held.lock() = Some((op, Arc::clone(&gate)));
        gate
    }

    async fn pass(&self, op: &'static str) {
        let gate = {
            let mut held = self.held.lock();
            match held.as_ref() {
                Some((held_op, _)) if *held_op == op => held.take().map(|(_, gate)| gate),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.released.notified().await;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, op: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.split(' ').next() == Some(op))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn fail_on(&self, op: &'static str) {
        self.fail_on_nth(op, 0);
    }

    /// Fails the call of `op` made after `skip` successful ones.
    pub fn fail_on_nth(&self, op: &'static str, skip: usize) {
        *self.failing.lock() = Some((op, skip));
    }

    fn record(&self, op: &'static str, path: &str) -> Result<(), ConnectorError> {
        let mut calls = self.calls.lock();
        let seen = calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(op))
            .count();
        calls.push(format!("{op} {path}"));
        match *self.failing.lock() {
            Some((failing, skip)) if failing == op && seen == skip => {
                Err(ConnectorError::Remote {
                    code: 421,
                    message: format!("injected failure for {op}"),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn exists_file(&self, path: &str) -> Result<bool, ConnectorError> {
        self.record("exists_file", path)?;
        let result = self.inner.exists_file(path).await;
        self.pass("exists_file").await;
        result
    }

    async fn exists_directory(&self, path: &str) -> Result<bool, ConnectorError> {
        self.record("exists_directory", path)?;
        let result = self.inner.exists_directory(path).await;
        self.pass("exists_directory").await;
        result
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, ConnectorError> {
        self.record("list_directory", path)?;
        let result = self.inner.list_directory(path).await;
        self.pass("list_directory").await;
        result
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ConnectorError> {
        self.record("rename", &format!("{from} {to}"))?;
        let result = self.inner.rename(from, to).await;
        self.pass("rename").await;
        result
    }

    async fn delete_file(&self, path: &str) -> Result<(), ConnectorError> {
        self.record("delete_file", path)?;
        let result = self.inner.delete_file(path).await;
        self.pass("delete_file").await;
        result
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<(), ConnectorError> {
        self.record("delete_directory", path)?;
        let result = self.inner.delete_directory(path, recursive).await;
        self.pass("delete_directory").await;
        result
    }

    async fn create_directory(&self, path: &str) -> Result<(), ConnectorError> {
        self.record("create_directory", path)?;
        let result = self.inner.create_directory(path).await;
        self.pass("create_directory").await;
        result
    }

    async fn chmod_file(&self, path: &str, permissions: u32) -> Result<(), ConnectorError> {
        self.record("chmod_file", path)?;
        let result = self.inner.chmod_file(path, permissions).await;
        self.pass("chmod_file").await;
        result
    }

    async fn chmod_directory(&self, path: &str, permissions: u32) -> Result<(), ConnectorError> {
        self.record("chmod_directory", path)?;
        let result = self.inner.chmod_directory(path, permissions).await;
        self.pass("chmod_directory").await;
        result
    }

    async fn upload_file(&self, transfer: &TransferRequest) -> Result<(), ConnectorError> {
        self.record("upload_file", &transfer.remote_path)?;
        let result = self.inner.upload_file(transfer).await;
        self.pass("upload_file").await;
        result
    }

    async fn download_file(&self, transfer: &TransferRequest) -> Result<(), ConnectorError> {
        self.record("download_file", &transfer.remote_path)?;
        let result = self.inner.download_file(transfer).await;
        self.pass("download_file").await;
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Answers prompts from a script, then with `Yes`. Keeps what was asked.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<Vec<Confirmation>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn answer(&self, answer: Confirmation) {
        self.answers.lock().push(answer);
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl ConfirmPrompt for ScriptedPrompt {
    async fn confirm(&self, _message: &str, detail: &str) -> Confirmation {
        self.asked.lock().push(detail.to_string());
        let mut answers = self.answers.lock();
        if answers.is_empty() {
            Confirmation::Yes
        } else {
            answers.remove(0)
        }
    }
}

#[derive(Default)]
pub struct RecordingEditor {
    pub opened: Mutex<Vec<PathBuf>>,
    pub focused: Mutex<Vec<PathBuf>>,
    pub retargeted: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl EditorHost for RecordingEditor {
    fn open(&self, local_path: &Path) -> std::io::Result<()> {
        self.opened.lock().push(local_path.to_path_buf());
        Ok(())
    }

    fn focus(&self, local_path: &Path) {
        self.focused.lock().push(local_path.to_path_buf());
    }

    fn retarget(&self, from: &Path, to: &Path) {
        self.retargeted
            .lock()
            .push((from.to_path_buf(), to.to_path_buf()));
    }
}

pub struct Fixture {
    pub remote: TempDir,
    pub mirror: TempDir,
    pub connector: Arc<RecordingConnector>,
    pub prompt: Arc<ScriptedPrompt>,
    pub editor: Arc<RecordingEditor>,
    pub engine: SyncEngine,
}

pub fn fixture() -> Fixture {
    fixture_with_base("/")
}

pub fn fixture_with_base(base: &str) -> Fixture {
    let remote = tempdir().unwrap();
    let mirror = tempdir().unwrap();
    let connector = Arc::new(RecordingConnector::new(remote.path()));
    let prompt = Arc::new(ScriptedPrompt::default());
    let editor = Arc::new(RecordingEditor::default());
    let engine = SyncEngine::new(
        mirror.path().to_path_buf(),
        prompt.clone(),
        editor.clone(),
    );
    let dyn_connector: Arc<dyn Connector> = connector.clone();
    engine
        .add_server(
            ServerConfig::new(SERVER, "ftp.example.org", base),
            dyn_connector,
        )
        .unwrap();
    Fixture {
        remote,
        mirror,
        connector,
        prompt,
        editor,
        engine,
    }
}

impl Fixture {
    pub fn root(&self) -> Arc<ServerRoot> {
        self.engine.server(SERVER).unwrap()
    }

    /// Where an absolute remote path lives on disk.
    pub fn remote_disk(&self, remote_path: &str) -> PathBuf {
        self.remote.path().join(remote_path.trim_start_matches('/'))
    }

    pub fn put_remote(&self, remote_path: &str, contents: &[u8]) {
        let path = self.remote_disk(remote_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    pub fn mirror_of(&self, relative: &str) -> PathBuf {
        self.root().local_of(relative).unwrap()
    }

    pub fn finder_paths(&self) -> Vec<String> {
        self.root()
            .finder()
            .items()
            .into_iter()
            .map(|item| item.relative_path)
            .collect()
    }
}
