use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use remotedit_core::{Connector, ConnectorError, Direction, EntryType, Rights, ServerConfig};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::editor::{EditorHost, EditorRegistry};
use super::finder::{FinderError, FinderItem, ItemType, LoadOutcome};
use super::paths::{self, PathError};
use super::prompt::{ConfirmPrompt, Confirmation};
use super::queue::{QueueError, QueueItem, TransferQueue};
use super::server::{Entry, ServerRoot};
use super::tree::{NodeMeta, TreeNode};

/// Directory under the mirror dir, outside every server mirror, where copies
/// are staged.
const COPY_STAGING_DIR: &str = ".copies";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("a transfer for {0} is already queued")]
    AlreadyQueued(PathBuf),
    #[error("declined by user")]
    UserDeclined,
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
    #[error("local I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("unknown server: {0}")]
    UnknownServer(String),
    #[error("server {0} was removed")]
    ServerGone(String),
}

impl EngineError {
    /// Declined prompts end a workflow without anything to report.
    pub fn is_silent(&self) -> bool {
        matches!(self, EngineError::UserDeclined)
    }
}

impl From<QueueError> for EngineError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::AlreadyQueued(path) => EngineError::AlreadyQueued(path),
        }
    }
}

impl From<FinderError> for EngineError {
    fn from(err: FinderError) -> Self {
        match err {
            FinderError::Connector(err) => EngineError::Connector(err),
        }
    }
}

/// Orchestrates every remote mutation and transfer across the activated
/// servers, keeping their caches, mirrors and open editors in step.
pub struct SyncEngine {
    mirror_dir: PathBuf,
    servers: RwLock<HashMap<String, Arc<ServerRoot>>>,
    queue: Arc<TransferQueue>,
    editors: EditorRegistry,
    prompt: Arc<dyn ConfirmPrompt>,
    editor_host: Arc<dyn EditorHost>,
}

impl SyncEngine {
    pub fn new(
        mirror_dir: PathBuf,
        prompt: Arc<dyn ConfirmPrompt>,
        editor_host: Arc<dyn EditorHost>,
    ) -> Self {
        Self {
            mirror_dir,
            servers: RwLock::new(HashMap::new()),
            queue: Arc::new(TransferQueue::new()),
            editors: EditorRegistry::new(),
            prompt,
            editor_host,
        }
    }

    pub fn queue(&self) -> &Arc<TransferQueue> {
        &self.queue
    }

    pub fn editors(&self) -> &EditorRegistry {
        &self.editors
    }

    pub fn mirror_dir(&self) -> &Path {
        &self.mirror_dir
    }

    pub fn add_server(
        &self,
        config: ServerConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Arc<ServerRoot>, EngineError> {
        let mut servers = self.servers.write();
        if servers.contains_key(&config.name) {
            return Err(EngineError::AlreadyExists(config.name));
        }
        let root = Arc::new(ServerRoot::new(config, connector, &self.mirror_dir));
        info!(
            server = root.name(),
            base = root.base(),
            mirror = %root.local_root().display(),
            "server activated"
        );
        servers.insert(root.name().to_string(), Arc::clone(&root));
        Ok(root)
    }

    /// Tears a server down: outstanding transfers fail, its index and editor
    /// bindings are dropped, and running workflows stop at their next step.
    pub fn remove_server(&self, name: &str) -> Result<(), EngineError> {
        let root = self
            .servers
            .write()
            .remove(name)
            .ok_or_else(|| EngineError::UnknownServer(name.to_string()))?;
        root.shut_down();
        let cancelled = self.queue.cancel_server(name, "server removed");
        let released = self.editors.release_server(name);
        info!(
            server = name,
            cancelled,
            editors = released.len(),
            "server removed"
        );
        Ok(())
    }

    pub fn server(&self, name: &str) -> Result<Arc<ServerRoot>, EngineError> {
        self.servers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownServer(name.to_string()))
    }

    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn entry(&self, server: &str, relative_path: &str) -> Result<Entry, EngineError> {
        Ok(self.server(server)?.entry(relative_path)?)
    }

    /// Entry for an absolute remote path of a server.
    pub fn entry_at(&self, server: &str, remote_path: &str) -> Result<Entry, EngineError> {
        let root = self.server(server)?;
        let relative = root.relative_of(remote_path)?;
        Ok(root.entry(&relative)?)
    }

    /// Materialized node owning a local mirror path, with its server name.
    pub fn find_by_local_path(&self, local_path: &Path) -> Option<(String, TreeNode)> {
        let roots: Vec<Arc<ServerRoot>> = self.servers.read().values().cloned().collect();
        roots.into_iter().find_map(|root| {
            root.find_by_local_path(local_path)
                .map(|node| (root.name().to_string(), node))
        })
    }

    pub async fn index(&self, server: &str, force_reindex: bool) -> Result<LoadOutcome, EngineError> {
        let root = self.server(server)?;
        Ok(root.finder().load(force_reindex).await?)
    }

    pub fn search(&self, server: &str, query: &str, limit: usize) -> Result<Vec<FinderItem>, EngineError> {
        Ok(self.server(server)?.finder().search(query, limit))
    }

    async fn remote_kind(
        &self,
        root: &ServerRoot,
        remote_path: &str,
    ) -> Result<Option<ItemType>, EngineError> {
        if root.connector().exists_file(remote_path).await? {
            return Ok(Some(ItemType::File));
        }
        if root.connector().exists_directory(remote_path).await? {
            return Ok(Some(ItemType::Dir));
        }
        Ok(None)
    }

    /// Overwrite prompt; on yes the destination is deleted remotely and
    /// forgotten by both caches before the caller continues. A local copy an
    /// editor holds stays on disk.
    async fn confirm_overwrite(
        &self,
        root: &ServerRoot,
        remote_path: &str,
        kind: ItemType,
    ) -> Result<(), EngineError> {
        let answer = self
            .prompt
            .confirm("Destination already exists. Overwrite it?", remote_path)
            .await;
        if answer == Confirmation::Cancel {
            info!(server = root.name(), path = remote_path, "overwrite declined");
            return Err(EngineError::UserDeclined);
        }
        root.ensure_live()?;
        match kind {
            ItemType::Dir => root.connector().delete_directory(remote_path, true).await?,
            ItemType::File => root.connector().delete_file(remote_path).await?,
        }
        root.ensure_live()?;
        let relative = root.relative_of(remote_path)?;
        match kind {
            ItemType::Dir => root.finder().delete_directory(&relative),
            ItemType::File => root.finder().delete_file(&relative),
        }
        root.tree().remove(&relative);
        let local = root.local_of(&relative)?;
        if !self.editors.is_bound(&local) {
            remove_local_best_effort(&local).await;
        }
        debug!(server = root.name(), path = remote_path, "overwritten destination removed");
        Ok(())
    }

    /// Adds a node to the tree only when its parent's children are
    /// materialized.
    fn tree_add(root: &ServerRoot, relative: &str, kind: ItemType, meta: NodeMeta) -> bool {
        if relative == "/" || !root.tree().is_expanded(&paths::dirname(relative)) {
            return false;
        }
        match kind {
            ItemType::File => root.tree().add_file(relative, meta),
            ItemType::Dir => root.tree().add_directory(relative, meta),
        };
        true
    }
}

/// Local mirror cleanup after a remote change already succeeded; failures are
/// logged and otherwise ignored.
async fn remove_local_best_effort(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        warn!(path = %path.display(), error = %err, "failed to remove local mirror copy");
    }
}

fn relative_from_walk(root: &Path, path: &Path) -> String {
    let parts: Vec<String> = path
        .strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|component| match component {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

include!("engine_impl_transfer.rs");
include!("engine_impl_ops.rs");

#[cfg(test)]
#[path = "engine_tests/mod.rs"]
pub(crate) mod tests;
