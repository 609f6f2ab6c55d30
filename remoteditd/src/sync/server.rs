use std::path::{Path, PathBuf};
use std::sync::Arc;

use remotedit_core::{Connector, Rights, ServerConfig};
use tokio_util::sync::CancellationToken;

use super::engine::EngineError;
use super::finder::{FinderCache, ItemType};
use super::paths::{self, PathError};
use super::tree::{TreeCache, TreeNode};

/// A file or directory of one server, with both of its addresses resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub server: String,
    pub relative_path: String,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub kind: ItemType,
    pub size: Option<u64>,
    pub rights: Option<Rights>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == ItemType::Dir
    }

    /// `None` for the server root.
    pub fn parent(&self) -> Option<String> {
        (self.relative_path != "/").then(|| paths::dirname(&self.relative_path))
    }
}

/// Everything the engine owns for one activated server profile.
pub struct ServerRoot {
    config: ServerConfig,
    base: String,
    connector: Arc<dyn Connector>,
    finder: Arc<FinderCache>,
    tree: TreeCache,
    local_root: PathBuf,
    live: CancellationToken,
}

impl ServerRoot {
    pub fn new(config: ServerConfig, connector: Arc<dyn Connector>, mirror_dir: &Path) -> Self {
        let base = paths::canonical(&config.remote);
        let local_root = mirror_dir.join(mirror_segment(&config));
        let finder = Arc::new(FinderCache::new(
            config.name.clone(),
            &base,
            Arc::clone(&connector),
        ));
        Self {
            config,
            base,
            connector,
            finder,
            tree: TreeCache::new(),
            local_root,
            live: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn finder(&self) -> &Arc<FinderCache> {
        &self.finder
    }

    pub fn tree(&self) -> &TreeCache {
        &self.tree
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn is_live(&self) -> bool {
        !self.live.is_cancelled()
    }

    /// Continuations call this before touching caches after an await.
    pub fn ensure_live(&self) -> Result<(), EngineError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(EngineError::ServerGone(self.name().to_string()))
        }
    }

    pub(crate) fn shut_down(&self) {
        self.live.cancel();
        self.finder.invalidate();
    }

    /// Canonical path relative to the base for an absolute remote path.
    pub fn relative_of(&self, remote_path: &str) -> Result<String, PathError> {
        paths::relative_to_base(&self.base, remote_path)
    }

    pub fn remote_of(&self, relative_path: &str) -> String {
        paths::remote_for(&self.base, relative_path)
    }

    pub fn local_of(&self, relative_path: &str) -> Result<PathBuf, PathError> {
        paths::local_path_for(&self.local_root, relative_path)
    }

    pub fn relative_of_local(&self, local_path: &Path) -> Result<String, PathError> {
        paths::relative_from_local(&self.local_root, local_path)
    }

    /// Resolves a relative path using whatever the caches know about it.
    /// Kind defaults to file when neither cache has seen the path.
    pub fn entry(&self, relative_path: &str) -> Result<Entry, PathError> {
        let relative_path = paths::canonical(relative_path);
        if let Some(node) = self.tree.get(&relative_path) {
            return self.entry_for(&node);
        }
        let (kind, size) = match self.finder.get(&relative_path) {
            Some(item) if item.item_type == ItemType::Dir => (ItemType::Dir, None),
            Some(item) => (ItemType::File, Some(item.size)),
            None if relative_path == "/" => (ItemType::Dir, None),
            None => (ItemType::File, None),
        };
        Ok(Entry {
            server: self.name().to_string(),
            remote_path: self.remote_of(&relative_path),
            local_path: self.local_of(&relative_path)?,
            relative_path,
            kind,
            size,
            rights: None,
        })
    }

    pub fn entry_for(&self, node: &TreeNode) -> Result<Entry, PathError> {
        Ok(Entry {
            server: self.name().to_string(),
            relative_path: node.relative_path.clone(),
            remote_path: self.remote_of(&node.relative_path),
            local_path: self.local_of(&node.relative_path)?,
            kind: node.kind,
            size: node.size,
            rights: node.rights,
        })
    }

    /// Materialized node for an absolute remote path.
    pub fn find_by_remote_path(&self, remote_path: &str) -> Option<TreeNode> {
        let relative = self.relative_of(remote_path).ok()?;
        self.tree.get(&relative)
    }

    /// Materialized node for a path under this server's mirror root.
    pub fn find_by_local_path(&self, local_path: &Path) -> Option<TreeNode> {
        let relative = self.relative_of_local(local_path).ok()?;
        self.tree.get(&relative)
    }
}

/// Mirror directory name of a profile: host, port and profile name, so
/// profiles sharing a host never share a mirror.
fn mirror_segment(config: &ServerConfig) -> String {
    paths::sanitize_segment(&format!("{}-{}-{}", config.host, config.port, config.name))
}
