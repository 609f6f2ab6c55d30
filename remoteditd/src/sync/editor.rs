use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

/// The editing surface the engine hands mirror files to.
pub trait EditorHost: Send + Sync {
    fn open(&self, local_path: &Path) -> io::Result<()>;
    fn focus(&self, local_path: &Path);
    /// Redirects an open session's save target without losing unsaved text.
    fn retarget(&self, from: &Path, to: &Path);
}

/// Host for headless use: sessions are only logged.
#[derive(Debug, Default)]
pub struct LoggingEditorHost;

impl EditorHost for LoggingEditorHost {
    fn open(&self, local_path: &Path) -> io::Result<()> {
        info!(path = %local_path.display(), "mirror copy ready for editing");
        Ok(())
    }

    fn focus(&self, local_path: &Path) {
        info!(path = %local_path.display(), "already open");
    }

    fn retarget(&self, from: &Path, to: &Path) {
        info!(from = %from.display(), to = %to.display(), "editor retargeted");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorBinding {
    pub server: String,
    pub relative_path: String,
}

/// Non-owning association between open editor sessions and remote files,
/// keyed by local mirror path.
#[derive(Debug, Default)]
pub struct EditorRegistry {
    bindings: Mutex<HashMap<PathBuf, EditorBinding>>,
}

impl EditorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, local_path: &Path, server: &str, relative_path: &str) {
        self.bindings.lock().insert(
            local_path.to_path_buf(),
            EditorBinding {
                server: server.to_string(),
                relative_path: relative_path.to_string(),
            },
        );
    }

    pub fn unbind(&self, local_path: &Path) -> Option<EditorBinding> {
        self.bindings.lock().remove(local_path)
    }

    pub fn get(&self, local_path: &Path) -> Option<EditorBinding> {
        self.bindings.lock().get(local_path).cloned()
    }

    pub fn is_bound(&self, local_path: &Path) -> bool {
        self.bindings.lock().contains_key(local_path)
    }

    /// Moves every binding at or below `from` to the matching path below
    /// `to`. Returns the `(old, new)` local paths that moved.
    pub fn rebind(
        &self,
        from: &Path,
        to: &Path,
        rewrite_relative: impl Fn(&str) -> Option<String>,
    ) -> Vec<(PathBuf, PathBuf)> {
        let mut bindings = self.bindings.lock();
        let moving: Vec<PathBuf> = bindings
            .keys()
            .filter(|path| path.starts_with(from))
            .cloned()
            .collect();
        let mut moved = Vec::with_capacity(moving.len());
        for old in moving {
            let Some(mut binding) = bindings.remove(&old) else {
                continue;
            };
            let new = match old.strip_prefix(from) {
                Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
                Ok(rest) => to.join(rest),
                Err(_) => old.clone(),
            };
            if let Some(relative) = rewrite_relative(&binding.relative_path) {
                binding.relative_path = relative;
            }
            bindings.insert(new.clone(), binding);
            moved.push((old, new));
        }
        moved
    }

    /// Drops every binding of a server. Returns the local paths released.
    pub fn release_server(&self, server: &str) -> Vec<PathBuf> {
        let mut bindings = self.bindings.lock();
        let released: Vec<PathBuf> = bindings
            .iter()
            .filter(|(_, binding)| binding.server == server)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &released {
            bindings.remove(path);
        }
        released
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::paths;

    #[test]
    fn rebind_moves_directory_contents() {
        let registry = EditorRegistry::new();
        registry.bind(Path::new("/m/a/b/x.txt"), "srv", "/a/b/x.txt");
        registry.bind(Path::new("/m/a/bb/y.txt"), "srv", "/a/bb/y.txt");

        let moved = registry.rebind(Path::new("/m/a/b"), Path::new("/m/a/c"), |rel| {
            paths::rebase(rel, "/a/b", "/a/c")
        });

        assert_eq!(
            moved,
            vec![(PathBuf::from("/m/a/b/x.txt"), PathBuf::from("/m/a/c/x.txt"))]
        );
        assert_eq!(
            registry.get(Path::new("/m/a/c/x.txt")).unwrap().relative_path,
            "/a/c/x.txt"
        );
        // Sibling with a shared name prefix is untouched.
        assert!(registry.is_bound(Path::new("/m/a/bb/y.txt")));
    }

    #[test]
    fn rebind_single_file() {
        let registry = EditorRegistry::new();
        registry.bind(Path::new("/m/a.txt"), "srv", "/a.txt");
        registry.rebind(Path::new("/m/a.txt"), Path::new("/m/b.txt"), |_| {
            Some("/b.txt".to_string())
        });
        assert!(!registry.is_bound(Path::new("/m/a.txt")));
        assert_eq!(
            registry.get(Path::new("/m/b.txt")).unwrap().relative_path,
            "/b.txt"
        );
    }

    #[test]
    fn release_server_keeps_other_servers() {
        let registry = EditorRegistry::new();
        registry.bind(Path::new("/m/one/a.txt"), "one", "/a.txt");
        registry.bind(Path::new("/m/two/a.txt"), "two", "/a.txt");
        assert_eq!(registry.release_server("one").len(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.unbind(Path::new("/m/two/a.txt")).is_some());
        assert!(registry.is_empty());
    }
}
