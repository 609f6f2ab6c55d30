use std::collections::BTreeMap;

use parking_lot::Mutex;
use remotedit_core::Rights;

use super::finder::ItemType;
use super::paths;

/// Metadata known about a node; `None` means unknown and keeps what the node
/// already had.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeMeta {
    pub size: Option<u64>,
    pub rights: Option<Rights>,
}

impl NodeMeta {
    pub fn file(size: u64) -> Self {
        Self {
            size: Some(size),
            rights: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub relative_path: String,
    pub name: String,
    pub kind: ItemType,
    pub size: Option<u64>,
    pub rights: Option<Rights>,
    /// A transfer touching this node is outstanding.
    pub syncing: bool,
    /// The local mirror copy is bound to an editor.
    pub open: bool,
    /// Children are materialized below this node.
    pub expanded: bool,
}

impl TreeNode {
    fn new(relative_path: String, kind: ItemType) -> Self {
        let name = paths::basename(&relative_path).to_string();
        Self {
            relative_path,
            name,
            kind,
            size: None,
            rights: None,
            syncing: false,
            open: false,
            expanded: false,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ItemType::Dir
    }
}

#[derive(Debug)]
struct TreeState {
    nodes: BTreeMap<String, TreeNode>,
    selected: Option<String>,
}

/// Nodes of one server the user has actually visited, keyed by canonical
/// relative path. The root `/` always exists.
#[derive(Debug)]
pub struct TreeCache {
    state: Mutex<TreeState>,
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeCache {
    pub fn new() -> Self {
        let mut root = TreeNode::new("/".to_string(), ItemType::Dir);
        root.expanded = true;
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), root);
        Self {
            state: Mutex::new(TreeState {
                nodes,
                selected: None,
            }),
        }
    }

    pub fn get(&self, path: &str) -> Option<TreeNode> {
        self.state.lock().nodes.get(&paths::canonical(path)).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(&paths::canonical(path))
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.state
            .lock()
            .nodes
            .get(&paths::canonical(path))
            .is_some_and(|node| node.expanded)
    }

    pub fn add_file(&self, path: &str, meta: NodeMeta) -> TreeNode {
        self.upsert(path, ItemType::File, meta)
    }

    pub fn add_directory(&self, path: &str, meta: NodeMeta) -> TreeNode {
        self.upsert(path, ItemType::Dir, meta)
    }

    /// Drops the node and its subtree. Returns the number of nodes removed.
    pub fn remove(&self, path: &str) -> usize {
        let key = paths::canonical(path);
        if key == "/" {
            return 0;
        }
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .nodes
            .range(key.clone()..)
            .take_while(|(candidate, _)| candidate.starts_with(&key))
            .filter(|(candidate, _)| paths::is_within(&key, candidate))
            .map(|(candidate, _)| candidate.clone())
            .collect();
        for candidate in &doomed {
            state.nodes.remove(candidate);
        }
        if state
            .selected
            .as_deref()
            .is_some_and(|selected| paths::is_within(&key, selected))
        {
            state.selected = None;
        }
        doomed.len()
    }

    /// Direct children of a directory, sorted by path.
    pub fn children(&self, dir: &str) -> Vec<TreeNode> {
        let dir = paths::canonical(dir);
        self.state
            .lock()
            .nodes
            .values()
            .filter(|node| {
                node.relative_path != "/" && paths::dirname(&node.relative_path) == dir
            })
            .cloned()
            .collect()
    }

    /// Materializes a directory listing: listed children are added or
    /// updated in place, children that disappeared are dropped with their
    /// subtrees.
    pub fn replace_children(&self, dir: &str, listed: Vec<(String, ItemType, NodeMeta)>) {
        let dir = paths::canonical(dir);
        self.add_directory(&dir, NodeMeta::default());
        self.update(&dir, |node| node.expanded = true);
        let listed_paths: Vec<String> = listed
            .iter()
            .map(|(name, _, _)| paths::canonical(&paths::join(&dir, name)))
            .collect();
        for stale in self.children(&dir) {
            let replaced_by_same_kind = listed
                .iter()
                .zip(&listed_paths)
                .any(|((_, kind, _), path)| *path == stale.relative_path && *kind == stale.kind);
            if !replaced_by_same_kind {
                self.remove(&stale.relative_path);
            }
        }
        for ((_, kind, meta), path) in listed.into_iter().zip(listed_paths) {
            self.upsert(&path, kind, meta);
        }
    }

    pub fn set_syncing(&self, path: &str, syncing: bool) -> bool {
        self.update(path, |node| node.syncing = syncing)
    }

    pub fn set_open(&self, path: &str, open: bool) -> bool {
        self.update(path, |node| node.open = open)
    }

    pub fn set_rights(&self, path: &str, rights: Rights) -> bool {
        self.update(path, |node| node.rights = Some(rights))
    }

    pub fn set_size(&self, path: &str, size: u64) -> bool {
        self.update(path, |node| node.size = Some(size))
    }

    pub fn select(&self, path: &str) -> bool {
        let key = paths::canonical(path);
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&key) {
            return false;
        }
        state.selected = Some(key);
        true
    }

    pub fn selected(&self) -> Option<String> {
        self.state.lock().selected.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, path: &str, apply: impl FnOnce(&mut TreeNode)) -> bool {
        match self.state.lock().nodes.get_mut(&paths::canonical(path)) {
            Some(node) => {
                apply(node);
                true
            }
            None => false,
        }
    }

    fn upsert(&self, path: &str, kind: ItemType, meta: NodeMeta) -> TreeNode {
        let key = paths::canonical(path);
        let mut state = self.state.lock();

        let mut ancestor = paths::dirname(&key);
        loop {
            let parent = paths::dirname(&ancestor);
            let node = state
                .nodes
                .entry(ancestor.clone())
                .or_insert_with(|| TreeNode::new(ancestor.clone(), ItemType::Dir));
            node.kind = ItemType::Dir;
            node.expanded = true;
            if ancestor == "/" {
                break;
            }
            ancestor = parent;
        }

        let node = state
            .nodes
            .entry(key.clone())
            .or_insert_with(|| TreeNode::new(key, kind));
        node.kind = kind;
        if meta.size.is_some() {
            node.size = meta.size;
        }
        if meta.rights.is_some() {
            node.rights = meta.rights;
        }
        node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_always_exists() {
        let tree = TreeCache::new();
        assert!(tree.get("/").unwrap().is_dir());
        assert_eq!(tree.remove("/"), 0);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn adding_existing_path_updates_in_place() {
        let tree = TreeCache::new();
        tree.add_file("/a.txt", NodeMeta::file(3));
        tree.set_open("/a.txt", true);

        let node = tree.add_file("a.txt", NodeMeta::file(9));

        assert_eq!(tree.len(), 2);
        assert_eq!(node.size, Some(9));
        assert!(node.open);
    }

    #[test]
    fn unknown_meta_keeps_previous_values() {
        let tree = TreeCache::new();
        tree.add_file(
            "/a.txt",
            NodeMeta {
                size: Some(3),
                rights: Some(Rights::from_octal(0o644)),
            },
        );
        let node = tree.add_file("/a.txt", NodeMeta::default());
        assert_eq!(node.size, Some(3));
        assert_eq!(node.rights, Some(Rights::from_octal(0o644)));
    }

    #[test]
    fn missing_ancestors_are_materialized() {
        let tree = TreeCache::new();
        tree.add_file("/a/b/c.txt", NodeMeta::file(1));
        assert!(tree.get("/a").unwrap().is_dir());
        assert!(tree.get("/a/b").unwrap().is_dir());
        assert_eq!(tree.children("/a").len(), 1);
    }

    #[test]
    fn expansion_tracks_materialized_children() {
        let tree = TreeCache::new();
        assert!(tree.is_expanded("/"));
        tree.add_directory("/empty", NodeMeta::default());
        assert!(!tree.is_expanded("/empty"));
        tree.replace_children("/empty", Vec::new());
        assert!(tree.is_expanded("/empty"));
        tree.add_file("/x/y.txt", NodeMeta::file(1));
        assert!(tree.is_expanded("/x"));
    }

    #[test]
    fn remove_drops_subtree_and_selection() {
        let tree = TreeCache::new();
        tree.add_file("/a/b/c.txt", NodeMeta::file(1));
        tree.add_file("/ab.txt", NodeMeta::file(1));
        tree.select("/a/b/c.txt");

        assert_eq!(tree.remove("/a"), 3);

        assert!(tree.get("/ab.txt").is_some());
        assert_eq!(tree.selected(), None);
    }

    #[test]
    fn replace_children_prunes_vanished_entries() {
        let tree = TreeCache::new();
        tree.add_file("/d/old.txt", NodeMeta::file(1));
        tree.add_file("/d/sub/deep.txt", NodeMeta::file(1));
        tree.add_file("/d/keep.txt", NodeMeta::file(1));
        tree.set_open("/d/keep.txt", true);

        tree.replace_children(
            "/d",
            vec![
                ("keep.txt".into(), ItemType::File, NodeMeta::file(5)),
                ("new".into(), ItemType::Dir, NodeMeta::default()),
            ],
        );

        let names: Vec<_> = tree.children("/d").into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["keep.txt", "new"]);
        assert!(tree.get("/d/sub/deep.txt").is_none());
        let keep = tree.get("/d/keep.txt").unwrap();
        assert_eq!(keep.size, Some(5));
        assert!(keep.open);
    }

    #[test]
    fn flags_only_apply_to_materialized_nodes() {
        let tree = TreeCache::new();
        assert!(!tree.set_syncing("/missing.txt", true));
        assert!(!tree.select("/missing.txt"));
        tree.add_file("/a.txt", NodeMeta::file(1));
        assert!(tree.set_syncing("/a.txt", true));
        assert!(tree.get("/a.txt").unwrap().syncing);
    }
}
