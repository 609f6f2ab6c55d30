use super::*;
use crate::sync::engine::tests::support::RecordingConnector;
use remotedit_core::LocalConnector;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

fn remote_tree() -> TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path().join("www");
    std::fs::create_dir_all(root.join("css")).unwrap();
    std::fs::create_dir_all(root.join("lib/vendor/deep")).unwrap();
    std::fs::write(root.join("index.php"), b"<?php").unwrap();
    std::fs::write(root.join("css/site.css"), b"body{}").unwrap();
    std::fs::write(root.join("lib/vendor/deep/util.php"), b"<?php //").unwrap();
    dir
}

fn make_cache(remote: &TempDir) -> FinderCache {
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    FinderCache::new("srv", "/www", connector)
}

fn paths_of(cache: &FinderCache) -> Vec<String> {
    cache
        .items()
        .into_iter()
        .map(|item| item.relative_path)
        .collect()
}

#[tokio::test]
async fn load_walks_the_whole_tree() {
    let remote = remote_tree();
    let cache = make_cache(&remote);
    let mut events = cache.subscribe();

    let outcome = cache.load(false).await.unwrap();

    assert_eq!(outcome, LoadOutcome::Indexed(7));
    assert_eq!(cache.load_state(), LoadState::Loaded);
    assert_eq!(
        paths_of(&cache),
        vec![
            "/css",
            "/css/site.css",
            "/index.php",
            "/lib",
            "/lib/vendor",
            "/lib/vendor/deep",
            "/lib/vendor/deep/util.php",
        ]
    );
    assert_eq!(cache.get("/css/site.css").unwrap().size, 6);

    let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
    assert!(matches!(last, FinderEvent::Finished(items) if items.len() == 7));
}

#[tokio::test]
async fn second_load_is_served_from_the_index() {
    let remote = remote_tree();
    let cache = make_cache(&remote);
    cache.load(false).await.unwrap();

    std::fs::write(remote.path().join("www/new.txt"), b"n").unwrap();
    let mut events = cache.subscribe();
    assert_eq!(cache.load(false).await.unwrap(), LoadOutcome::Cached);
    assert!(cache.get("/new.txt").is_none());
    assert!(matches!(events.try_recv().unwrap(), FinderEvent::Finished(_)));

    assert_eq!(cache.load(true).await.unwrap(), LoadOutcome::Indexed(8));
    assert!(cache.get("/new.txt").is_some());
}

#[tokio::test]
async fn listing_error_is_reported_and_clears_loading_state() {
    let remote = tempdir().unwrap();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    let cache = FinderCache::new("srv", "/missing", connector);
    let mut events = cache.subscribe();

    assert!(cache.load(false).await.is_err());
    assert_eq!(cache.load_state(), LoadState::Empty);
    assert!(matches!(events.try_recv().unwrap(), FinderEvent::Error(_)));
}

#[tokio::test]
async fn spawned_load_delivers_events() {
    let remote = remote_tree();
    let cache = Arc::new(make_cache(&remote));
    let mut events = cache.subscribe();

    let outcome = cache.spawn_load(false).await.unwrap().unwrap();
    assert_eq!(outcome, LoadOutcome::Indexed(7));
    let finished = std::iter::from_fn(|| events.try_recv().ok())
        .any(|event| matches!(event, FinderEvent::Finished(_)));
    assert!(finished);
}

#[tokio::test]
async fn dropped_walk_does_not_stay_loading() {
    let remote = remote_tree();
    let connector = Arc::new(RecordingConnector::new(remote.path()));
    let _gate = connector.hold("list_directory");
    let cache = FinderCache::new("srv", "/www", connector);

    let timed_out = tokio::time::timeout(Duration::from_millis(50), cache.load(false)).await;

    assert!(timed_out.is_err());
    assert_eq!(cache.load_state(), LoadState::Empty);
    assert!(cache.is_empty());
    assert_eq!(cache.load(false).await.unwrap(), LoadOutcome::Indexed(7));
}

#[tokio::test]
async fn forced_load_supersedes_the_walk_in_flight() {
    let remote = remote_tree();
    let connector = Arc::new(RecordingConnector::new(remote.path()));
    let gate = connector.hold("list_directory");
    let cache = Arc::new(FinderCache::new("srv", "/www", connector));

    let first = cache.spawn_load(false);
    gate.reached().await;
    assert_eq!(cache.load(false).await.unwrap(), LoadOutcome::AlreadyRunning);
    std::fs::remove_file(remote.path().join("www/index.php")).unwrap();

    assert_eq!(cache.load(true).await.unwrap(), LoadOutcome::Indexed(6));
    gate.release();
    assert_eq!(first.await.unwrap().unwrap(), LoadOutcome::Superseded);

    assert_eq!(cache.load_state(), LoadState::Loaded);
    assert!(cache.get("/index.php").is_none());
    assert_eq!(cache.len(), 6);
}

#[tokio::test]
async fn large_listings_emit_partial_snapshots() {
    let remote = tempdir().unwrap();
    let root = remote.path().join("www");
    std::fs::create_dir_all(&root).unwrap();
    for idx in 0..INDEX_BATCH + 50 {
        std::fs::write(root.join(format!("file{idx}.txt")), b"x").unwrap();
    }
    let cache = make_cache(&remote);
    let mut events = cache.subscribe();

    cache.load(false).await.unwrap();

    let received: Vec<FinderEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(matches!(
        received.first(),
        Some(FinderEvent::Indexing(items)) if items.len() == INDEX_BATCH + 50
    ));
    assert!(matches!(
        received.last(),
        Some(FinderEvent::Finished(items)) if items.len() == INDEX_BATCH + 50
    ));
}

#[test]
fn rename_directory_rewrites_every_descendant_prefix() {
    let remote = tempdir().unwrap();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    let cache = FinderCache::new("srv", "/", connector);
    cache.add_directory("/a/b/");
    cache.add_file("/a/b/x.txt", 1);
    cache.add_directory("/a/b/sub");
    cache.add_file("/a/b/sub/y.txt", 2);
    cache.add_file("/a/bb/z.txt", 3);

    cache.rename_directory("/a/b/", "/a/c/");

    assert_eq!(
        paths_of(&cache),
        vec!["/a/bb/z.txt", "/a/c", "/a/c/sub", "/a/c/sub/y.txt", "/a/c/x.txt"]
    );
    assert_eq!(cache.get("/a/c/sub/y.txt").unwrap().size, 2);
}

#[test]
fn delete_directory_removes_only_its_subtree() {
    let remote = tempdir().unwrap();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    let cache = FinderCache::new("srv", "/", connector);
    cache.add_directory("/a");
    cache.add_file("/a/x.txt", 1);
    cache.add_file("/ab.txt", 1);

    cache.delete_directory("/a");

    assert_eq!(paths_of(&cache), vec!["/ab.txt"]);
}

#[test]
fn replayed_operations_match_net_effect() {
    let remote = tempdir().unwrap();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    let cache = FinderCache::new("srv", "/", connector);

    cache.add_file("/doc.txt", 4);
    cache.rename_file("/doc.txt", "/notes.txt", 4);
    cache.delete_file("/notes.txt");
    cache.add_file("/notes.txt", 9);
    cache.rename_file("/notes.txt", "/final.txt", 9);

    assert_eq!(
        cache.items(),
        vec![FinderItem {
            relative_path: "/final.txt".into(),
            size: 9,
            item_type: ItemType::File,
        }]
    );
}

#[test]
fn mutations_emit_updated_events() {
    let remote = tempdir().unwrap();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    let cache = FinderCache::new("srv", "/", connector);
    let mut events = cache.subscribe();

    cache.add_file("/a.txt", 1);

    assert_eq!(
        events.try_recv().unwrap(),
        FinderEvent::Updated(vec![FinderItem {
            relative_path: "/a.txt".into(),
            size: 1,
            item_type: ItemType::File,
        }])
    );
}

#[test]
fn search_matches_characters_in_order() {
    let remote = tempdir().unwrap();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    let cache = FinderCache::new("srv", "/", connector);
    cache.add_file("/lib/vendor/deep/util.php", 1);
    cache.add_file("/util.php", 1);
    cache.add_file("/index.php", 1);
    cache.add_directory("/utilities");

    let hits: Vec<_> = cache
        .search("UTL", 10)
        .into_iter()
        .map(|item| item.relative_path)
        .collect();
    assert_eq!(hits, vec!["/util.php", "/lib/vendor/deep/util.php"]);
    assert_eq!(cache.search("php", 1).len(), 1);
}

#[test]
fn invalidate_empties_the_index() {
    let remote = tempdir().unwrap();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(remote.path()));
    let cache = FinderCache::new("srv", "/", connector);
    cache.add_file("/a.txt", 1);

    cache.invalidate();

    assert!(cache.is_empty());
    assert_eq!(cache.load_state(), LoadState::Empty);
}
