use std::sync::Arc;

use remotedit_core::{Connector, Direction, LocalConnector, ServerConfig};

use super::support::{SERVER, fixture};
use crate::sync::engine::EngineError;
use crate::sync::finder::{ItemType, LoadOutcome};
use crate::sync::queue::TransferStatus;

#[tokio::test]
async fn open_downloads_once_then_focuses() {
    let fx = fixture();
    fx.put_remote("/index.php", b"<?php echo 1;");
    fx.engine.expand(SERVER, "/").await.unwrap();
    let entry = fx.engine.entry(SERVER, "/index.php").unwrap();

    let local = fx.engine.open(&entry).await.unwrap();
    assert_eq!(std::fs::read(&local).unwrap(), b"<?php echo 1;");
    assert!(fx.root().tree().get("/index.php").unwrap().open);
    assert_eq!(fx.editor.opened.lock().clone(), vec![local.clone()]);

    fx.engine.open(&entry).await.unwrap();
    assert_eq!(fx.connector.calls_of("download_file").len(), 1);
    assert_eq!(fx.editor.focused.lock().clone(), vec![local]);
}

#[tokio::test]
async fn saving_an_open_file_uploads_it() {
    let fx = fixture();
    fx.put_remote("/style.css", b"a{}");
    fx.engine.expand(SERVER, "/").await.unwrap();
    let entry = fx.engine.entry(SERVER, "/style.css").unwrap();
    let local = fx.engine.open(&entry).await.unwrap();

    std::fs::write(&local, b"a{color:red}").unwrap();
    let item = fx.engine.on_editor_saved(&local).await.unwrap().unwrap();

    assert_eq!(item.direction, Direction::Upload);
    assert_eq!(item.status, TransferStatus::Done);
    assert_eq!(
        std::fs::read(fx.remote_disk("/style.css")).unwrap(),
        b"a{color:red}"
    );
    assert_eq!(fx.root().tree().get("/style.css").unwrap().size, Some(12));
    // Saves never prompt for overwrite.
    assert!(fx.connector.calls_of("exists_file").is_empty());
}

#[tokio::test]
async fn saving_an_unbound_file_is_ignored() {
    let fx = fixture();
    let stray = fx.mirror.path().join("stray.txt");
    std::fs::write(&stray, b"x").unwrap();

    assert!(fx.engine.on_editor_saved(&stray).await.unwrap().is_none());
    assert!(fx.engine.queue().is_empty());
}

#[tokio::test]
async fn closing_releases_the_binding() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"a");
    fx.engine.expand(SERVER, "/").await.unwrap();
    let entry = fx.engine.entry(SERVER, "/a.txt").unwrap();
    let local = fx.engine.open(&entry).await.unwrap();

    assert!(fx.engine.on_editor_closed(&local));
    assert!(!fx.engine.on_editor_closed(&local));
    assert!(!fx.root().tree().get("/a.txt").unwrap().open);
    assert!(fx.engine.on_editor_saved(&local).await.unwrap().is_none());
}

#[tokio::test]
async fn reload_only_refreshes_open_files() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"v1");
    let entry = fx.engine.entry(SERVER, "/a.txt").unwrap();
    assert!(fx.engine.reload_file(&entry).await.unwrap().is_none());

    fx.engine.open(&entry).await.unwrap();
    fx.put_remote("/a.txt", b"v2");
    let item = fx.engine.reload_file(&entry).await.unwrap().unwrap();

    assert_eq!(item.direction, Direction::Download);
    assert_eq!(std::fs::read(&entry.local_path).unwrap(), b"v2");
}

#[tokio::test]
async fn expand_drops_entries_that_vanished_remotely() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"a");
    fx.put_remote("/b.txt", b"b");
    fx.put_remote("/.hidden", b"h");
    let names: Vec<_> = fx
        .engine
        .expand(SERVER, "/")
        .await
        .unwrap()
        .into_iter()
        .map(|node| node.name)
        .collect();
    assert_eq!(names, vec![".hidden", "a.txt", "b.txt"]);

    std::fs::remove_file(fx.remote_disk("/b.txt")).unwrap();
    let names: Vec<_> = fx
        .engine
        .expand(SERVER, "/")
        .await
        .unwrap()
        .into_iter()
        .map(|node| node.name)
        .collect();
    assert_eq!(names, vec![".hidden", "a.txt"]);
}

#[tokio::test]
async fn index_and_search_through_the_engine() {
    let fx = fixture();
    fx.put_remote("/lib/util.php", b"1");
    fx.put_remote("/index.php", b"2");

    assert_eq!(
        fx.engine.index(SERVER, false).await.unwrap(),
        LoadOutcome::Indexed(3)
    );
    assert_eq!(fx.engine.index(SERVER, false).await.unwrap(), LoadOutcome::Cached);
    let hits = fx.engine.search(SERVER, "utl", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].relative_path, "/lib/util.php");
    assert_eq!(hits[0].item_type, ItemType::File);
}

#[tokio::test]
async fn removing_a_server_cancels_its_work() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"a");
    fx.engine.index(SERVER, false).await.unwrap();
    let entry = fx.engine.entry(SERVER, "/a.txt").unwrap();
    fx.engine.open(&entry).await.unwrap();
    let pending = fx
        .engine
        .queue()
        .enqueue(
            SERVER,
            Direction::Upload,
            "/b.txt",
            &fx.mirror_of("/b.txt"),
            1,
        )
        .unwrap();
    let root = fx.root();

    fx.engine.remove_server(SERVER).unwrap();

    assert_eq!(
        fx.engine.queue().get(pending.id).unwrap().status,
        TransferStatus::Error
    );
    assert!(fx.engine.editors().is_empty());
    assert!(root.finder().is_empty());
    assert!(matches!(root.ensure_live(), Err(EngineError::ServerGone(_))));
    assert!(matches!(
        fx.engine.entry(SERVER, "/a.txt"),
        Err(EngineError::UnknownServer(_))
    ));
    assert!(matches!(
        fx.engine.remove_server(SERVER),
        Err(EngineError::UnknownServer(_))
    ));
}

#[tokio::test]
async fn upload_suspended_in_the_connector_stops_when_its_server_goes() {
    let fx = fixture();
    fx.engine.expand(SERVER, "/").await.unwrap();
    let root = fx.root();
    let local = fx.mirror_of("/a.txt");
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, b"new").unwrap();
    let gate = fx.connector.hold("upload_file");

    let upload = fx.engine.upload_file(SERVER, &local, "/a.txt", false);
    let remove = async {
        gate.reached().await;
        fx.engine.remove_server(SERVER).unwrap();
        gate.release();
    };
    let (result, ()) = tokio::join!(upload, remove);

    assert!(matches!(result, Err(EngineError::ServerGone(name)) if name == SERVER));
    let items = fx.engine.queue().items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, TransferStatus::Error);
    assert_eq!(items[0].error.as_deref(), Some("server removed"));
    assert!(root.finder().is_empty());
    assert!(root.tree().get("/a.txt").is_none());
}

#[tokio::test]
async fn server_names_are_unique() {
    let fx = fixture();
    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(fx.remote.path()));
    let err = fx
        .engine
        .add_server(ServerConfig::new(SERVER, "other.example.org", "/"), connector)
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
    assert_eq!(fx.engine.server_names(), vec![SERVER]);
}

#[tokio::test]
async fn local_paths_resolve_to_materialized_nodes() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"a");
    fx.engine.expand(SERVER, "/").await.unwrap();

    let (server, node) = fx
        .engine
        .find_by_local_path(&fx.mirror_of("/a.txt"))
        .unwrap();
    assert_eq!(server, SERVER);
    assert_eq!(node.relative_path, "/a.txt");
    assert!(
        fx.engine
            .find_by_local_path(&fx.mirror.path().join("elsewhere.txt"))
            .is_none()
    );
}
