use remotedit_core::Rights;

use super::support::{SERVER, fixture, fixture_with_base};
use crate::sync::engine::EngineError;
use crate::sync::finder::{FinderItem, ItemType};
use crate::sync::prompt::Confirmation;

#[tokio::test]
async fn renaming_a_directory_rewrites_index_editors_and_mirror() {
    let fx = fixture();
    fx.put_remote("/a/b/x.txt", b"x");
    fx.put_remote("/a/b/sub/y.txt", b"yy");
    fx.put_remote("/a/bb/z.txt", b"zzz");
    fx.engine.index(SERVER, false).await.unwrap();
    fx.engine.expand(SERVER, "/").await.unwrap();
    fx.engine.expand(SERVER, "/a").await.unwrap();
    let file = fx.engine.entry(SERVER, "/a/b/x.txt").unwrap();
    fx.engine.open(&file).await.unwrap();

    let dir = fx.engine.entry(SERVER, "/a/b").unwrap();
    let renamed = fx.engine.rename(&dir, "/a/c/").await.unwrap();

    assert_eq!(renamed.relative_path, "/a/c");
    assert_eq!(renamed.remote_path, "/a/c");
    assert_eq!(
        fx.finder_paths(),
        vec![
            "/a",
            "/a/bb",
            "/a/bb/z.txt",
            "/a/c",
            "/a/c/sub",
            "/a/c/sub/y.txt",
            "/a/c/x.txt",
        ]
    );
    assert!(fx.remote_disk("/a/c/sub/y.txt").exists());

    let new_local = fx.mirror_of("/a/c/x.txt");
    let binding = fx.engine.editors().get(&new_local).unwrap();
    assert_eq!(binding.relative_path, "/a/c/x.txt");
    assert_eq!(
        fx.editor.retargeted.lock().clone(),
        vec![(fx.mirror_of("/a/b/x.txt"), new_local.clone())]
    );
    assert_eq!(std::fs::read(&new_local).unwrap(), b"x");
    assert!(!fx.mirror_of("/a/b").exists());

    let root = fx.root();
    assert!(root.tree().get("/a/b").is_none());
    assert!(root.tree().get("/a/c").unwrap().is_dir());
}

#[tokio::test]
async fn rename_and_move_to_the_same_path_do_nothing() {
    let fx = fixture();
    fx.put_remote("/doc.txt", b"doc");
    fx.engine.index(SERVER, false).await.unwrap();
    let before = fx.finder_paths();
    fx.connector.clear_calls();

    let entry = fx.engine.entry(SERVER, "/doc.txt").unwrap();
    let same = fx.engine.rename(&entry, "doc.txt").await.unwrap();
    fx.engine
        .move_path(SERVER, "/doc.txt", "//doc.txt")
        .await
        .unwrap();

    assert_eq!(same, entry);
    assert!(fx.connector.calls().is_empty());
    assert_eq!(fx.finder_paths(), before);
    assert!(fx.prompt.asked().is_empty());
}

#[tokio::test]
async fn parent_segments_never_reach_the_connector() {
    let fx = fixture_with_base("/www");
    fx.put_remote("/www/doc.txt", b"doc");
    fx.engine.index(SERVER, false).await.unwrap();
    fx.connector.clear_calls();
    let entry = fx.engine.entry(SERVER, "/doc.txt").unwrap();

    let err = fx
        .engine
        .rename(&entry, "../escaped.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Path(_)));
    assert!(fx.engine.expand(SERVER, "/../etc").await.is_err());
    assert!(
        fx.engine
            .create(SERVER, "/", "../up.txt", ItemType::File)
            .await
            .is_err()
    );

    assert!(fx.connector.calls().is_empty());
    assert!(fx.remote_disk("/www/doc.txt").exists());
    assert_eq!(fx.finder_paths(), vec!["/doc.txt"]);
}

#[tokio::test]
async fn copy_in_place_takes_first_free_suffix() {
    let fx = fixture();
    fx.put_remote("/docs/report.txt", b"quarterly");
    fx.put_remote("/docs/report0.txt", b"old");
    fx.put_remote("/docs/report1.txt", b"older");

    let copy = fx
        .engine
        .copy(SERVER, "/docs/report.txt", "/docs/report.txt", ItemType::File)
        .await
        .unwrap();

    assert_eq!(copy.relative_path, "/docs/report2.txt");
    assert_eq!(
        std::fs::read(fx.remote_disk("/docs/report2.txt")).unwrap(),
        b"quarterly"
    );
    assert!(fx.prompt.asked().is_empty());
    assert_eq!(fx.root().finder().get("/docs/report2.txt").unwrap().size, 9);
}

#[tokio::test]
async fn copy_in_place_ignores_directories_with_colliding_names() {
    let fx = fixture();
    fx.put_remote("/notes", b"n");
    std::fs::create_dir_all(fx.remote_disk("/notes0")).unwrap();

    // `notes0` is a directory, so it does not count as a taken file name and
    // the copy runs into it as an existing destination.
    fx.prompt.answer(Confirmation::Cancel);
    let err = fx
        .engine
        .copy(SERVER, "/notes", "/notes", ItemType::File)
        .await
        .unwrap_err();
    assert!(err.is_silent());
    assert_eq!(fx.prompt.asked(), vec!["/notes0"]);
}

#[tokio::test]
async fn copy_to_another_path_downloads_then_uploads() {
    let fx = fixture();
    fx.put_remote("/src/a.txt", b"payload");

    let copy = fx
        .engine
        .copy(SERVER, "/src/a.txt", "/dst/a.txt", ItemType::File)
        .await
        .unwrap();

    assert_eq!(copy.remote_path, "/dst/a.txt");
    assert_eq!(fx.connector.calls_of("download_file"), vec!["download_file /src/a.txt"]);
    assert_eq!(fx.connector.calls_of("upload_file"), vec!["upload_file /dst/a.txt"]);
    assert_eq!(std::fs::read(fx.remote_disk("/dst/a.txt")).unwrap(), b"payload");
    assert_eq!(std::fs::read(fx.mirror_of("/dst/a.txt")).unwrap(), b"payload");
    assert_eq!(fx.engine.queue().len(), 2);
    assert_eq!(fx.editor.opened.lock().clone(), vec![fx.mirror_of("/dst/a.txt")]);
    assert_eq!(
        fx.engine
            .editors()
            .get(&fx.mirror_of("/dst/a.txt"))
            .unwrap()
            .relative_path,
        "/dst/a.txt"
    );
    assert!(!fx.mirror.path().join(".copies/site/dst/a.txt").exists());
}

#[tokio::test]
async fn copy_onto_a_file_open_in_the_editor_keeps_its_buffer_file() {
    let fx = fixture();
    fx.put_remote("/src/a.txt", b"payload");
    fx.put_remote("/dst/a.txt", b"draft");
    let target = fx.engine.entry(SERVER, "/dst/a.txt").unwrap();
    let local = fx.engine.open(&target).await.unwrap();

    fx.engine
        .copy(SERVER, "/src/a.txt", "/dst/a.txt", ItemType::File)
        .await
        .unwrap();

    assert_eq!(fx.prompt.asked(), vec!["/dst/a.txt"]);
    assert_eq!(std::fs::read(&local).unwrap(), b"payload");
    assert_eq!(std::fs::read(fx.remote_disk("/dst/a.txt")).unwrap(), b"payload");
    assert!(fx.engine.editors().is_bound(&local));
    assert_eq!(fx.editor.opened.lock().len(), 1);
    assert_eq!(fx.editor.focused.lock().clone(), vec![local]);
}

#[tokio::test]
async fn directory_copy_is_not_implemented() {
    let fx = fixture();
    let err = fx
        .engine
        .copy(SERVER, "/a", "/b", ItemType::Dir)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotImplemented(_)));
    assert!(fx.connector.calls().is_empty());
}

#[tokio::test]
async fn move_over_existing_destination_asks_then_replaces() {
    let fx = fixture();
    fx.put_remote("/in/new.txt", b"new");
    fx.put_remote("/out/new.txt", b"stale");
    fx.engine.index(SERVER, false).await.unwrap();

    let moved = fx
        .engine
        .move_path(SERVER, "/in/new.txt", "/out/new.txt")
        .await
        .unwrap();

    assert_eq!(fx.prompt.asked(), vec!["/out/new.txt"]);
    let delete_at = fx
        .connector
        .calls()
        .iter()
        .position(|call| call == "delete_file /out/new.txt")
        .unwrap();
    let rename_at = fx
        .connector
        .calls()
        .iter()
        .position(|call| call == "rename /in/new.txt /out/new.txt")
        .unwrap();
    assert!(delete_at < rename_at);
    assert_eq!(std::fs::read(fx.remote_disk("/out/new.txt")).unwrap(), b"new");
    assert!(fx.root().finder().get("/in/new.txt").is_none());
    assert_eq!(fx.root().finder().get("/out/new.txt").unwrap().size, 3);
    // Not materialized: the size comes from the index, rights stay unknown.
    assert_eq!(moved.size, Some(3));
    assert_eq!(moved.rights, None);
}

#[tokio::test]
async fn declined_move_keeps_source() {
    let fx = fixture();
    fx.put_remote("/in/a.txt", b"a");
    fx.put_remote("/out/a.txt", b"b");
    fx.prompt.answer(Confirmation::Cancel);

    let err = fx
        .engine
        .move_path(SERVER, "/in/a.txt", "/out/a.txt")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UserDeclined));
    assert!(fx.connector.calls_of("rename").is_empty());
    assert!(fx.remote_disk("/in/a.txt").exists());
}

#[tokio::test]
async fn delete_removes_everywhere_and_selects_parent() {
    let fx = fixture();
    fx.put_remote("/d/a.txt", b"a");
    fx.engine.index(SERVER, false).await.unwrap();
    fx.engine.expand(SERVER, "/").await.unwrap();
    fx.engine.expand(SERVER, "/d").await.unwrap();
    let entry = fx.engine.entry(SERVER, "/d/a.txt").unwrap();
    fx.engine.open(&entry).await.unwrap();

    fx.engine.delete(&entry).await.unwrap();

    assert!(!fx.remote_disk("/d/a.txt").exists());
    assert!(fx.root().finder().get("/d/a.txt").is_none());
    assert!(!entry.local_path.exists());
    assert!(fx.root().tree().get("/d/a.txt").is_none());
    assert_eq!(fx.root().tree().selected().as_deref(), Some("/d"));
}

#[tokio::test]
async fn declined_delete_touches_nothing() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"a");
    let entry = fx.engine.entry(SERVER, "/a.txt").unwrap();
    fx.prompt.answer(Confirmation::Cancel);

    let err = fx.engine.delete(&entry).await.unwrap_err();

    assert!(err.is_silent());
    assert!(fx.connector.calls().is_empty());
    assert!(fx.remote_disk("/a.txt").exists());
}

#[tokio::test]
async fn delete_directory_is_recursive() {
    let fx = fixture();
    fx.put_remote("/d/sub/a.txt", b"a");
    fx.engine.index(SERVER, false).await.unwrap();
    let entry = fx.engine.entry(SERVER, "/d").unwrap();
    assert!(entry.is_dir());

    fx.engine.delete(&entry).await.unwrap();

    assert!(!fx.remote_disk("/d").exists());
    assert!(fx.root().finder().is_empty());
}

#[tokio::test]
async fn create_rejects_existing_remote_path() {
    let fx = fixture();
    fx.put_remote("/web/index.php", b"<?php");

    let err = fx
        .engine
        .create(SERVER, "/web", "index.php", ItemType::File)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AlreadyExists(path) if path == "/web/index.php"));
    assert!(fx.connector.calls_of("upload_file").is_empty());
    assert_eq!(std::fs::read(fx.remote_disk("/web/index.php")).unwrap(), b"<?php");
}

#[tokio::test]
async fn create_file_and_directory() {
    let fx = fixture();

    let dir = fx
        .engine
        .create(SERVER, "/", "assets", ItemType::Dir)
        .await
        .unwrap();
    assert!(dir.is_dir());
    assert!(fx.remote_disk("/assets").is_dir());

    let file = fx
        .engine
        .create(SERVER, "/assets", "app.js", ItemType::File)
        .await
        .unwrap();
    assert_eq!(file.relative_path, "/assets/app.js");
    assert!(fx.remote_disk("/assets/app.js").is_file());
    assert!(file.local_path.is_file());
    assert_eq!(
        fx.root().finder().items(),
        vec![
            FinderItem {
                relative_path: "/assets".into(),
                size: 0,
                item_type: ItemType::Dir,
            },
            FinderItem {
                relative_path: "/assets/app.js".into(),
                size: 0,
                item_type: ItemType::File,
            },
        ]
    );
    assert_eq!(fx.root().tree().selected().as_deref(), Some("/assets/app.js"));
}

#[tokio::test]
async fn incremental_index_matches_a_fresh_walk() {
    let fx = fixture();
    fx.put_remote("/keep/a.txt", b"a");
    fx.engine.index(SERVER, false).await.unwrap();

    fx.engine
        .create(SERVER, "/", "doc.txt", ItemType::File)
        .await
        .unwrap();
    let doc = fx.engine.entry(SERVER, "/doc.txt").unwrap();
    fx.engine.rename(&doc, "/notes.txt").await.unwrap();
    fx.engine
        .move_path(SERVER, "/notes.txt", "/keep/notes.txt")
        .await
        .unwrap();
    fx.engine
        .create(SERVER, "/", "tmp", ItemType::Dir)
        .await
        .unwrap();
    let tmp = fx.engine.entry(SERVER, "/tmp").unwrap();
    fx.engine.rename(&tmp, "/scratch").await.unwrap();
    let scratch = fx.engine.entry(SERVER, "/scratch").unwrap();
    fx.engine.delete(&scratch).await.unwrap();

    let incremental = fx.root().finder().items();
    fx.engine.index(SERVER, true).await.unwrap();
    assert_eq!(fx.root().finder().items(), incremental);
}

#[cfg(unix)]
#[tokio::test]
async fn chmod_refreshes_node_rights() {
    let fx = fixture();
    fx.put_remote("/run.sh", b"#!/bin/sh");
    fx.engine.expand(SERVER, "/").await.unwrap();
    let entry = fx.engine.entry(SERVER, "/run.sh").unwrap();

    let rights = fx.engine.chmod(&entry, 0o750).await.unwrap();

    assert_eq!(rights.to_string(), "rwxr-x---");
    assert_eq!(
        fx.root().tree().get("/run.sh").unwrap().rights,
        Some(Rights::from_octal(0o750))
    );
    let listed = fx.engine.expand(SERVER, "/").await.unwrap();
    assert_eq!(listed[0].rights, Some(Rights::from_octal(0o750)));
}
