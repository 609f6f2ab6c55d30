use std::path::Path;

use remotedit_core::Direction;

use super::support::{SERVER, fixture};
use crate::sync::engine::EngineError;
use crate::sync::finder::ItemType;
use crate::sync::prompt::Confirmation;
use crate::sync::queue::TransferStatus;

#[tokio::test]
async fn download_directory_mirrors_every_file() {
    let fx = fixture();
    fx.put_remote("/remote/dir/a.txt", b"0123456789");
    fx.put_remote("/remote/dir/sub/b.txt", b"01234");
    let dest = fx.mirror.path().join("local/dir");

    let items = fx
        .engine
        .download_directory(SERVER, "/remote/dir", &dest)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    let queued = fx.engine.queue().items();
    assert_eq!(queued.len(), 2);
    assert!(queued.iter().all(|item| item.status == TransferStatus::Done));
    assert_eq!(std::fs::metadata(dest.join("sub/b.txt")).unwrap().len(), 5);
    assert_eq!(std::fs::metadata(dest.join("a.txt")).unwrap().len(), 10);
    assert_eq!(queued[0].size, 10);
}

#[tokio::test]
async fn directory_download_failure_keeps_earlier_files() {
    let fx = fixture();
    fx.put_remote("/d/a.txt", b"a");
    fx.put_remote("/d/b.txt", b"b");
    fx.connector.fail_on_nth("download_file", 1);
    let dest = fx.mirror.path().join("out");

    let err = fx
        .engine
        .download_directory(SERVER, "/d", &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Connector(_)));
    assert!(dest.join("a.txt").exists());
    let statuses: Vec<_> = fx
        .engine
        .queue()
        .items()
        .into_iter()
        .map(|item| item.status)
        .collect();
    assert_eq!(statuses, vec![TransferStatus::Done, TransferStatus::Error]);
}

#[tokio::test]
async fn declined_overwrite_leaves_everything_untouched() {
    let fx = fixture();
    fx.put_remote("/remote/x.txt", b"remote");
    let src = fx.mirror.path().join("tmp/x.txt");
    std::fs::create_dir_all(src.parent().unwrap()).unwrap();
    std::fs::write(&src, b"local").unwrap();
    fx.prompt.answer(Confirmation::Cancel);

    let err = fx
        .engine
        .upload_file(SERVER, &src, "/remote/x.txt", true)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UserDeclined));
    assert!(err.is_silent());
    assert!(fx.connector.calls_of("delete_file").is_empty());
    assert!(fx.connector.calls_of("upload_file").is_empty());
    assert!(fx.engine.queue().is_empty());
    assert_eq!(std::fs::read(fx.remote_disk("/remote/x.txt")).unwrap(), b"remote");
}

#[tokio::test]
async fn confirmed_overwrite_deletes_then_uploads() {
    let fx = fixture();
    fx.put_remote("/remote/x.txt", b"remote");
    let src = fx.mirror.path().join("x.txt");
    std::fs::write(&src, b"fresh copy").unwrap();

    let item = fx
        .engine
        .upload_file(SERVER, &src, "/remote/x.txt", true)
        .await
        .unwrap();

    assert_eq!(item.status, TransferStatus::Done);
    assert_eq!(item.direction, Direction::Upload);
    assert_eq!(
        fx.connector.calls(),
        vec![
            "exists_file /remote/x.txt",
            "delete_file /remote/x.txt",
            "upload_file /remote/x.txt",
        ]
    );
    assert_eq!(fx.prompt.asked(), vec!["/remote/x.txt"]);
    assert_eq!(
        std::fs::read(fx.remote_disk("/remote/x.txt")).unwrap(),
        b"fresh copy"
    );
    assert_eq!(fx.root().finder().get("/remote/x.txt").unwrap().size, 10);
}

#[tokio::test]
async fn download_of_queued_destination_is_rejected_until_finished() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"abc");
    let dest = fx.mirror_of("/a.txt");
    let blocking = fx
        .engine
        .queue()
        .enqueue(SERVER, Direction::Download, "/a.txt", &dest, 3)
        .unwrap();

    let err = fx
        .engine
        .download_file(SERVER, "/a.txt", &dest, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyQueued(path) if path == dest));
    assert!(fx.connector.calls().is_empty());

    fx.engine.queue().mark_done(blocking.id);
    let item = fx
        .engine
        .download_file(SERVER, "/a.txt", &dest, None)
        .await
        .unwrap();
    assert_eq!(item.status, TransferStatus::Done);
    assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
}

#[tokio::test]
async fn upload_of_file_in_flight_touches_neither_remote_nor_marker() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"old");
    fx.engine.expand(SERVER, "/").await.unwrap();
    let local = fx.mirror_of("/a.txt");
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, b"new").unwrap();
    let first = fx
        .engine
        .queue()
        .enqueue(SERVER, Direction::Upload, "/a.txt", &local, 3)
        .unwrap();
    fx.engine.queue().mark_in_progress(first.id);
    fx.root().tree().set_syncing("/a.txt", true);
    fx.connector.clear_calls();

    let err = fx
        .engine
        .upload_file(SERVER, &local, "/a.txt", true)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AlreadyQueued(path) if path == local));
    assert!(fx.prompt.asked().is_empty());
    assert!(fx.connector.calls().is_empty());
    assert_eq!(std::fs::read(fx.remote_disk("/a.txt")).unwrap(), b"old");
    assert!(fx.root().tree().get("/a.txt").unwrap().syncing);
    assert_eq!(
        fx.engine.queue().get(first.id).unwrap().status,
        TransferStatus::InProgress
    );
}

#[tokio::test]
async fn failed_upload_marks_error_and_clears_syncing() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"old");
    fx.engine.expand(SERVER, "/").await.unwrap();
    let local = fx.mirror_of("/a.txt");
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, b"new").unwrap();
    fx.connector.fail_on("upload_file");

    let err = fx
        .engine
        .upload_file(SERVER, &local, "/a.txt", false)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Connector(_)));
    let items = fx.engine.queue().items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, TransferStatus::Error);
    assert!(items[0].error.as_deref().unwrap().contains("injected failure"));
    assert!(!fx.root().tree().get("/a.txt").unwrap().syncing);
    assert_eq!(std::fs::read(fx.remote_disk("/a.txt")).unwrap(), b"old");
}

#[tokio::test]
async fn successful_download_records_size_on_materialized_node() {
    let fx = fixture();
    fx.put_remote("/a.txt", b"12345");
    fx.engine.expand(SERVER, "/").await.unwrap();
    let local = fx.mirror_of("/a.txt");

    fx.engine
        .download_file(SERVER, "/a.txt", &local, None)
        .await
        .unwrap();

    let node = fx.root().tree().get("/a.txt").unwrap();
    assert_eq!(node.size, Some(5));
    assert!(!node.syncing);
}

#[tokio::test]
async fn upload_directory_preserves_layout() {
    let fx = fixture();
    let src = fx.mirror.path().join("site-src");
    std::fs::create_dir_all(src.join("css")).unwrap();
    std::fs::write(src.join("index.html"), b"<html>").unwrap();
    std::fs::write(src.join("css/site.css"), b"body{}").unwrap();

    let items = fx
        .engine
        .upload_directory(SERVER, &src, "/site")
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(
        std::fs::read(fx.remote_disk("/site/css/site.css")).unwrap(),
        b"body{}"
    );
    assert_eq!(
        fx.root().finder().get("/site/css").unwrap().item_type,
        ItemType::Dir
    );
    assert_eq!(fx.root().finder().get("/site/index.html").unwrap().size, 6);
    // `/site` was materialized under the root; its children were not.
    assert!(fx.root().tree().get("/site").is_some());
    assert!(fx.root().tree().get("/site/index.html").is_none());
}

#[tokio::test]
async fn paths_outside_the_base_are_rejected() {
    let fx = super::support::fixture_with_base("/var/www");
    let err = fx
        .engine
        .download_file(SERVER, "/etc/passwd", Path::new("/tmp/passwd"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Path(_)));
    assert!(fx.connector.calls().is_empty());
}
