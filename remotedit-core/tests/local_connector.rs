use std::path::PathBuf;

use remotedit_core::{Connector, ConnectorError, Direction, EntryType, LocalConnector, TransferRequest};
use tempfile::tempdir;

fn upload(remote_path: &str, local_path: PathBuf) -> TransferRequest {
    TransferRequest {
        direction: Direction::Upload,
        remote_path: remote_path.into(),
        local_path,
        size: 0,
    }
}

#[tokio::test]
async fn exists_distinguishes_files_and_directories() {
    let remote = tempdir().unwrap();
    std::fs::create_dir_all(remote.path().join("www/css")).unwrap();
    std::fs::write(remote.path().join("www/index.html"), b"<html>").unwrap();

    let connector = LocalConnector::new(remote.path());

    assert!(connector.exists_file("/www/index.html").await.unwrap());
    assert!(!connector.exists_directory("/www/index.html").await.unwrap());
    assert!(connector.exists_directory("/www/css").await.unwrap());
    assert!(!connector.exists_file("/www/missing.html").await.unwrap());
}

#[tokio::test]
async fn list_directory_reports_types_and_sizes() {
    let remote = tempdir().unwrap();
    std::fs::create_dir_all(remote.path().join("www/css")).unwrap();
    std::fs::write(remote.path().join("www/index.html"), b"<html>").unwrap();

    let connector = LocalConnector::new(remote.path());
    let mut list = connector.list_directory("/www").await.unwrap();
    list.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "css");
    assert_eq!(list[0].entry_type, EntryType::Dir);
    assert_eq!(list[1].name, "index.html");
    assert_eq!(list[1].entry_type, EntryType::File);
    assert_eq!(list[1].size, 6);
}

#[tokio::test]
async fn list_missing_directory_is_not_found() {
    let remote = tempdir().unwrap();
    let connector = LocalConnector::new(remote.path());

    let err = connector.list_directory("/nope").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn upload_then_download_moves_bytes_both_ways() {
    let remote = tempdir().unwrap();
    let local = tempdir().unwrap();
    let source = local.path().join("a.txt");
    std::fs::write(&source, b"payload").unwrap();

    let connector = LocalConnector::new(remote.path());
    connector
        .upload_file(&upload("/deep/dir/a.txt", source))
        .await
        .unwrap();
    assert_eq!(
        std::fs::read(remote.path().join("deep/dir/a.txt")).unwrap(),
        b"payload"
    );

    let target = local.path().join("mirror/a.txt");
    connector
        .download_file(&TransferRequest {
            direction: Direction::Download,
            remote_path: "/deep/dir/a.txt".into(),
            local_path: target.clone(),
            size: 7,
        })
        .await
        .unwrap();
    assert_eq!(std::fs::read(target).unwrap(), b"payload");
}

#[tokio::test]
async fn download_of_missing_file_fails() {
    let remote = tempdir().unwrap();
    let local = tempdir().unwrap();
    let connector = LocalConnector::new(remote.path());

    let err = connector
        .download_file(&TransferRequest {
            direction: Direction::Download,
            remote_path: "/ghost.txt".into(),
            local_path: local.path().join("ghost.txt"),
            size: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::NotFound(path) if path == "/ghost.txt"));
}

#[tokio::test]
async fn rename_and_delete() {
    let remote = tempdir().unwrap();
    std::fs::create_dir_all(remote.path().join("a/b")).unwrap();
    std::fs::write(remote.path().join("a/b/c.txt"), b"x").unwrap();

    let connector = LocalConnector::new(remote.path());
    connector.rename("/a/b", "/a/z").await.unwrap();
    assert!(connector.exists_file("/a/z/c.txt").await.unwrap());

    assert!(connector.delete_directory("/a/z", false).await.is_err());
    connector.delete_directory("/a/z", true).await.unwrap();
    assert!(!connector.exists_directory("/a/z").await.unwrap());

    let err = connector.delete_file("/a/z/c.txt").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn parent_components_never_escape_the_root() {
    let remote = tempdir().unwrap();
    let connector = LocalConnector::new(remote.path().join("jail"));

    let err = connector.exists_file("/../secret").await.unwrap_err();
    assert!(err.is_not_found());
}

#[cfg(unix)]
#[tokio::test]
async fn chmod_changes_reported_rights() {
    let remote = tempdir().unwrap();
    std::fs::write(remote.path().join("run.sh"), b"#!/bin/sh").unwrap();

    let connector = LocalConnector::new(remote.path());
    connector.chmod_file("/run.sh", 0o750).await.unwrap();

    let list = connector.list_directory("/").await.unwrap();
    let rights = list[0].rights.unwrap();
    assert_eq!(rights.to_string(), "rwxr-x---");
}
