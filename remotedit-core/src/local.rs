use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::connector::{Connector, ConnectorError, EntryType, RemoteEntry, TransferRequest};
use crate::rights::Rights;

/// Connector whose "server" is a directory on this machine.
///
/// Remote paths map under `root` the same way a chrooted FTP account would.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
    label: String,
}

impl LocalConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = format!("file://{}", root.display());
        Self { root, label }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, remote_path: &str) -> Result<PathBuf, ConnectorError> {
        let mut out = self.root.clone();
        for component in Path::new(remote_path).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::RootDir | Component::CurDir => continue,
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(ConnectorError::NotFound(remote_path.to_string()));
                }
            }
        }
        Ok(out)
    }
}

async fn metadata_of(path: &Path) -> Result<Option<std::fs::Metadata>, ConnectorError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(unix)]
fn rights_of(meta: &std::fs::Metadata) -> Option<Rights> {
    use std::os::unix::fs::PermissionsExt;
    Some(Rights::from_octal(meta.permissions().mode()))
}

#[cfg(not(unix))]
fn rights_of(_meta: &std::fs::Metadata) -> Option<Rights> {
    None
}

#[cfg(unix)]
async fn set_mode(path: &Path, permissions: u32) -> Result<(), ConnectorError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(permissions)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _permissions: u32) -> Result<(), ConnectorError> {
    Err(ConnectorError::Unsupported("chmod"))
}

async fn copy_into(from: &Path, to: &Path) -> Result<(), ConnectorError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to).await?;
    Ok(())
}

#[async_trait]
impl Connector for LocalConnector {
    async fn exists_file(&self, path: &str) -> Result<bool, ConnectorError> {
        Ok(metadata_of(&self.resolve(path)?)
            .await?
            .is_some_and(|meta| meta.is_file()))
    }

    async fn exists_directory(&self, path: &str) -> Result<bool, ConnectorError> {
        Ok(metadata_of(&self.resolve(path)?)
            .await?
            .is_some_and(|meta| meta.is_dir()))
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, ConnectorError> {
        let dir = self.resolve(path)?;
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConnectorError::NotFound(path.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let mut out = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            let meta = entry.metadata().await?;
            let entry_type = if file_type.is_symlink() {
                EntryType::Link
            } else if file_type.is_dir() {
                EntryType::Dir
            } else {
                EntryType::File
            };
            out.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                entry_type,
                size: if entry_type == EntryType::File {
                    meta.len()
                } else {
                    0
                },
                rights: rights_of(&meta),
            });
        }
        Ok(out)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ConnectorError> {
        let source = self.resolve(from)?;
        if metadata_of(&source).await?.is_none() {
            return Err(ConnectorError::NotFound(from.to_string()));
        }
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(source, target).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), ConnectorError> {
        match tokio::fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ConnectorError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<(), ConnectorError> {
        let dir = self.resolve(path)?;
        if dir == self.root {
            return Err(ConnectorError::Unsupported("deleting the server root"));
        }
        let result = if recursive {
            tokio::fs::remove_dir_all(&dir).await
        } else {
            tokio::fs::remove_dir(&dir).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ConnectorError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_directory(&self, path: &str) -> Result<(), ConnectorError> {
        tokio::fs::create_dir_all(self.resolve(path)?).await?;
        Ok(())
    }

    async fn chmod_file(&self, path: &str, permissions: u32) -> Result<(), ConnectorError> {
        set_mode(&self.resolve(path)?, permissions).await
    }

    async fn chmod_directory(&self, path: &str, permissions: u32) -> Result<(), ConnectorError> {
        set_mode(&self.resolve(path)?, permissions).await
    }

    async fn upload_file(&self, transfer: &TransferRequest) -> Result<(), ConnectorError> {
        let target = self.resolve(&transfer.remote_path)?;
        copy_into(&transfer.local_path, &target).await
    }

    async fn download_file(&self, transfer: &TransferRequest) -> Result<(), ConnectorError> {
        let source = self.resolve(&transfer.remote_path)?;
        if metadata_of(&source).await?.is_none_or(|meta| !meta.is_file()) {
            return Err(ConnectorError::NotFound(transfer.remote_path.clone()));
        }
        copy_into(&source, &transfer.local_path).await
    }

    fn name(&self) -> &str {
        &self.label
    }
}
