use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rights::Rights;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("server replied {code}: {message}")]
    Remote { code: u16, message: String },
    #[error("remote path not found: {0}")]
    NotFound(String),
    #[error("remote path already exists: {0}")]
    AlreadyExists(String),
    #[error("{0} is not supported by this connector")]
    Unsupported(&'static str),
}

impl ConnectorError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ConnectorError::NotFound(_) => true,
            ConnectorError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            // FTP "550 Requested action not taken; file unavailable".
            ConnectorError::Remote { code, .. } => *code == 550,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
    Link,
}

impl EntryType {
    /// Maps the type column of a unix-style listing (`-`, `d`, `l`).
    pub fn from_type_char(value: char) -> Option<Self> {
        match value {
            '-' => Some(EntryType::File),
            'd' => Some(EntryType::Dir),
            'l' => Some(EntryType::Link),
            _ => None,
        }
    }
}

/// One row of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub rights: Option<Rights>,
}

impl RemoteEntry {
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Dir
    }

    /// `.` and `..` show up in raw FTP listings and never denote real children.
    pub fn is_dot_entry(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// What a connector needs to move one file's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub direction: Direction,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub size: u64,
}

/// Client side of one FTP/SFTP server.
///
/// Every path is absolute on the remote server. Implementations must not
/// touch the local mirror except through the `local_path` of a transfer.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn exists_file(&self, path: &str) -> Result<bool, ConnectorError>;

    async fn exists_directory(&self, path: &str) -> Result<bool, ConnectorError>;

    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, ConnectorError>;

    async fn rename(&self, from: &str, to: &str) -> Result<(), ConnectorError>;

    async fn delete_file(&self, path: &str) -> Result<(), ConnectorError>;

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<(), ConnectorError>;

    async fn create_directory(&self, path: &str) -> Result<(), ConnectorError>;

    async fn chmod_file(&self, path: &str, permissions: u32) -> Result<(), ConnectorError>;

    async fn chmod_directory(&self, path: &str, permissions: u32) -> Result<(), ConnectorError>;

    async fn upload_file(&self, transfer: &TransferRequest) -> Result<(), ConnectorError>;

    async fn download_file(&self, transfer: &TransferRequest) -> Result<(), ConnectorError>;

    /// Short label used in log lines.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listing_type_column() {
        assert_eq!(EntryType::from_type_char('-'), Some(EntryType::File));
        assert_eq!(EntryType::from_type_char('d'), Some(EntryType::Dir));
        assert_eq!(EntryType::from_type_char('l'), Some(EntryType::Link));
        assert_eq!(EntryType::from_type_char('x'), None);
    }

    #[test]
    fn ftp_550_counts_as_not_found() {
        let err = ConnectorError::Remote {
            code: 550,
            message: "No such file".into(),
        };
        assert!(err.is_not_found());
        let err = ConnectorError::Remote {
            code: 530,
            message: "Not logged in".into(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn deserializes_listing_row() {
        let entry: RemoteEntry = serde_json::from_value(serde_json::json!({
            "name": "index.php",
            "type": "file",
            "size": 42
        }))
        .unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.size, 42);
        assert!(entry.rights.is_none());
    }
}
