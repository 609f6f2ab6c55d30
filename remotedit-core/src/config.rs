use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_FTP_PORT: u16 = 21;
const DEFAULT_SFTP_PORT: u16 = 22;
const DEFAULT_REMOTE: &str = "/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid profile document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate server profile name: {0}")]
    DuplicateName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logon {
    Credentials,
    KeyFile,
    Agent,
}

/// Connection settings of one server profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default)]
    pub sftp: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key_file: String,
    #[serde(default)]
    pub use_agent: bool,
    /// Base directory on the server; everything the engine touches lives under it.
    pub remote: String,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_FTP_PORT,
            user: String::new(),
            password: String::new(),
            sftp: false,
            private_key_file: String::new(),
            use_agent: false,
            remote: remote.into(),
        }
    }

    pub fn logon(&self) -> Logon {
        if self.use_agent {
            Logon::Agent
        } else if !self.private_key_file.is_empty() {
            Logon::KeyFile
        } else {
            Logon::Credentials
        }
    }

    /// Directory path when the host is a `file://` URL, used by [`crate::LocalConnector`].
    pub fn file_root(&self) -> Option<&str> {
        self.host.strip_prefix("file://")
    }
}

/// Raw profile as written by users; every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServer {
    name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    sftp: Option<bool>,
    #[serde(alias = "privatekeyfile")]
    private_key_file: Option<String>,
    use_agent: Option<bool>,
    remote: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    servers: Vec<RawServer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProfiles {
    servers: Vec<ServerConfig>,
}

impl ServerProfiles {
    /// Parses `{ "servers": [...] }`, fills defaults and sorts the profiles.
    pub fn from_json(text: &str, sort_by_name: bool) -> Result<Self, ConfigError> {
        let raw: RawDocument = serde_json::from_str(text)?;
        let mut servers = Vec::with_capacity(raw.servers.len());
        for (idx, item) in raw.servers.into_iter().enumerate() {
            let sftp = item.sftp.unwrap_or(false);
            servers.push(ServerConfig {
                name: non_empty(item.name).unwrap_or_else(|| format!("Server {}", idx + 1)),
                host: non_empty(item.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: item.port.filter(|port| *port != 0).unwrap_or(if sftp {
                    DEFAULT_SFTP_PORT
                } else {
                    DEFAULT_FTP_PORT
                }),
                user: item.user.unwrap_or_default(),
                password: item.password.unwrap_or_default(),
                sftp,
                private_key_file: item.private_key_file.unwrap_or_default(),
                use_agent: item.use_agent.unwrap_or(false),
                remote: non_empty(item.remote).unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            });
        }

        servers.sort_by(|a, b| {
            if sort_by_name {
                a.name.to_lowercase().cmp(&b.name.to_lowercase())
            } else {
                a.host.to_lowercase().cmp(&b.host.to_lowercase())
            }
        });

        for (idx, server) in servers.iter().enumerate() {
            if servers[..idx].iter().any(|other| other.name == server.name) {
                return Err(ConfigError::DuplicateName(server.name.clone()));
            }
        }

        Ok(Self { servers })
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_defaults_for_missing_fields() {
        let profiles = ServerProfiles::from_json(
            r#"{ "servers": [ { "host": "example.org", "sftp": true }, {} ] }"#,
            true,
        )
        .unwrap();
        let first = profiles.get("Server 1").unwrap();
        assert_eq!(first.host, "example.org");
        assert_eq!(first.port, 22);
        assert_eq!(first.remote, "/");
        assert_eq!(first.logon(), Logon::Credentials);

        let second = profiles.get("Server 2").unwrap();
        assert_eq!(second.host, "localhost");
        assert_eq!(second.port, 21);
    }

    #[test]
    fn derives_logon_method() {
        let profiles = ServerProfiles::from_json(
            r#"{ "servers": [
                { "name": "a", "privatekeyfile": "~/.ssh/id_ed25519" },
                { "name": "b", "useAgent": true, "privateKeyFile": "key" }
            ] }"#,
            true,
        )
        .unwrap();
        assert_eq!(profiles.get("a").unwrap().logon(), Logon::KeyFile);
        assert_eq!(profiles.get("b").unwrap().logon(), Logon::Agent);
    }

    #[test]
    fn sorts_by_name_or_host() {
        let doc = r#"{ "servers": [
            { "name": "beta", "host": "a.example" },
            { "name": "Alpha", "host": "z.example" }
        ] }"#;
        let by_name = ServerProfiles::from_json(doc, true).unwrap();
        assert_eq!(by_name.servers()[0].name, "Alpha");
        let by_host = ServerProfiles::from_json(doc, false).unwrap();
        assert_eq!(by_host.servers()[0].name, "beta");
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = ServerProfiles::from_json(
            r#"{ "servers": [ { "name": "x" }, { "name": "x" } ] }"#,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(name) if name == "x"));
    }

    #[test]
    fn file_hosts_expose_their_root() {
        let config = ServerConfig::new("local", "file:///srv/www", "/");
        assert_eq!(config.file_root(), Some("/srv/www"));
        assert_eq!(ServerConfig::new("ftp", "example.org", "/").file_root(), None);
    }
}
