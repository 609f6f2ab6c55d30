use std::path::{Path, PathBuf};

use anyhow::Context;
use remotedit_core::ServerProfiles;

const APP_DIR_NAME: &str = "remotedit";
const PROFILES_FILE_NAME: &str = "servers.json";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Every server's mirror lives in a subdirectory named after its host.
    pub mirror_dir: PathBuf,
    pub profiles_path: PathBuf,
    pub log_filter: Option<String>,
    pub sort_by_name: bool,
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let mirror_dir = std::env::var("REMOTEDIT_MIRROR_DIR")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(default_mirror_dir);
        let profiles_path = std::env::var("REMOTEDIT_PROFILES")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(default_profiles_path);
        let log_filter = std::env::var("REMOTEDIT_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let sort_by_name = read_bool_env("REMOTEDIT_SORT_BY_NAME", true);

        Ok(Self {
            mirror_dir,
            profiles_path,
            log_filter,
            sort_by_name,
        })
    }

    /// Reads the profile document; a missing file means no servers yet.
    pub async fn load_profiles(&self) -> anyhow::Result<ServerProfiles> {
        let text = match tokio::fs::read_to_string(&self.profiles_path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ServerProfiles::default());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read profiles at {}", self.profiles_path.display())
                });
            }
        };
        ServerProfiles::from_json(&text, self.sort_by_name).with_context(|| {
            format!("failed to parse profiles at {}", self.profiles_path.display())
        })
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_mirror_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

fn default_profiles_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join(PROFILES_FILE_NAME)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn expands_tilde_to_home() {
        let home = PathBuf::from("/tmp/home-user");
        assert_eq!(expand_with_home("~", &home), home);
        assert_eq!(
            expand_with_home("~/mirror", &home),
            PathBuf::from("/tmp/home-user/mirror")
        );
        assert_eq!(
            expand_with_home("/srv/mirror", &home),
            PathBuf::from("/srv/mirror")
        );
    }

    #[test]
    fn sorting_is_enabled_by_default() {
        assert!(read_bool_env("NO_SUCH_BOOL_ENV_FOR_TEST", true));
    }

    #[test]
    fn defaults_live_under_app_dir() {
        assert!(default_mirror_dir().ends_with(APP_DIR_NAME));
        assert!(default_profiles_path().ends_with("remotedit/servers.json"));
    }

    #[tokio::test]
    async fn missing_profiles_file_means_no_servers() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            mirror_dir: dir.path().join("mirror"),
            profiles_path: dir.path().join("servers.json"),
            log_filter: None,
            sort_by_name: true,
        };
        assert!(config.load_profiles().await.unwrap().servers().is_empty());

        std::fs::write(
            &config.profiles_path,
            r#"{ "servers": [ { "host": "file:///srv/www" } ] }"#,
        )
        .unwrap();
        let profiles = config.load_profiles().await.unwrap();
        assert_eq!(profiles.servers()[0].name, "Server 1");
    }
}
