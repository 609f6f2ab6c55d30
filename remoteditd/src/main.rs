use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use remotedit_core::{Connector, LocalConnector, ServerConfig};
use remoteditd::config::EngineConfig;
use remoteditd::logging;
use remoteditd::sync::editor::LoggingEditorHost;
use remoteditd::sync::engine::{EngineError, SyncEngine};
use remoteditd::sync::finder::ItemType;
use remoteditd::sync::local_watcher::{LocalEvent, start_notify_watcher};
use remoteditd::sync::prompt::{AutoConfirm, ConfirmPrompt, Confirmation, TerminalPrompt};
use remoteditd::sync::server::{Entry, ServerRoot};
use tracing::{info, warn};

const SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List { server: String, dir: Option<String> },
    Find { server: String, query: Option<String>, reindex: bool },
    Get { server: String, remote: String, local: Option<PathBuf> },
    Put { server: String, local: PathBuf, remote: String },
    Mkdir { server: String, remote: String },
    Rm { server: String, remote: String },
    Mv { server: String, from: String, to: String },
    Cp { server: String, from: String, to: String },
    Chmod { server: String, remote: String, mode: u32 },
    Watch { server: String },
}

impl Command {
    fn server(&self) -> &str {
        match self {
            Command::List { server, .. }
            | Command::Find { server, .. }
            | Command::Get { server, .. }
            | Command::Put { server, .. }
            | Command::Mkdir { server, .. }
            | Command::Rm { server, .. }
            | Command::Mv { server, .. }
            | Command::Cp { server, .. }
            | Command::Chmod { server, .. }
            | Command::Watch { server } => server,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run { command: Command, assume_yes: bool },
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut assume_yes = false;
    let mut reindex = false;
    let mut positional = Vec::new();
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliMode::Help),
            "--yes" | "-y" => assume_yes = true,
            "--reindex" => reindex = true,
            other if other.starts_with('-') && other.len() > 1 => {
                anyhow::bail!("unknown argument: {other}")
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(name) = positional.next() else {
        return Ok(CliMode::Help);
    };
    let rest: Vec<String> = positional.collect();
    let command = match (name.as_str(), rest.as_slice()) {
        ("list", [server]) => Command::List {
            server: server.clone(),
            dir: None,
        },
        ("list", [server, dir]) => Command::List {
            server: server.clone(),
            dir: Some(dir.clone()),
        },
        ("find", [server]) => Command::Find {
            server: server.clone(),
            query: None,
            reindex,
        },
        ("find", [server, query]) => Command::Find {
            server: server.clone(),
            query: Some(query.clone()),
            reindex,
        },
        ("get", [server, remote]) => Command::Get {
            server: server.clone(),
            remote: remote.clone(),
            local: None,
        },
        ("get", [server, remote, local]) => Command::Get {
            server: server.clone(),
            remote: remote.clone(),
            local: Some(PathBuf::from(local)),
        },
        ("put", [server, local, remote]) => Command::Put {
            server: server.clone(),
            local: PathBuf::from(local),
            remote: remote.clone(),
        },
        ("mkdir", [server, remote]) => Command::Mkdir {
            server: server.clone(),
            remote: remote.clone(),
        },
        ("rm", [server, remote]) => Command::Rm {
            server: server.clone(),
            remote: remote.clone(),
        },
        ("mv", [server, from, to]) => Command::Mv {
            server: server.clone(),
            from: from.clone(),
            to: to.clone(),
        },
        ("cp", [server, from, to]) => Command::Cp {
            server: server.clone(),
            from: from.clone(),
            to: to.clone(),
        },
        ("chmod", [server, remote, mode]) => Command::Chmod {
            server: server.clone(),
            remote: remote.clone(),
            mode: parse_mode(mode)?,
        },
        ("watch", [server]) => Command::Watch {
            server: server.clone(),
        },
        (other, _) => anyhow::bail!("unknown command or wrong arguments: {other}"),
    };
    Ok(CliMode::Run {
        command,
        assume_yes,
    })
}

fn parse_mode(raw: &str) -> anyhow::Result<u32> {
    let digits = raw.strip_prefix("0o").unwrap_or(raw);
    let mode = u32::from_str_radix(digits, 8)
        .with_context(|| format!("invalid octal permissions: {raw}"))?;
    anyhow::ensure!(mode <= 0o777, "permissions out of range: {raw}");
    Ok(mode)
}

fn print_help() {
    println!("Usage: remoteditd [--yes] <command> <server> [args]");
    println!("  list <server> [dir]             List a remote directory");
    println!("  find <server> [query]           Index files and search them (--reindex to rebuild)");
    println!("  get <server> <remote> [local]   Download a file or directory");
    println!("  put <server> <local> <remote>   Upload a file or directory");
    println!("  mkdir <server> <remote>         Create a remote directory");
    println!("  rm <server> <remote>            Delete a remote file or directory");
    println!("  mv <server> <from> <to>         Move or rename on the server");
    println!("  cp <server> <from> <to>         Copy a remote file");
    println!("  chmod <server> <remote> <mode>  Change permissions (octal)");
    println!("  watch <server>                  Upload mirror files whenever they are saved");
    println!("  --yes                           Answer yes to every confirmation");
}

fn connector_for(config: &ServerConfig) -> anyhow::Result<Arc<dyn Connector>> {
    match config.file_root() {
        Some(root) => Ok(Arc::new(LocalConnector::new(root))),
        None => anyhow::bail!(
            "server {} uses {}; only file:// hosts have a built-in connector",
            config.name,
            if config.sftp { "SFTP" } else { "FTP" }
        ),
    }
}

/// Entry for a remote path with its kind checked against the server.
async fn resolve(engine: &SyncEngine, root: &ServerRoot, remote: &str) -> anyhow::Result<Entry> {
    let mut entry = engine.entry_at(root.name(), remote)?;
    if root.connector().exists_directory(&entry.remote_path).await? {
        entry.kind = ItemType::Dir;
    }
    Ok(entry)
}

async fn run(engine: &SyncEngine, root: &ServerRoot, command: Command) -> anyhow::Result<()> {
    let server = root.name();
    match command {
        Command::List { dir, .. } => {
            let relative = match dir {
                Some(dir) => root.relative_of(&dir)?,
                None => "/".to_string(),
            };
            for node in engine.expand(server, &relative).await? {
                let kind = if node.is_dir() { 'd' } else { '-' };
                let rights = node.rights.map(|r| r.to_string()).unwrap_or_default();
                let size = node.size.map(|s| s.to_string()).unwrap_or_default();
                println!("{kind} {rights:>9} {size:>10} {}", node.name);
            }
        }
        Command::Find { query, reindex, .. } => {
            let outcome = engine.index(server, reindex).await?;
            info!(server, ?outcome, "index ready");
            match query {
                Some(query) => {
                    for item in engine.search(server, &query, SEARCH_LIMIT)? {
                        println!("{}", item.relative_path);
                    }
                }
                None => println!("{} files indexed", root.finder().len()),
            }
        }
        Command::Get { remote, local, .. } => {
            let entry = resolve(engine, root, &remote).await?;
            let dest = local.unwrap_or_else(|| entry.local_path.clone());
            if entry.is_dir() {
                let items = engine
                    .download_directory(server, &entry.remote_path, &dest)
                    .await?;
                println!("{} files -> {}", items.len(), dest.display());
            } else {
                engine
                    .download_file(server, &entry.remote_path, &dest, entry.size)
                    .await?;
                println!("{}", dest.display());
            }
        }
        Command::Put { local, remote, .. } => {
            let meta = tokio::fs::metadata(&local)
                .await
                .with_context(|| format!("cannot read {}", local.display()))?;
            if meta.is_dir() {
                let items = engine.upload_directory(server, &local, &remote).await?;
                println!("{} files uploaded", items.len());
            } else {
                let item = engine.upload_file(server, &local, &remote, true).await?;
                println!("{} ({} bytes)", item.remote_path, item.size);
            }
        }
        Command::Mkdir { remote, .. } => {
            let relative = root.relative_of(&remote)?;
            let entry = engine.create(server, "/", &relative, ItemType::Dir).await?;
            println!("{}", entry.remote_path);
        }
        Command::Rm { remote, .. } => {
            let entry = resolve(engine, root, &remote).await?;
            engine.delete(&entry).await?;
        }
        Command::Mv { from, to, .. } => {
            let entry = engine.move_path(server, &from, &to).await?;
            println!("{}", entry.remote_path);
        }
        Command::Cp { from, to, .. } => {
            let source = resolve(engine, root, &from).await?;
            let entry = engine.copy(server, &from, &to, source.kind).await?;
            println!("{}", entry.remote_path);
        }
        Command::Chmod { remote, mode, .. } => {
            let entry = resolve(engine, root, &remote).await?;
            let rights = engine.chmod(&entry, mode).await?;
            println!("{rights} {}", entry.remote_path);
        }
        Command::Watch { .. } => watch(engine, root).await?,
    }
    Ok(())
}

/// Treats every file saved under the server's mirror as an editor save until
/// interrupted.
async fn watch(engine: &SyncEngine, root: &ServerRoot) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(root.local_root()).await?;
    let (_watcher, mut events) = start_notify_watcher(root.local_root())
        .with_context(|| format!("cannot watch {}", root.local_root().display()))?;
    info!(server = root.name(), mirror = %root.local_root().display(), "watching mirror");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(LocalEvent::Saved { local_path }) = event else {
                    break;
                };
                if !tokio::fs::metadata(&local_path).await.is_ok_and(|meta| meta.is_file()) {
                    continue;
                }
                if !engine.editors().is_bound(&local_path) {
                    let relative = root.relative_of_local(&local_path)?;
                    engine.editors().bind(&local_path, root.name(), &relative);
                }
                match engine.on_editor_saved(&local_path).await {
                    Ok(Some(item)) => println!("uploaded {}", item.remote_path),
                    Ok(None) => {}
                    Err(err) if err.is_silent() => {}
                    Err(err) => warn!(path = %local_path.display(), error = %err, "save upload failed"),
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let (command, assume_yes) = match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            print_help();
            return Ok(());
        }
        CliMode::Run {
            command,
            assume_yes,
        } => (command, assume_yes),
    };

    let config = EngineConfig::from_env()?;
    logging::init(config.log_filter.as_deref());
    let profiles = config.load_profiles().await?;
    let server = profiles
        .get(command.server())
        .cloned()
        .with_context(|| format!("no server profile named {}", command.server()))?;
    let connector = connector_for(&server)?;

    let prompt: Arc<dyn ConfirmPrompt> = if assume_yes {
        Arc::new(AutoConfirm(Confirmation::Yes))
    } else {
        Arc::new(TerminalPrompt)
    };
    let engine = SyncEngine::new(config.mirror_dir.clone(), prompt, Arc::new(LoggingEditorHost));
    let root = engine.add_server(server, connector)?;

    match run(&engine, &root, command).await {
        Err(err)
            if err
                .downcast_ref::<EngineError>()
                .is_some_and(EngineError::is_silent) =>
        {
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("remoteditd")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parse_cli_mode_defaults_to_help() {
        assert_eq!(parse_cli_mode(args(&[])).unwrap(), CliMode::Help);
        assert_eq!(parse_cli_mode(args(&["list", "--help"])).unwrap(), CliMode::Help);
    }

    #[test]
    fn parse_cli_mode_reads_commands_and_flags() {
        let mode = parse_cli_mode(args(&["--yes", "mv", "site", "/a.txt", "/b.txt"])).unwrap();
        assert_eq!(
            mode,
            CliMode::Run {
                command: Command::Mv {
                    server: "site".into(),
                    from: "/a.txt".into(),
                    to: "/b.txt".into(),
                },
                assume_yes: true,
            }
        );

        let mode = parse_cli_mode(args(&["find", "site", "idx", "--reindex"])).unwrap();
        assert_eq!(
            mode,
            CliMode::Run {
                command: Command::Find {
                    server: "site".into(),
                    query: Some("idx".into()),
                    reindex: true,
                },
                assume_yes: false,
            }
        );
    }

    #[test]
    fn parse_cli_mode_parses_octal_modes() {
        let mode = parse_cli_mode(args(&["chmod", "site", "/x", "0o750"])).unwrap();
        assert!(matches!(
            mode,
            CliMode::Run {
                command: Command::Chmod { mode: 0o750, .. },
                ..
            }
        ));
        assert!(parse_cli_mode(args(&["chmod", "site", "/x", "rwx"])).is_err());
        assert!(parse_cli_mode(args(&["chmod", "site", "/x", "1777"])).is_err());
    }

    #[test]
    fn parse_cli_mode_rejects_unknown_input() {
        assert!(parse_cli_mode(args(&["--logout"])).is_err());
        assert!(parse_cli_mode(args(&["get"])).is_err());
        assert!(parse_cli_mode(args(&["frobnicate", "site"])).is_err());
    }

    #[test]
    fn only_file_hosts_have_a_connector() {
        let local = ServerConfig::new("disk", "file:///srv/www", "/");
        assert!(connector_for(&local).is_ok());
        let ftp = ServerConfig::new("ftp", "ftp.example.org", "/");
        assert!(connector_for(&ftp).is_err());
    }
}
