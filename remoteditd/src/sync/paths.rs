use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("remote path is empty")]
    Empty,
    #[error("remote path contains unsupported component")]
    UnsupportedComponent,
    #[error("{path} is not under the server base {base}")]
    OutsideBase { path: String, base: String },
    #[error("local path {0} is not under a server mirror root")]
    OutsideMirror(PathBuf),
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
}

/// Collapses separator runs and `.` segments; keeps a leading and a trailing
/// slash when the input had them.
pub fn normalize(path: &str) -> String {
    let leading = path.starts_with(['/', '\\']);
    let trailing = path.len() > 1 && path.ends_with(['/', '\\']);
    let joined = segments(path).collect::<Vec<_>>().join("/");
    match (leading, joined.is_empty(), trailing) {
        (true, true, _) => "/".to_string(),
        (false, true, _) => String::new(),
        (true, false, true) => format!("/{joined}/"),
        (true, false, false) => format!("/{joined}"),
        (false, false, true) => format!("{joined}/"),
        (false, false, false) => joined,
    }
}

pub fn trailing_slash(path: &str) -> String {
    let path = normalize(path);
    if path.ends_with('/') {
        path
    } else {
        format!("{path}/")
    }
}

pub fn untrailing_slash(path: &str) -> String {
    let path = normalize(path);
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path
    }
}

pub fn leading_slash(path: &str) -> String {
    let path = normalize(path);
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

pub fn unleading_slash(path: &str) -> String {
    normalize(path).trim_start_matches('/').to_string()
}

/// Canonical key form used by both caches: `/a/b`, or `/` for the base itself.
pub fn canonical(path: &str) -> String {
    untrailing_slash(&leading_slash(path))
}

/// Canonical form of a path relative to a server base. `..` segments are
/// refused so the result cannot leave the base.
pub fn checked_relative(path: &str) -> Result<String, PathError> {
    if segments(path).any(|part| part == "..") {
        return Err(PathError::UnsupportedComponent);
    }
    Ok(canonical(path))
}

pub fn basename(path: &str) -> &str {
    segments(path).last().unwrap_or("")
}

pub fn dirname(path: &str) -> String {
    let canonical = canonical(path);
    match canonical.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

pub fn join(base: &str, relative: &str) -> String {
    normalize(&format!("{base}/{relative}"))
}

/// Extension used when suffixing a name: the last `.ext`, keeping `.tar.*`
/// together. Dotfiles have none.
pub fn extension(name: &str) -> &str {
    let name = basename(name);
    let Some(idx) = name.rfind('.') else {
        return "";
    };
    if idx == 0 {
        return "";
    }
    let stem = &name[..idx];
    if let Some(tar) = stem.rfind(".tar")
        && tar > 0
        && tar + 4 == stem.len()
    {
        return &name[tar..];
    }
    &name[idx..]
}

/// `report.txt` + 2 → `report2.txt`.
pub fn suffixed_name(name: &str, counter: u32) -> String {
    let ext = extension(name);
    let name = basename(name);
    let stem = &name[..name.len() - ext.len()];
    format!("{stem}{counter}{ext}")
}

/// True when `path` equals `ancestor` or lies below it, compared by segment.
pub fn is_within(ancestor: &str, path: &str) -> bool {
    let mut ancestor_parts = segments(ancestor);
    let mut path_parts = segments(path);
    loop {
        match (ancestor_parts.next(), path_parts.next()) {
            (None, _) => return true,
            (Some(_), None) => return false,
            (Some(a), Some(p)) if a == p => continue,
            _ => return false,
        }
    }
}

/// Replaces the `from` prefix of `path` with `to`; `None` when `path` is not
/// within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_within(from, path) {
        return None;
    }
    let skip = segments(from).count();
    let rest: Vec<_> = segments(path).skip(skip).collect();
    if rest.is_empty() {
        return Some(canonical(to));
    }
    Some(canonical(&format!("{}/{}", canonical(to), rest.join("/"))))
}

/// Path of `absolute` relative to the server's remote `base`, in canonical form.
pub fn relative_to_base(base: &str, absolute: &str) -> Result<String, PathError> {
    if absolute.trim().is_empty() {
        return Err(PathError::Empty);
    }
    if segments(absolute).any(|part| part == "..") {
        return Err(PathError::UnsupportedComponent);
    }
    if !is_within(base, absolute) {
        return Err(PathError::OutsideBase {
            path: absolute.to_string(),
            base: base.to_string(),
        });
    }
    let rest: Vec<_> = segments(absolute).skip(segments(base).count()).collect();
    Ok(format!("/{}", rest.join("/")))
}

pub fn remote_for(base: &str, relative: &str) -> String {
    canonical(&join(base, relative))
}

/// Maps a canonical relative path under a server's local mirror root.
pub fn local_path_for(mirror_root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    if relative.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = mirror_root.to_path_buf();
    for component in Path::new(&relative.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir => continue,
            Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    Ok(out)
}

/// Inverse of [`local_path_for`].
pub fn relative_from_local(mirror_root: &Path, local: &Path) -> Result<String, PathError> {
    let relative = local
        .strip_prefix(mirror_root)
        .map_err(|_| PathError::OutsideMirror(local.to_path_buf()))?;
    let joined = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    Ok(format!("/{joined}"))
}

/// Directory name for a server's mirror, safe on every filesystem.
pub fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize("//a///b/./c/"), "/a/b/c/");
        assert_eq!(normalize("a\\b"), "a/b");
        assert_eq!(normalize("///"), "/");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn slash_helpers() {
        assert_eq!(trailing_slash("/a/b"), "/a/b/");
        assert_eq!(untrailing_slash("/a/b/"), "/a/b");
        assert_eq!(untrailing_slash("/"), "/");
        assert_eq!(leading_slash("a/b"), "/a/b");
        assert_eq!(unleading_slash("/a/b"), "a/b");
        assert_eq!(canonical("a/b/"), "/a/b");
    }

    #[test]
    fn checked_relative_refuses_parent_segments() {
        assert_eq!(checked_relative("a//b/").unwrap(), "/a/b");
        assert!(matches!(
            checked_relative("../escaped.txt"),
            Err(PathError::UnsupportedComponent)
        ));
        assert!(checked_relative("/a/../../b").is_err());
    }

    #[test]
    fn basename_and_dirname() {
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(basename("/a/b/"), "b");
        assert_eq!(dirname("/a/b/c.txt"), "/a/b");
        assert_eq!(dirname("/a"), "/");
        assert_eq!(dirname("/"), "/");
    }

    #[test]
    fn extension_rules() {
        assert_eq!(extension("report.txt"), ".txt");
        assert_eq!(extension("/x/backup.tar.gz"), ".tar.gz");
        assert_eq!(extension(".env"), "");
        assert_eq!(extension("Makefile"), "");
        assert_eq!(extension("my.report.txt"), ".txt");
    }

    #[test]
    fn suffix_goes_before_extension() {
        assert_eq!(suffixed_name("report.txt", 2), "report2.txt");
        assert_eq!(suffixed_name("/d/site.tar.gz", 0), "site0.tar.gz");
        assert_eq!(suffixed_name("README", 1), "README1");
    }

    #[test]
    fn relative_to_base_is_segment_wise() {
        assert_eq!(relative_to_base("/var/www", "/var/www/a/b.php").unwrap(), "/a/b.php");
        assert_eq!(relative_to_base("/var/www/", "/var/www").unwrap(), "/");
        assert_eq!(relative_to_base("/", "/etc/hosts").unwrap(), "/etc/hosts");
        // Substring of a segment must not count as the base.
        assert!(matches!(
            relative_to_base("/var/www", "/var/www2/index.php"),
            Err(PathError::OutsideBase { .. })
        ));
        // Base text appearing again deeper in the path stays intact.
        assert_eq!(
            relative_to_base("/www", "/www/backup/www/index.php").unwrap(),
            "/backup/www/index.php"
        );
        assert!(matches!(
            relative_to_base("/", "/a/../b"),
            Err(PathError::UnsupportedComponent)
        ));
    }

    #[test]
    fn rebase_rewrites_prefix_only() {
        assert_eq!(rebase("/a/b/c/d.txt", "/a/b", "/a/c").as_deref(), Some("/a/c/c/d.txt"));
        assert_eq!(rebase("/a/b", "/a/b/", "/x").as_deref(), Some("/x"));
        assert_eq!(rebase("/a/bb/c", "/a/b", "/x"), None);
    }

    #[test]
    fn maps_relative_path_under_mirror_root() {
        let root = PathBuf::from("/cache/example.org");
        let mapped = local_path_for(&root, "/Docs/A.txt").unwrap();
        assert_eq!(mapped, PathBuf::from("/cache/example.org/Docs/A.txt"));
        assert_eq!(relative_from_local(&root, &mapped).unwrap(), "/Docs/A.txt");
        assert_eq!(local_path_for(&root, "/").unwrap(), root);
    }

    #[test]
    fn rejects_parent_dir() {
        let root = PathBuf::from("/cache");
        assert!(matches!(
            local_path_for(&root, "../secret"),
            Err(PathError::UnsupportedComponent)
        ));
    }

    #[test]
    fn sanitizes_host_names() {
        assert_eq!(sanitize_segment("ftp.example.org"), "ftp.example.org");
        assert_eq!(sanitize_segment("file:///srv/www"), "file____srv_www");
        assert_eq!(sanitize_segment(".."), "_");
    }
}
