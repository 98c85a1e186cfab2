//! Canonical project labels from directory paths.
//!
//! Prefers the source-control remote name; falls back to the directory
//! basename. Path arguments are allow-listed before any subprocess sees
//! them.

use std::path::Path;
use std::process::Command;

/// Derive a project label for a working directory.
///
/// 1. Reject paths with characters outside `[A-Za-z0-9/_\-. ]` or that are
///    not directories; those fall straight back to the basename.
/// 2. Ask git for the remote origin URL and use its last path component
///    with `.git` removed.
/// 3. Otherwise the basename.
pub fn detect_project(dir: &Path) -> String {
    let fallback = basename(dir);

    let Some(dir_str) = dir.to_str() else {
        return fallback;
    };
    if !is_safe_path(dir_str) || !dir.is_dir() {
        return fallback;
    }

    match git_origin_url(dir_str) {
        Some(url) => repo_name_from_url(&url).unwrap_or(fallback),
        None => fallback,
    }
}

/// Decode a Claude-style encoded project directory name: a hyphen-joined
/// absolute path such as `-Users-dev-Projects-my-app`. Returns the
/// hyphen-joined remainder after the `projects` segment.
pub fn from_encoded_dir_name(dir: &Path) -> Option<String> {
    let name = dir.file_name()?.to_str()?;
    let segments: Vec<&str> = name.split('-').collect();
    let idx = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("projects"))?;
    let remainder = &segments[idx + 1..];
    if remainder.is_empty() {
        return None;
    }
    let joined = remainder.join("-");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn basename(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned())
}

/// Allow-list for paths passed to a subprocess.
fn is_safe_path(path: &str) -> bool {
    !path.is_empty()
        && path.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.' | ' ')
        })
}

fn git_origin_url(dir: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["-C", dir, "remote", "get-url", "origin"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if url.is_empty() {
        None
    } else {
        Some(url)
    }
}

/// Last path component of a remote URL with `.git` removed. Handles both
/// `https://host/user/repo.git` and `git@host:user/repo.git`.
fn repo_name_from_url(url: &str) -> Option<String> {
    let tail = url.rsplit(['/', ':']).next()?;
    let name = tail.trim_end_matches(".git").trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unsafe_paths_fall_back_to_basename() {
        assert!(!is_safe_path("/tmp/$(rm -rf)"));
        assert!(!is_safe_path("/tmp/a;b"));
        assert!(is_safe_path("/home/dev/My Project/sub_dir-1.2"));

        let label = detect_project(Path::new("/tmp/evil;dir/widgets"));
        assert_eq!(label, "widgets");
    }

    #[test]
    fn nonexistent_dir_falls_back_to_basename() {
        let label = detect_project(Path::new("/definitely/not/a/real/dir/widgets"));
        assert_eq!(label, "widgets");
    }

    #[test]
    fn repo_name_parses_https_and_scp_urls() {
        assert_eq!(
            repo_name_from_url("https://github.com/acme/widgets.git").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            repo_name_from_url("git@github.com:acme/widgets.git").as_deref(),
            Some("widgets")
        );
        assert_eq!(
            repo_name_from_url("https://github.com/acme/widgets").as_deref(),
            Some("widgets")
        );
    }

    #[test]
    fn encoded_dir_name_decodes_after_projects_segment() {
        assert_eq!(
            from_encoded_dir_name(Path::new("/x/-Users-dev-Projects-widgets")).as_deref(),
            Some("widgets")
        );
        // Multi-word project names keep their hyphens
        assert_eq!(
            from_encoded_dir_name(Path::new("/x/-Users-dev-Projects-my-cool-app")).as_deref(),
            Some("my-cool-app")
        );
        assert_eq!(from_encoded_dir_name(Path::new("/x/-Users-dev-src-app")), None);
        assert_eq!(from_encoded_dir_name(PathBuf::from("/x/-Users-dev-Projects").as_path()), None);
    }
}
