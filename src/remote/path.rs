//! Path translation between the local workspace and the remote root.
//!
//! Remote paths are always POSIX strings, so this module works on `&str`
//! rather than `Path`. Prefix substitution only matches whole path
//! components: `/home/u/app2` is not under `/home/u/app`.

use crate::error::{Error, Result};

/// The `(local_root, remote_root)` translation basis. Both are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPair {
    local_root: String,
    remote_root: String,
}

impl PathPair {
    pub fn new(local_root: impl Into<String>, remote_root: impl Into<String>) -> Result<Self> {
        let local_root = local_root.into();
        let remote_root = remote_root.into();
        for (label, root) in [("local", &local_root), ("remote", &remote_root)] {
            if !root.starts_with('/') {
                return Err(Error::validation(format!(
                    "{label} root must be an absolute path: {root}"
                )));
            }
        }
        Ok(Self {
            local_root: trim_trailing_slash(&local_root).to_string(),
            remote_root: trim_trailing_slash(&remote_root).to_string(),
        })
    }

    /// A pair that maps every path onto itself (local execution).
    pub fn identity(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        Self::new(root.clone(), root)
    }

    pub fn local_root(&self) -> &str {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    /// Resolve a tool-supplied path to a remote path.
    ///
    /// * unset, empty or `.` resolves to the remote root
    /// * under the local root: the prefix is replaced by the remote root
    /// * any other absolute path is taken to be remote already
    /// * relative paths are joined onto the remote root
    pub fn to_remote(&self, path: Option<&str>) -> String {
        let path = path.unwrap_or_default();
        if path.is_empty() || path == "." || path == "./" {
            return self.remote_root.clone();
        }

        if let Some(rest) = strip_root(path, &self.local_root) {
            return rebase(&self.remote_root, rest);
        }

        if path.starts_with('/') {
            return path.to_string();
        }

        let relative = path.strip_prefix("./").unwrap_or(path);
        join_remote(&self.remote_root, relative)
    }

    /// Map a local working directory to the remote one by prefix
    /// substitution; directories outside the local root are left unchanged.
    pub fn to_remote_working_dir(&self, cwd: &str) -> String {
        strip_root(cwd, &self.local_root)
            .map_or_else(|| cwd.to_string(), |rest| rebase(&self.remote_root, rest))
    }

    /// Inverse of [`Self::to_remote`] for paths under the remote root.
    pub fn to_local(&self, remote_path: &str) -> String {
        strip_root(remote_path, &self.remote_root).map_or_else(
            || remote_path.to_string(),
            |rest| rebase(&self.local_root, rest),
        )
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// The part of `path` after `root`, either empty or starting with `/`.
fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root == "/" {
        return path.starts_with('/').then_some(path);
    }
    let rest = path.strip_prefix(root)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn rebase(root: &str, rest: &str) -> String {
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        root.to_string()
    } else {
        join_remote(root, rest)
    }
}

/// Join `child` onto `base`. An absolute `child` is returned as-is.
pub fn join_remote(base: &str, child: &str) -> String {
    if child.starts_with('/') {
        return child.to_string();
    }
    if child.is_empty() {
        return base.to_string();
    }
    if base.ends_with('/') {
        format!("{base}{child}")
    } else {
        format!("{base}/{child}")
    }
}

/// Last component of a POSIX path.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Directory containing `path` (`.` for a bare name, `/` for top-level).
pub fn parent_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => ".",
    }
}

/// `path` relative to `root`, when `path` lies strictly under it.
pub fn relative_to<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    let rest = strip_root(path, trim_trailing_slash(root))?.trim_start_matches('/');
    (!rest.is_empty()).then_some(rest)
}
