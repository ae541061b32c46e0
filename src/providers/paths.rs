//! Path prefix handling
//!
//! Every request path starts with `/<cp-code>/` followed by the optional
//! virtual root. The root is prepended to every caller path and stripped
//! from every path the server reports back.

/// Resolved `/<cp-code>/<prefix>/` root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefix {
    /// Always starts and ends with `/`
    root: String,
}

impl PathPrefix {
    pub fn new(cp_code: &str, prefix: Option<&str>) -> Self {
        let mut root = format!("/{}/", cp_code.trim_matches(|c| c == '/' || c == '\\'));
        if let Some(prefix) = prefix {
            let prefix = prefix.trim_matches(|c| c == '/' || c == '\\');
            if !prefix.is_empty() {
                root.push_str(prefix);
                root.push('/');
            }
        }
        Self { root }
    }

    /// The root including its trailing slash
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Prepend the root to a caller path
    pub fn apply(&self, path: &str) -> String {
        format!("{}{}", self.root, path.trim_start_matches(|c| c == '/' || c == '\\'))
    }

    /// Remove the root from a server path
    ///
    /// Paths that do not start with the root are returned unchanged, so
    /// stripping twice is harmless.
    pub fn strip(&self, path: &str) -> String {
        let bare = self.root.trim_end_matches('/');
        match path.strip_prefix(bare) {
            Some("") => "/".to_string(),
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }

    /// Whether `path` names the root itself
    pub fn is_root(&self, path: &str) -> bool {
        path.trim_end_matches('/') == self.root.trim_end_matches('/')
    }
}

/// Parent directory, `None` once the path has no parent left
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    if idx == 0 {
        Some("/")
    } else {
        Some(&trimmed[..idx])
    }
}

/// Last path segment
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Join a directory and a child name with exactly one slash
pub fn join(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Whether nothing meaningful is left after trimming separators and dots
pub fn is_effectively_empty(path: &str) -> bool {
    path.trim_matches(|c| c == '/' || c == '\\' || c == '.').is_empty()
}
