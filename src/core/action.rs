/*!
 * The unit of work the queue and dispatcher operate on.
 */

use std::time::{SystemTime, UNIX_EPOCH};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Create,
    Write,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Create => "CREATE",
            Method::Write => "WRITE",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A pending sync action. `path` is always relative to the watch root, never starts with `/`,
/// and never contains a `..` segment; directory paths end with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub method: Method,
    pub path: String,
    pub is_dir: bool,
    pub timestamp_ms: u64,
}

impl Action {
    /// Construct an action, deriving `is_dir` from the trailing slash and stamping it with
    /// the current wall-clock time.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let is_dir = path.ends_with('/');
        Self {
            method,
            is_dir,
            path,
            timestamp_ms: now_ms(),
        }
    }

    /// A short, human-readable description for logs (`"Create folder: a/b/"`).
    pub fn describe(&self) -> String {
        let kind = if self.is_dir { "folder" } else { "file" };
        let verb = match self.method {
            Method::Create => "Create",
            Method::Write => "Write",
            Method::Delete => "Delete",
        };
        format!("{verb} {kind}: {}", self.path)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Monotonic-ish wall time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
