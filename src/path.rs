//! Hierarchical path helpers.
//!
//! Paths are absolute, `/`-separated and carry no trailing slash except for
//! the root itself. Directories are implicit: a path is a directory when some
//! stored file lies strictly below it.

/// The root path.
pub const ROOT: &str = "/";

/// Normalize a caller-supplied path.
///
/// Collapses repeated separators, resolves `.` and `..` (never climbing above
/// the root), forces a leading `/` and drops any trailing `/`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return ROOT.to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Ancestor chain of a normalized path, root first and the path itself last.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut chain = vec![ROOT.to_string()];
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        chain.push(current.clone());
    }
    chain
}

/// Parent directory. The root is its own parent.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => ROOT,
        Some(idx) => &path[..idx],
    }
}

/// Last segment of a path (empty for the root).
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a directory and a relative name, normalizing the result.
pub fn join(dir: &str, name: &str) -> String {
    normalize(&format!("{dir}/{name}"))
}

/// Prefix shared by every strict descendant of `dir`.
pub fn descendant_prefix(dir: &str) -> String {
    if dir == ROOT {
        ROOT.to_string()
    } else {
        format!("{dir}/")
    }
}

/// Whether `path` lies strictly below `dir`.
pub fn is_descendant(path: &str, dir: &str) -> bool {
    path != dir && path.starts_with(&descendant_prefix(dir))
}

/// Name of the top-level entry below `dir` that contains `path`.
///
/// `first_component("/a/b/c.txt", "/a")` is `Some("b")`.
pub fn first_component<'p>(path: &'p str, dir: &str) -> Option<&'p str> {
    if !is_descendant(path, dir) {
        return None;
    }
    let rest = &path[descendant_prefix(dir).len()..];
    rest.split('/').next().filter(|s| !s.is_empty())
}

/// Re-root `path` from below `from` to below `to`.
///
/// Returns `to` itself when `path == from`, and `None` when `path` is not
/// under `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    if !is_descendant(path, from) {
        return None;
    }
    let rest = &path[descendant_prefix(from).len()..];
    Some(join(to, rest))
}
