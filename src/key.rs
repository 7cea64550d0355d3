//! Grid key codec: `grid/{sandbox}/{scope-marker}/{leaf}[/{sub_path}]`.
//!
//! This is the only place in the crate allowed to assemble or take apart a
//! grid key by string splitting; every other module calls into here.

use crate::error::{GridError, GridResult};

const ROOT: &str = "grid";

/// Returns `Err` if a segment is empty, contains a raw `/`, or starts with `.`.
fn validate_segment(segment: &str) -> GridResult<()> {
    if segment.is_empty() {
        return Err(GridError::MalformedKey("empty key segment".into()));
    }
    if segment.contains('/') {
        return Err(GridError::MalformedKey(format!(
            "segment must not contain '/': {segment}"
        )));
    }
    if segment.starts_with('.') {
        return Err(GridError::MalformedKey(format!(
            "segment must not start with '.': {segment}"
        )));
    }
    Ok(())
}

/// Builds a grid key from its components. `sub_path`, if given, is appended
/// verbatim (it may itself contain `/` to address a nested object).
pub fn build(sandbox: &str, scope_marker: &str, leaf: &str, sub_path: Option<&str>) -> GridResult<String> {
    validate_segment(sandbox)?;
    validate_segment(scope_marker)?;
    validate_segment(leaf)?;

    let mut key = format!("{ROOT}/{sandbox}/{scope_marker}/{leaf}");
    if let Some(sub) = sub_path {
        if sub.is_empty() {
            return Err(GridError::MalformedKey("sub_path must not be empty when provided".into()));
        }
        let sub = sub.trim_start_matches('/');
        key.push('/');
        key.push_str(sub);
    }
    Ok(key)
}

/// A parsed grid key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridKey {
    pub sandbox: String,
    pub scope_marker: String,
    pub leaf: String,
    pub sub_path: Option<String>,
}

/// Parses a grid key produced by [`build`]. Fails with `MalformedKey` on
/// anything that doesn't start with `grid/` or has fewer than three segments
/// after the root.
pub fn parse(key: &str) -> GridResult<GridKey> {
    let mut parts = key.splitn(5, '/');
    let root = parts.next().unwrap_or_default();
    if root != ROOT {
        return Err(GridError::MalformedKey(format!("key does not start with '{ROOT}/': {key}")));
    }
    let sandbox = parts.next().ok_or_else(|| GridError::MalformedKey(format!("missing sandbox segment: {key}")))?;
    let scope_marker = parts.next().ok_or_else(|| GridError::MalformedKey(format!("missing scope segment: {key}")))?;
    let leaf = parts.next().ok_or_else(|| GridError::MalformedKey(format!("missing leaf segment: {key}")))?;
    validate_segment(sandbox)?;
    validate_segment(scope_marker)?;
    validate_segment(leaf)?;
    let sub_path = parts.next().map(|s| s.to_string());

    Ok(GridKey {
        sandbox: sandbox.to_string(),
        scope_marker: scope_marker.to_string(),
        leaf: leaf.to_string(),
        sub_path,
    })
}

/// Scope marker for a session-scoped artifact.
pub fn session_marker(session_id: &str) -> String {
    format!("sess-{session_id}")
}

/// Scope marker for a user-scoped artifact.
pub fn user_marker(user_id: &str) -> String {
    format!("user-{user_id}")
}

/// Scope marker for a sandbox-shared artifact.
pub const SHARED_MARKER: &str = "shared";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_without_sub_path() {
        let key = build("sb1", "sess-abc", "artifact1", None).unwrap();
        assert_eq!(key, "grid/sb1/sess-abc/artifact1");
        let parsed = parse(&key).unwrap();
        assert_eq!(parsed.sandbox, "sb1");
        assert_eq!(parsed.scope_marker, "sess-abc");
        assert_eq!(parsed.leaf, "artifact1");
        assert_eq!(parsed.sub_path, None);
    }

    #[test]
    fn round_trips_with_sub_path() {
        let key = build("sb1", "shared", "ns1", Some("a/b.txt")).unwrap();
        assert_eq!(key, "grid/sb1/shared/ns1/a/b.txt");
        let parsed = parse(&key).unwrap();
        assert_eq!(parsed.sub_path.as_deref(), Some("a/b.txt"));
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(build("", "sess-x", "leaf", None).is_err());
    }

    #[test]
    fn rejects_slash_in_segment() {
        assert!(build("sb/1", "sess-x", "leaf", None).is_err());
    }

    #[test]
    fn rejects_dot_leading_segment() {
        assert!(build("sb1", ".hidden", "leaf", None).is_err());
    }

    #[test]
    fn parse_rejects_wrong_root() {
        assert!(parse("other/sb1/sess-x/leaf").is_err());
    }

    #[test]
    fn parse_rejects_missing_segments() {
        assert!(parse("grid/sb1").is_err());
    }

    #[test]
    fn markers_have_expected_shape() {
        assert_eq!(session_marker("s1"), "sess-s1");
        assert_eq!(user_marker("u1"), "user-u1");
        assert_eq!(SHARED_MARKER, "shared");
    }
}
