//! HTTP cache validation module
//!
//! Content-derived `ETag`s and `If-None-Match` evaluation for the front-end bundle.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Strong `ETag` for a file body, quoted (`"1f3a.."`)
///
/// The length is folded into the tag so equal hashes of different-size
/// bodies still differ.
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("\"{:x}-{:x}\"", content.len(), hasher.finish())
}

/// True when the client's cached copy is still current (answer 304)
///
/// `If-None-Match` uses weak comparison, so `W/"x"` matches `"x"`.
/// Accepts lists (`"a", "b"`) and the `*` wildcard.
pub fn is_not_modified(if_none_match: Option<&str>, etag: &str) -> bool {
    let Some(header) = if_none_match else {
        return false;
    };
    let ours = strip_weak(etag);
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || strip_weak(candidate) == ours
    })
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_is_quoted_and_stable() {
        let etag = generate_etag(b"<div id=\"app\"></div>");
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag, generate_etag(b"<div id=\"app\"></div>"));
        assert_ne!(etag, generate_etag(b"<div id=\"root\"></div>"));
    }

    #[test]
    fn test_not_modified() {
        let etag = generate_etag(b"bundle");
        assert!(is_not_modified(Some(&etag), &etag));
        assert!(is_not_modified(Some(&format!("\"other\", {etag}")), &etag));
        assert!(is_not_modified(Some(&format!("W/{etag}")), &etag));
        assert!(is_not_modified(Some("*"), &etag));
        assert!(!is_not_modified(Some("\"other\""), &etag));
        assert!(!is_not_modified(None, &etag));
    }
}
