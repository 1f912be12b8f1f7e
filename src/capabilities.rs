//! Server capability and version lookup.

use semver::{BuildMetadata, Prerelease, Version};
use serde_json::Value;

/// Capabilities advertised by the server in its root resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    tree: Value,
}

impl Capabilities {
    /// Wrap a capability tree.
    pub fn new(tree: Value) -> Self {
        Self { tree }
    }

    /// Whether the capability at `path` is explicitly `true`.
    ///
    /// Partial paths that lead to a nested map are not capabilities, and
    /// anything missing is `false`.
    pub fn has_capability(&self, path: &[&str]) -> bool {
        let mut node = &self.tree;

        for key in path {
            match node.get(key) {
                Some(next) => node = next,
                None => return false,
            }
        }

        matches!(node, Value::Bool(true))
    }

    /// The raw capability tree.
    pub fn as_value(&self) -> &Value {
        &self.tree
    }
}

/// Whether a server version is at least `minimum`.
///
/// Versions are compared component by component with missing components
/// treated as zero, so `2.0` equals `2.0.0`. A suffix on the last numeric
/// component (`5.0.5beta1`) makes it a pre-release of that version. Absent
/// or unparsable versions are treated as older than anything.
pub fn version_at_least(version: Option<&str>, minimum: &str) -> bool {
    match (version.and_then(parse_version), parse_version(minimum)) {
        (Some(version), Some(minimum)) => version >= minimum,
        _ => false,
    }
}

/// A version as semver plus any components beyond the third.
fn parse_version(version: &str) -> Option<(Version, Vec<u64>)> {
    let mut numbers = Vec::new();
    let mut pre = Prerelease::EMPTY;

    for part in version.trim().split('.') {
        let digits = part.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            break;
        }

        numbers.push(part[..digits].parse::<u64>().ok()?);

        let suffix: String = part[digits..]
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        if !suffix.is_empty() {
            pre = Prerelease::new(&suffix).unwrap_or(Prerelease::EMPTY);
            break;
        }
    }

    if numbers.is_empty() {
        return None;
    }

    let component = |i: usize| numbers.get(i).copied().unwrap_or(0);
    let semver = Version {
        major: component(0),
        minor: component(1),
        patch: component(2),
        pre,
        build: BuildMetadata::EMPTY,
    };

    let mut rest: Vec<u64> = numbers.iter().skip(3).copied().collect();
    while rest.last() == Some(&0) {
        rest.pop();
    }

    Some((semver, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps() -> Capabilities {
        Capabilities::new(json!({
            "authentication": {"client_web_login": true},
            "diffs": {"moved_files": true, "validation": {"base_commit_ids": false}},
        }))
    }

    #[test]
    fn test_true_capability() {
        assert!(caps().has_capability(&["authentication", "client_web_login"]));
        assert!(caps().has_capability(&["diffs", "moved_files"]));
    }

    #[test]
    fn test_false_and_missing() {
        assert!(!caps().has_capability(&["diffs", "validation", "base_commit_ids"]));
        assert!(!caps().has_capability(&["scmtools", "git"]));
        assert!(!caps().has_capability(&["diffs", "moved_files", "deeper"]));
    }

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least(Some("2.0.14"), "2.0.14"));
        assert!(version_at_least(Some("7.0"), "2.0.14"));
        assert!(version_at_least(Some("2.0.14.1"), "2.0.14"));
        assert!(version_at_least(Some("2.0.14.0"), "2.0.14"));
        assert!(!version_at_least(Some("2.0.9"), "2.0.14"));
        assert!(!version_at_least(Some("1.7.28"), "2.0.14"));
        assert!(!version_at_least(None, "2.0.14"));
        assert!(!version_at_least(Some("unknown"), "2.0.14"));
    }

    #[test]
    fn test_prerelease_is_older() {
        assert!(!version_at_least(Some("5.0.5beta1"), "5.0.5"));
        assert!(version_at_least(Some("5.0.6beta1"), "5.0.5"));
        assert!(version_at_least(Some("5.0.5"), "5.0.5"));
    }

    #[test]
    fn test_partial_path_is_not_a_capability() {
        assert!(!caps().has_capability(&["diffs"]));
        assert!(!Capabilities::default().has_capability(&["anything"]));
    }
}
