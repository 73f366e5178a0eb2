//! Target labels and requested build patterns.
//!
//! Labels arrive in several spellings (`//pkg:name`, `//pkg`, `@//pkg:name`,
//! `@@//pkg:name`). They are normalized before any comparison so that a
//! target-completed label can be matched against the patterns the invocation
//! asked for.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Normalize a target label into `[@repo]//package:name` form.
///
/// A leading `@` or `@@` naming the main repository is dropped, and a label
/// without an explicit target name gets the package's last path component.
#[must_use]
pub fn normalize_label(label: &str) -> String {
    let label = label.trim();
    let label = label
        .strip_prefix("@@//")
        .or_else(|| label.strip_prefix("@//"))
        .map_or_else(|| label.to_string(), |rest| format!("//{}", rest));

    let Some(idx) = label.find("//") else {
        return label;
    };
    let (repo, rest) = label.split_at(idx);
    let body = &rest[2..];
    if body.contains(':') {
        return label;
    }
    let name = body.rsplit('/').next().unwrap_or(body);
    if name.is_empty() {
        label
    } else {
        format!("{}//{}:{}", repo, body, name)
    }
}

/// Split a normalized label into `(repo, package, name)`
fn split_label(label: &str) -> Option<(&str, &str, &str)> {
    let idx = label.find("//")?;
    let repo = &label[..idx];
    let body = &label[idx + 2..];
    let (package, name) = body.split_once(':').unwrap_or((body, ""));
    Some((repo, package, name))
}

/// One target pattern from the invocation command line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildPattern {
    /// A single target: `//pkg:name`
    Exact {
        /// Normalized label
        label: String,
    },

    /// Every target in one package: `//pkg:all`, `//pkg:*`
    AllInPackage {
        /// Repository prefix, empty for the main repository
        repo: String,
        /// Package path without leading `//`
        package: String,
    },

    /// Every target beneath a package: `//pkg/...`
    Recursive {
        /// Repository prefix, empty for the main repository
        repo: String,
        /// Package path prefix without leading `//`, empty for `//...`
        prefix: String,
    },
}

impl BuildPattern {
    /// Parse a positive pattern.
    ///
    /// Relative patterns (`foo/...`) are anchored at the workspace root.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern is empty or has an empty target name
    pub fn parse(pattern: &str) -> CoreResult<Self> {
        let text = pattern.trim();
        if text.is_empty() {
            return Err(CoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty pattern".to_string(),
            });
        }

        let anchored = if text.contains("//") {
            text.to_string()
        } else {
            format!("//{}", text)
        };
        let anchored = anchored
            .strip_prefix("@@//")
            .or_else(|| anchored.strip_prefix("@//"))
            .map_or_else(|| anchored.clone(), |rest| format!("//{}", rest));

        let Some((repo, package, name)) = split_label(&anchored) else {
            return Err(CoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "missing //".to_string(),
            });
        };

        if package == "..." || package.ends_with("/...") {
            let prefix = package.trim_end_matches("...").trim_end_matches('/');
            return Ok(Self::Recursive {
                repo: repo.to_string(),
                prefix: prefix.to_string(),
            });
        }

        match name {
            "all" | "*" | "all-targets" => Ok(Self::AllInPackage {
                repo: repo.to_string(),
                package: package.to_string(),
            }),
            _ if anchored.ends_with(':') => Err(CoreError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty target name".to_string(),
            }),
            _ => Ok(Self::Exact {
                label: normalize_label(&anchored),
            }),
        }
    }

    /// Check whether a label (any accepted spelling) falls under this pattern
    #[must_use]
    pub fn matches(&self, label: &str) -> bool {
        let label = normalize_label(label);
        match self {
            Self::Exact { label: expected } => *expected == label,
            Self::AllInPackage { repo, package } => split_label(&label)
                .is_some_and(|(r, p, _)| r == repo && p == package),
            Self::Recursive { repo, prefix } => split_label(&label).is_some_and(|(r, p, _)| {
                r == repo
                    && (prefix.is_empty()
                        || p == prefix
                        || p.strip_prefix(prefix.as_str())
                            .is_some_and(|rest| rest.starts_with('/')))
            }),
        }
    }
}

impl std::fmt::Display for BuildPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact { label } => write!(f, "{}", label),
            Self::AllInPackage { repo, package } => write!(f, "{}//{}:all", repo, package),
            Self::Recursive { repo, prefix } if prefix.is_empty() => write!(f, "{}//...", repo),
            Self::Recursive { repo, prefix } => write!(f, "{}//{}/...", repo, prefix),
        }
    }
}

/// The patterns an invocation requested, with `-` exclusions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSet {
    /// Positive patterns
    pub include: Vec<BuildPattern>,
    /// Negative (`-//pkg/...`) patterns
    pub exclude: Vec<BuildPattern>,
}

impl PatternSet {
    /// Create a new empty pattern set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one raw pattern; a leading `-` makes it an exclusion.
    ///
    /// # Errors
    ///
    /// Returns error if the pattern cannot be parsed
    pub fn push(&mut self, raw: &str) -> CoreResult<()> {
        match raw.trim().strip_prefix('-') {
            Some(negated) => self.exclude.push(BuildPattern::parse(negated)?),
            None => self.include.push(BuildPattern::parse(raw)?),
        }
        Ok(())
    }

    /// Check whether a label was requested
    #[must_use]
    pub fn matches(&self, label: &str) -> bool {
        self.include.iter().any(|p| p.matches(label))
            && !self.exclude.iter().any(|p| p.matches(label))
    }

    /// Check if no positive pattern has been added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("//foo:bar"), "//foo:bar");
        assert_eq!(normalize_label("@//foo:bar"), "//foo:bar");
        assert_eq!(normalize_label("@@//foo:bar"), "//foo:bar");
        assert_eq!(normalize_label("//foo/baz"), "//foo/baz:baz");
        assert_eq!(normalize_label("@repo//lib"), "@repo//lib:lib");
        assert_eq!(normalize_label("//:root"), "//:root");
    }

    #[test]
    fn test_parse_patterns() {
        assert_eq!(
            BuildPattern::parse("//app:server").unwrap(),
            BuildPattern::Exact { label: "//app:server".into() }
        );
        assert_eq!(
            BuildPattern::parse("//app:all").unwrap(),
            BuildPattern::AllInPackage { repo: String::new(), package: "app".into() }
        );
        assert_eq!(
            BuildPattern::parse("app/...").unwrap(),
            BuildPattern::Recursive { repo: String::new(), prefix: "app".into() }
        );
        assert_eq!(
            BuildPattern::parse("//...").unwrap(),
            BuildPattern::Recursive { repo: String::new(), prefix: String::new() }
        );
        assert!(BuildPattern::parse("  ").is_err());
        assert!(BuildPattern::parse("//app:").is_err());
    }

    #[test]
    fn test_pattern_matching() {
        let exact = BuildPattern::parse("//app").unwrap();
        assert!(exact.matches("@//app:app"));
        assert!(!exact.matches("//app:other"));

        let package = BuildPattern::parse("//lib:*").unwrap();
        assert!(package.matches("//lib:a"));
        assert!(!package.matches("//lib/sub:a"));

        let recursive = BuildPattern::parse("//lib/...").unwrap();
        assert!(recursive.matches("//lib:a"));
        assert!(recursive.matches("//lib/sub:a"));
        assert!(!recursive.matches("//library:a"));
    }

    #[test]
    fn test_pattern_set_exclusions() {
        let mut set = PatternSet::new();
        assert!(!set.matches("//a:b"));

        set.push("//...").unwrap();
        set.push("-//third_party/...").unwrap();
        assert!(set.matches("//src:main"));
        assert!(!set.matches("//third_party/zlib:zlib"));
        assert_eq!(set.exclude.len(), 1);
    }

    #[test]
    fn test_pattern_display() {
        assert_eq!(BuildPattern::parse("//a/...:all").unwrap().to_string(), "//a/...");
        assert_eq!(BuildPattern::parse("//a:*").unwrap().to_string(), "//a:all");
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(pkg in "[a-z]{1,6}(/[a-z]{1,6}){0,2}", name in "[a-z_]{0,6}") {
            let raw = if name.is_empty() { format!("//{}", pkg) } else { format!("@//{}:{}", pkg, name) };
            let once = normalize_label(&raw);
            prop_assert_eq!(normalize_label(&once), once.clone());
        }

        #[test]
        fn prop_recursive_root_matches_everything(pkg in "[a-z]{1,6}(/[a-z]{1,6}){0,2}", name in "[a-z]{1,6}") {
            let all = BuildPattern::parse("//...").unwrap();
            let label = format!("//{}:{}", pkg, name);
            prop_assert!(all.matches(&label));
        }
    }
}
