// Include/exclude glob matching for Source scoping (spec.md §4.7).
//
// Patterns are deny-then-allow: a path is indexed if it matches no exclude
// pattern and (the include list is empty or it matches at least one include
// pattern).

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Normalizes a raw user-supplied pattern. A bare extension like `.pdf` is
/// auto-repaired to `*.pdf` (E2E scenario 6); everything else passes through
/// trimmed.
pub fn normalize_pattern(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(ext) = trimmed.strip_prefix('.') {
        if !ext.is_empty() && !ext.contains(['/', '*', '?']) {
            return format!("*.{ext}");
        }
    }
    trimmed.to_string()
}

/// Compiled include/exclude matcher for a single source.
pub struct PatternMatcher {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PatternMatcher {
    pub fn new(include: &[String], exclude: &[String]) -> anyhow::Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in include {
                builder.add(Glob::new(pattern)?);
            }
            Some(builder.build()?)
        };

        let mut exclude_builder = GlobSetBuilder::new();
        for pattern in exclude {
            exclude_builder.add(Glob::new(pattern)?);
        }

        Ok(Self { include, exclude: exclude_builder.build()? })
    }

    /// True if `relative_path` should be indexed under this source's scope.
    pub fn is_match(&self, relative_path: &str) -> bool {
        if self.exclude.is_match(relative_path) {
            return false;
        }
        match &self.include {
            Some(set) => set.is_match(relative_path),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_repairs_bare_extension() {
        assert_eq!(normalize_pattern(".pdf"), "*.pdf");
        assert_eq!(normalize_pattern("*.pdf"), "*.pdf");
        assert_eq!(normalize_pattern("  src/**/*.rs "), "src/**/*.rs");
    }

    #[test]
    fn exclude_wins_over_include() {
        let matcher = PatternMatcher::new(
            &["**/*.md".to_string()],
            &["**/node_modules/**".to_string()],
        )
        .unwrap();
        assert!(matcher.is_match("docs/readme.md"));
        assert!(!matcher.is_match("node_modules/pkg/readme.md"));
        assert!(!matcher.is_match("docs/notes.txt"));
    }

    #[test]
    fn empty_include_matches_everything_not_excluded() {
        let matcher = PatternMatcher::new(&[], &["**/*.tmp".to_string()]).unwrap();
        assert!(matcher.is_match("a/b.rs"));
        assert!(!matcher.is_match("a/b.tmp"));
    }
}
