//! Include paths for eager loading of related data
//!
//! An include path names a navigation, optionally followed by nested
//! navigations separated by dots (`"lines.product"`). The legacy
//! comma-delimited form is still accepted: `"customer, lines"` parses into two
//! paths, and empty segments are ignored, so `""` means no eager loading.

use std::fmt;

/// One navigation path, split into its segments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IncludePath {
    segments: Vec<String>,
}

impl IncludePath {
    /// Parses a dotted path; `None` if it contains no non-empty segment
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<String> = path
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    /// Navigation names from the root entity outwards
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for IncludePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Ordered set of include paths attached to a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludePaths {
    paths: Vec<IncludePath>,
}

impl IncludePaths {
    /// No eager loading
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses the comma-delimited form
    pub fn parse(raw: &str) -> Self {
        let mut paths = Self::none();
        for segment in raw.split(',') {
            if let Some(path) = IncludePath::parse(segment) {
                paths.push(path);
            }
        }
        paths
    }

    /// Appends a path (comma-free), ignoring it if blank
    pub fn with(mut self, path: &str) -> Self {
        if let Some(path) = IncludePath::parse(path) {
            self.push(path);
        }
        self
    }

    /// Appends every path of `other`
    pub fn merge(mut self, other: IncludePaths) -> Self {
        for path in other.paths {
            self.push(path);
        }
        self
    }

    fn push(&mut self, path: IncludePath) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Returns true if nothing should be eager-loaded
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of distinct paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Iterates over the paths in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &IncludePath> {
        self.paths.iter()
    }
}

impl From<&str> for IncludePaths {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for IncludePaths {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&[&str]> for IncludePaths {
    fn from(paths: &[&str]) -> Self {
        paths.iter().fold(Self::none(), |acc, p| acc.with(p))
    }
}

impl<const N: usize> From<[&str; N]> for IncludePaths {
    fn from(paths: [&str; N]) -> Self {
        paths.iter().fold(Self::none(), |acc, p| acc.with(p))
    }
}

impl fmt::Display for IncludePaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.paths.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_means_no_includes() {
        assert!(IncludePaths::parse("").is_empty());
        assert!(IncludePaths::parse(" , ,").is_empty());
    }

    #[test]
    fn test_comma_split_ignores_empty_segments() {
        let paths = IncludePaths::parse("customer,,lines, ");
        let names: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["customer", "lines"]);
    }

    #[test]
    fn test_dotted_path_segments() {
        let paths = IncludePaths::from("lines.product");
        let path = paths.iter().next().unwrap();
        assert_eq!(path.segments(), ["lines", "product"]);
    }

    #[test]
    fn test_typed_builder_deduplicates() {
        let paths = IncludePaths::none().with("lines").with("lines").with("customer");
        assert_eq!(paths.len(), 2);
        assert_eq!(paths.to_string(), "lines,customer");
    }

    #[test]
    fn test_from_array() {
        let paths = IncludePaths::from(["customer", "lines.product"]);
        assert_eq!(paths.len(), 2);
    }
}
