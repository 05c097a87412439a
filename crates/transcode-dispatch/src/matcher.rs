//! Path pattern matching

use regex::Regex;
use transcode_core::{Error, Result};

/// Path pattern matcher
#[derive(Debug)]
pub struct PathMatcher {
    /// Original pattern
    pattern: String,

    /// Compiled regex (if dynamic)
    regex: Option<Regex>,
}

impl PathMatcher {
    /// Create a new path matcher from a pattern
    ///
    /// Patterns:
    /// - `/tiles` - static path
    /// - `/layers/:id` - any single segment
    /// - `/static/*filepath` - wildcard (must be at end)
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if !pattern.starts_with('/') {
            return Err(Error::Config(format!("pattern '{pattern}' must start with '/'")));
        }

        let segments: Vec<&str> = pattern.split('/').collect();
        let mut dynamic = false;
        for (i, segment) in segments.iter().enumerate() {
            if segment.starts_with('*') && i + 1 != segments.len() {
                return Err(Error::Config(format!(
                    "wildcard must be the last segment in '{pattern}'"
                )));
            }
            dynamic |= segment.starts_with(':') || segment.starts_with('*');
        }

        let regex = if dynamic {
            Some(Self::pattern_to_regex(&pattern)?)
        } else {
            None
        };

        Ok(Self { pattern, regex })
    }

    /// Convert path pattern to regex
    fn pattern_to_regex(pattern: &str) -> Result<Regex> {
        let mut regex_str = String::from("^");

        for segment in pattern.split('/') {
            if segment.is_empty() {
                continue;
            }

            regex_str.push('/');

            if segment.starts_with(':') {
                regex_str.push_str("[^/]+");
            } else if segment.starts_with('*') {
                regex_str.push_str(".*");
            } else {
                regex_str.push_str(&regex::escape(segment));
            }
        }

        regex_str.push('$');

        Regex::new(&regex_str).map_err(|e| Error::Config(format!("invalid pattern '{pattern}': {e}")))
    }

    /// Whether `path` matches this pattern
    pub fn is_match(&self, path: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(path),
            None => path == self.pattern,
        }
    }

    /// Get the pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_path() {
        let matcher = PathMatcher::new("/tiles").unwrap();
        assert_eq!(matcher.pattern(), "/tiles");

        assert!(matcher.is_match("/tiles"));
        assert!(!matcher.is_match("/tiles/1"));
    }

    #[test]
    fn test_single_param() {
        let matcher = PathMatcher::new("/layers/:id").unwrap();

        assert!(matcher.is_match("/layers/roads"));
        assert!(!matcher.is_match("/layers"));
        assert!(!matcher.is_match("/layers/roads/extra"));
    }

    #[test]
    fn test_wildcard() {
        let matcher = PathMatcher::new("/static/*filepath").unwrap();

        assert!(matcher.is_match("/static/css/main.css"));
        assert!(matcher.is_match("/static/"));
        assert!(!matcher.is_match("/other/main.css"));
    }

    #[test]
    fn test_literal_segments_are_escaped() {
        let matcher = PathMatcher::new("/v1.0/:layer").unwrap();
        assert!(matcher.is_match("/v1.0/roads"));
        assert!(!matcher.is_match("/v1x0/roads"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathMatcher::new("tiles").is_err());
        assert!(PathMatcher::new("/static/*rest/more").is_err());
    }
}
