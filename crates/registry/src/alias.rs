use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Hierarchical name of an instrument, e.g. `http.requests.active`.
///
/// Two aliases are equal iff their segment sequences are equal, so
/// `"a.b"` and `["a", "b"]` name the same instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MetricAlias {
    segments: Vec<String>,
}

impl MetricAlias {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns a new alias with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        let segment = segment.into();
        if !segment.is_empty() {
            segments.push(segment);
        }
        Self { segments }
    }

    /// Returns a new alias with every segment of `prefix` placed in front.
    pub fn prefixed(&self, prefix: &Self) -> Self {
        let mut segments = prefix.segments.clone();
        segments.extend(self.segments.iter().cloned());
        Self { segments }
    }

    /// Joins the segments with `separator`, e.g. `/` for path-like sinks.
    pub fn join(&self, separator: &str) -> String {
        self.segments.join(separator)
    }
}

impl fmt::Display for MetricAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join("."))
    }
}

impl FromStr for MetricAlias {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for MetricAlias {
    fn from(s: &str) -> Self {
        Self::new(s.split('.'))
    }
}

impl From<String> for MetricAlias {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&String> for MetricAlias {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&MetricAlias> for MetricAlias {
    fn from(alias: &MetricAlias) -> Self {
        alias.clone()
    }
}

impl From<MetricAlias> for String {
    fn from(alias: MetricAlias) -> Self {
        alias.to_string()
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for MetricAlias {
    fn from(segments: [S; N]) -> Self {
        Self::new(segments)
    }
}

impl<S: Into<String>> From<Vec<S>> for MetricAlias {
    fn from(segments: Vec<S>) -> Self {
        Self::new(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_and_segmented_aliases_are_equal() {
        let dotted = MetricAlias::from("http.requests.active");
        let segmented = MetricAlias::from(["http", "requests", "active"]);
        assert_eq!(dotted, segmented);
        assert_eq!(dotted.to_string(), "http.requests.active");
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        let alias = MetricAlias::from("..db..queries.");
        assert_eq!(alias.segments(), &["db".to_string(), "queries".to_string()]);
    }

    #[test]
    fn test_child_and_prefixed() {
        let base = MetricAlias::from("runtime");
        let memory = base.child("memory").child("heap");
        assert_eq!(memory.to_string(), "runtime.memory.heap");

        let prefixed = memory.prefixed(&MetricAlias::from("app.node1"));
        assert_eq!(prefixed.to_string(), "app.node1.runtime.memory.heap");
        assert_eq!(prefixed.join("/"), "app/node1/runtime/memory/heap");
    }

    #[test]
    fn test_serde_uses_dotted_form() {
        let alias = MetricAlias::from("jobs.failed");
        let json = serde_json::to_string(&alias).unwrap();
        assert_eq!(json, "\"jobs.failed\"");
        let back: MetricAlias = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alias);
    }
}
