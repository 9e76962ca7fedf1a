use serde::{Deserialize, Serialize};
use std::fmt;

/// Path of a node inside a test or item document.
///
/// Rendered as `/`-separated segments of the form `class[identifier]`,
/// e.g. `assessmentTest[T]/testPart[P1]/assessmentSection[S1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Location {
    segments: Vec<String>,
}

impl Location {
    /// A location with a single root segment.
    pub fn root(class_name: &str, identifier: impl fmt::Display) -> Self {
        Self {
            segments: vec![format!("{class_name}[{identifier}]")],
        }
    }

    /// Extend this location by one `class[identifier]` segment.
    pub fn child(&self, class_name: &str, identifier: impl fmt::Display) -> Self {
        let mut segments = self.segments.clone();
        segments.push(format!("{class_name}[{identifier}]"));
        Self { segments }
    }

    /// Extend this location by a bare segment (no identifier).
    pub fn with(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_string()
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Self {
            segments: value
                .split('/')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = Location::root("assessmentTest", "T")
            .child("testPart", "P1")
            .child("assessmentSection", "S1");
        assert_eq!(
            loc.to_string(),
            "assessmentTest[T]/testPart[P1]/assessmentSection[S1]"
        );
        assert_eq!(loc.depth(), 3);
    }

    #[test]
    fn test_location_bare_segment() {
        let loc = Location::root("assessmentItem", "I").with("responseProcessing");
        assert_eq!(loc.to_string(), "assessmentItem[I]/responseProcessing");
    }

    #[test]
    fn test_location_string_round_trip() {
        let loc = Location::root("assessmentTest", "T").child("testPart", "P1");
        let back = Location::from(String::from(loc.clone()));
        assert_eq!(back, loc);
    }
}
