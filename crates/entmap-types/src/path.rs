use std::fmt;
use std::sync::Arc;

/// Location of a field inside a nested object graph.
///
/// A `Path` is an immutable cons-list: every path other than the root holds
/// its last segment and a shared pointer to its parent. Extending a path
/// never touches the parent, so sibling paths share their common prefix.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Option<Arc<Segment>>);

#[derive(PartialEq, Eq, Hash)]
struct Segment {
    name: String,
    parent: Path,
}

impl Path {
    /// The empty path at the translation root.
    pub const fn root() -> Self {
        Self(None)
    }

    /// Create a single-segment path.
    pub fn of(name: impl Into<String>) -> Self {
        Self::root().extend(name)
    }

    /// A new path with `name` appended.
    pub fn extend(&self, name: impl Into<String>) -> Self {
        Self(Some(Arc::new(Segment {
            name: name.into(),
            parent: self.clone(),
        })))
    }

    /// Returns `true` for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    /// The last segment, or `None` at the root.
    pub fn name(&self) -> Option<&str> {
        self.0.as_ref().map(|s| s.name.as_str())
    }

    /// The enclosing path, or `None` at the root.
    pub fn parent(&self) -> Option<&Path> {
        self.0.as_ref().map(|s| &s.parent)
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self;
        while let Some(segment) = &cursor.0 {
            depth += 1;
            cursor = &segment.parent;
        }
        depth
    }

    /// Segments ordered from the root outwards.
    pub fn segments(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.depth());
        let mut cursor = self;
        while let Some(segment) = &cursor.0 {
            out.push(segment.name.as_str());
            cursor = &segment.parent;
        }
        out.reverse();
        out
    }

    /// `self` with its leading `prefix` replaced by `onto`, or `None` when
    /// `self` does not start with `prefix`.
    pub fn rebase(&self, prefix: &Path, onto: &Path) -> Option<Path> {
        let segments = self.segments();
        let head = prefix.segments();
        if segments.len() < head.len() || segments[..head.len()] != head[..] {
            return None;
        }
        Some(
            segments[head.len()..]
                .iter()
                .fold(onto.clone(), |path, segment| path.extend(*segment)),
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        f.write_str(&self.segments().join("."))
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_empty() {
        let root = Path::root();
        assert!(root.is_root());
        assert_eq!(root.depth(), 0);
        assert!(root.name().is_none());
        assert_eq!(root.to_string(), "<root>");
    }

    #[test]
    fn rebase_replaces_prefix() {
        let inner = Path::of("tags").extend("city");
        let element = Path::of("tags").extend("3");
        assert_eq!(
            inner.rebase(&Path::of("tags"), &element).unwrap().to_string(),
            "tags.3.city"
        );
        assert_eq!(
            Path::of("tags").rebase(&Path::of("tags"), &element).unwrap().to_string(),
            "tags.3"
        );
        assert!(Path::of("other").rebase(&Path::of("tags"), &element).is_none());
    }

    #[test]
    fn extend_appends_without_touching_parent() {
        let person = Path::of("person");
        let city = person.extend("address").extend("city");
        assert_eq!(person.depth(), 1);
        assert_eq!(city.depth(), 3);
        assert_eq!(city.segments(), vec!["person", "address", "city"]);
        assert_eq!(city.to_string(), "person.address.city");
        assert_eq!(city.name(), Some("city"));
        assert_eq!(city.parent().unwrap().to_string(), "person.address");
    }

    #[test]
    fn equal_segments_compare_equal() {
        let a = Path::of("a").extend("b");
        let b = Path::of("a").extend("b");
        assert_eq!(a, b);
        assert_ne!(a, Path::of("a"));
    }
}
