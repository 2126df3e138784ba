//! Hierarchical names for publications and sync requests.
//!
//! A name is an ordered sequence of opaque byte components. Names compare
//! component-wise, so a strict prefix sorts before any of its extensions;
//! the subscription and pending-interest tables rely on that ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single opaque name component.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component(Vec<u8>);

impl Component {
    /// Create a component from raw bytes.
    #[must_use]
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    /// Create a timestamp component from milliseconds since the Unix epoch.
    ///
    /// Big-endian so that lexicographic component order equals numeric
    /// timestamp order.
    #[must_use]
    pub fn from_timestamp(ms: u64) -> Self {
        Self(ms.to_be_bytes().to_vec())
    }

    /// Interpret this component as a timestamp, if it has the right width.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.0.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Raw bytes of the component.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Component length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the component is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() && byte != b'%' && byte != b'/' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "%{byte:02X}")?;
            }
        }
        Ok(())
    }
}

/// A hierarchical name: an ordered sequence of opaque components.
///
/// # Example
///
/// ```rust
/// use pubsync::Name;
///
/// let prefix = Name::from("/sensors/hall");
/// let name = prefix.clone().appended_timestamp(1_700_000_000_000);
/// assert!(prefix.is_prefix_of(&name));
/// assert_eq!(name.timestamp(), Some(1_700_000_000_000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name(Vec<Component>);

impl Name {
    /// Create an empty (root) name.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a name from its components.
    #[must_use]
    pub fn from_components(components: Vec<Component>) -> Self {
        Self(components)
    }

    /// Append a component in place.
    pub fn push(&mut self, component: Component) {
        self.0.push(component);
    }

    /// Return this name extended by one component.
    #[must_use]
    pub fn appended(mut self, component: Component) -> Self {
        self.0.push(component);
        self
    }

    /// Return this name extended by a timestamp component.
    #[must_use]
    pub fn appended_timestamp(self, ms: u64) -> Self {
        self.appended(Component::from_timestamp(ms))
    }

    /// Read the final component as a timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Option<u64> {
        self.0.last().and_then(Component::as_timestamp)
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this is the root name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The name's components.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// The final component, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Component> {
        self.0.last()
    }

    /// Check whether `self` is a (non-strict) prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl From<&str> for Name {
    /// Build a name from a `/`-separated path; empty segments are skipped,
    /// so `"/"` is the root name.
    fn from(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| Component::new(segment.as_bytes().to_vec()))
                .collect(),
        )
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for component in &self.0 {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let name = Name::from("/alpha/beta");
        assert_eq!(name.len(), 2);
        assert_eq!(name.to_string(), "/alpha/beta");
    }

    #[test]
    fn root_name() {
        assert_eq!(Name::from("/"), Name::new());
        assert_eq!(Name::new().to_string(), "/");
        assert!(Name::new().is_empty());
    }

    #[test]
    fn prefix_match() {
        let root = Name::new();
        let a = Name::from("/a");
        let ab = Name::from("/a/b");
        let ax = Name::from("/a/x");

        assert!(root.is_prefix_of(&ab));
        assert!(a.is_prefix_of(&a));
        assert!(a.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
        assert!(!ax.is_prefix_of(&ab));
    }

    #[test]
    fn prefix_sorts_before_extension() {
        let a = Name::from("/a");
        let ab = Name::from("/a/b");
        assert!(a < ab);
    }

    #[test]
    fn timestamp_roundtrip() {
        let name = Name::from("/topic").appended_timestamp(123_456_789);
        assert_eq!(name.timestamp(), Some(123_456_789));
        assert_eq!(name.len(), 2);
    }

    #[test]
    fn timestamp_order_is_lexicographic() {
        let older = Name::from("/t").appended_timestamp(1_000);
        let newer = Name::from("/t").appended_timestamp(2_000);
        assert!(older < newer);
    }

    #[test]
    fn timestamp_requires_eight_bytes() {
        let name = Name::from("/short").appended(Component::new(vec![1, 2, 3]));
        assert_eq!(name.timestamp(), None);
    }

    #[test]
    fn display_escapes_non_printable() {
        let name = Name::new().appended(Component::new(vec![b'a', 0x00, b'/']));
        assert_eq!(name.to_string(), "/a%00%2F");
    }

    #[test]
    fn serde_roundtrip() {
        let name = Name::from("/x/y").appended_timestamp(42);
        let bytes = bincode::serialize(&name).unwrap();
        let back: Name = bincode::deserialize(&bytes).unwrap();
        assert_eq!(name, back);
    }
}
