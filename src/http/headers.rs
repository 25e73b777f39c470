//! HTTP header map with case-insensitive name lookup.

/// An order-preserving header list with case-insensitive lookup.
///
/// # Examples
///
/// ```
/// use duetodo::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/plain");
/// headers.set("content-type", "application/json");
///
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Repeated names are all kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single `name: value` entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one entry is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Total number of entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
