//! Case-insensitive header storage for the request side of the data model (§3):
//! lookup is case-insensitive and a repeated header name is folded into the existing
//! entry by joining values with `", "` rather than kept as a second entry.

#[derive(Clone, Debug, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parsed header line, joining onto an existing same-name entry.
    pub fn insert_joined(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.entries.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if `name`'s (comma-split, trimmed) value list contains `token`, case-insensitively.
    /// Used for `Connection`/`Expect`/`Accept-Encoding` token checks.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|v| v.split(',').any(|part| part.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duplicate_headers_join_with_comma_space() {
        let mut h = Headers::new();
        h.insert_joined("X-Foo", "a");
        h.insert_joined("x-foo", "b");
        assert_eq!(h.get("X-FOO"), Some("a, b"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn has_token_is_case_insensitive_and_comma_split() {
        let mut h = Headers::new();
        h.insert_joined("Connection", "keep-alive, Upgrade");
        assert!(h.has_token("connection", "upgrade"));
        assert!(!h.has_token("connection", "close"));
    }
}
