//! The route table (§3): an ordered sequence of (compiled path regex, content root) pairs.
//!
//! First `regex_search` hit wins, scanned in insertion order. This is deliberately a
//! `Vec`, not a trie or a `RegexSet` keyed by longest-prefix: the source's semantics are
//! "first match in registration order", which a trie would have to special-case to
//! preserve, so the ordered scan is kept as-is (design note, §9).

use std::path::PathBuf;

use regex::Regex;

#[derive(Clone)]
pub struct Route {
    pub pattern: Regex,
    pub content_root: PathBuf,
}

#[derive(Default, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

/// Result of a route lookup: either a matched static route, or a fallthrough to the
/// app bridge.
pub enum Dispatch<'a> {
    Static(&'a Route),
    App,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `prefix` as a case-insensitive regex and append it to the table.
    pub fn add(&mut self, prefix: &str, content_root: impl Into<PathBuf>) -> Result<(), regex::Error> {
        let pattern = Regex::new(&format!("(?i){prefix}"))?;
        self.routes.push(Route {
            pattern,
            content_root: content_root.into(),
        });
        Ok(())
    }

    /// Scan routes in insertion order; the first regex match wins.
    pub fn dispatch(&self, path: &str) -> Dispatch<'_> {
        for route in &self.routes {
            if route.pattern.is_match(path) {
                return Dispatch::Static(route);
            }
        }
        Dispatch::App
    }

    /// Strip the portion of `path` matched by `route`'s pattern, mirroring the source's
    /// `boost::regex_replace(path, path_regex, "")`.
    pub fn strip_prefix<'p>(route: &Route, path: &'p str) -> std::borrow::Cow<'p, str> {
        route.pattern.replace(path, "")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_match_wins_in_insertion_order() {
        let mut table = RouteTable::new();
        table.add("^/static", "/srv/a").unwrap();
        table.add("^/static/special", "/srv/b").unwrap();

        match table.dispatch("/static/special/file.txt") {
            Dispatch::Static(route) => assert_eq!(route.content_root, PathBuf::from("/srv/a")),
            Dispatch::App => panic!("expected static dispatch"),
        }
    }

    #[test]
    fn no_match_falls_through_to_app() {
        let mut table = RouteTable::new();
        table.add("^/static", "/srv/a").unwrap();
        assert!(matches!(table.dispatch("/api/x"), Dispatch::App));
    }
}
