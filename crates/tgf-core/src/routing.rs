//! Keyword matching and route selection.

use crate::config::{DefaultRoute, KeywordEntry, MatchMode, Route};

/// Normalize the `keywords` field into keyword groups.
///
/// The first entry decides the shape: a list means the field is an explicit
/// list of groups, a plain string means the whole field is one flat group.
/// Entries of the other shape are coerced rather than rejected.
fn keyword_groups(keywords: &[KeywordEntry]) -> Vec<Vec<&str>> {
    match keywords.first() {
        None => Vec::new(),
        Some(KeywordEntry::Group(_)) => keywords
            .iter()
            .map(|entry| match entry {
                KeywordEntry::Group(group) => group.iter().map(String::as_str).collect(),
                KeywordEntry::One(keyword) => vec![keyword.as_str()],
            })
            .collect(),
        Some(KeywordEntry::One(_)) => {
            let mut group = Vec::with_capacity(keywords.len());
            for entry in keywords {
                match entry {
                    KeywordEntry::One(keyword) => group.push(keyword.as_str()),
                    KeywordEntry::Group(nested) => {
                        group.extend(nested.iter().map(String::as_str));
                    }
                }
            }
            vec![group]
        }
    }
}

impl Route {
    /// Whether `text` satisfies this route's keyword rule.
    ///
    /// Every group must pass its own ANY/ALL reduction and the groups are
    /// AND-ed together, so `[[a, b], [c]]` under `match: any` reads
    /// "(a or b) and c". Empty text and empty keyword lists never match.
    pub fn matches(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let groups = keyword_groups(&self.keywords);
        if groups.is_empty() {
            return false;
        }

        let folded;
        let haystack = if self.case_sensitive {
            text
        } else {
            folded = text.to_lowercase();
            folded.as_str()
        };

        groups.iter().all(|group| self.group_hits(haystack, group))
    }

    fn group_hits(&self, haystack: &str, group: &[&str]) -> bool {
        if group.is_empty() {
            return false;
        }
        let hit = |keyword: &&str| {
            if self.case_sensitive {
                haystack.contains(*keyword)
            } else {
                haystack.contains(&keyword.to_lowercase())
            }
        };
        match self.match_mode {
            MatchMode::All => group.iter().all(hit),
            MatchMode::Any => group.iter().any(hit),
        }
    }
}

/// Ordered route list plus the fallback. Declaration order is significant
/// configuration: ties go to the earlier route, not the more specific one.
pub struct Router {
    routes: Vec<Route>,
    default: DefaultRoute,
}

impl Router {
    pub fn new(routes: Vec<Route>, default: DefaultRoute) -> Self {
        Self { routes, default }
    }

    pub fn default_route(&self) -> &DefaultRoute {
        &self.default
    }

    /// First route whose rule matches `text`, or `(None, true)` when the
    /// caller must fall back to the default route.
    pub fn pick(&self, text: &str) -> (Option<&Route>, bool) {
        for route in &self.routes {
            if route.matches(text) {
                return (Some(route), false);
            }
        }
        (None, true)
    }
}
