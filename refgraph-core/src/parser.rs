//! Reference extraction from issue and comment text
//!
//! Recognizes three addressing forms, optionally preceded by a taxonomy
//! prefix phrase and `": "` or `" "`:
//!
//! - short: `owner/repo#123`
//! - local: `#123` (owner and repo come from the document being parsed)
//! - url: `https://github.com/owner/repo/issues/123` or `.../pull/123`
//!
//! ```text
//! requires #12
//! superseded by: https://github.com/owner/repo/pull/34
//! ```

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex, RegexBuilder};
use serde::Serialize;
use tracing::trace;

use crate::taxonomy::{ReferenceType, Taxonomy};
use crate::{Error, Identity, Result};

const URL_PATTERN: &str = r"https://github\.com/(?P<url_owner>[-a-zA-Z0-9_]+)/(?P<url_repo>[-a-zA-Z0-9_]+)/(?:issues|pull)/(?P<url_number>\d+)";
const SHORT_PATTERN: &str = r"(?P<short_owner>[-a-zA-Z0-9_]+)/(?P<short_repo>[-a-zA-Z0-9_]+)#(?P<short_number>\d+)";
const LOCAL_PATTERN: &str = r"#(?P<local_number>\d+)";

static SEED_URL_RE: LazyLock<Regex> = LazyLock::new(|| match Regex::new(URL_PATTERN) {
    Ok(re) => re,
    Err(_) => unreachable!("static regex pattern"),
});

/// Parse an issue or pull request URL into an identity
///
/// Only the url form is accepted; prefixes and aliases play no part.
pub fn parse_github_url(url: &str) -> Result<Identity> {
    let caps = SEED_URL_RE
        .captures(url.trim())
        .ok_or_else(|| Error::MalformedUrl(url.to_string()))?;

    let number = caps["url_number"]
        .parse::<u64>()
        .map_err(|_| Error::MalformedUrl(url.to_string()))?;

    Identity::new(&caps["url_owner"], &caps["url_repo"], number)
        .map_err(|_| Error::MalformedUrl(url.to_string()))
}

/// A typed, directed edge found in text
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    /// Terminal type after alias resolution
    pub reference_type: Arc<ReferenceType>,
    /// Edge origin (possibly swapped relative to the text)
    pub source: Identity,
    /// Edge destination (possibly swapped relative to the text)
    pub target: Identity,
    /// The matched span
    pub text: String,
    /// Whether source and target were swapped during resolution
    pub reversed: bool,
}

impl Reference {
    /// The identity written in the text
    pub fn mentioned(&self) -> &Identity {
        if self.reversed {
            &self.source
        } else {
            &self.target
        }
    }

    /// Whether the resolved type asks for its targets to be crawled
    pub fn follow(&self) -> bool {
        self.reference_type.follow
    }
}

/// Compiled reference matcher for one taxonomy
#[derive(Debug, Clone)]
pub struct ReferenceParser {
    taxonomy: Arc<Taxonomy>,
    regex: Regex,
}

impl ReferenceParser {
    /// Compile the reference pattern for a taxonomy
    pub fn new(taxonomy: Arc<Taxonomy>) -> Result<Self> {
        // Longest first, so "depends on" wins over "depends"
        let mut prefixes: Vec<&str> = taxonomy.prefixes().collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let prefix_group = if prefixes.is_empty() {
            String::new()
        } else {
            let alternation = prefixes
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            format!("(?:(?P<prefix>{}):? )?", alternation)
        };

        let pattern = format!(
            "{}(?:(?P<short>{})|(?P<local>{})|(?P<url>{}))",
            prefix_group, SHORT_PATTERN, LOCAL_PATTERN, URL_PATTERN
        );

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Taxonomy(format!("Failed to compile reference pattern: {}", e)))?;

        Ok(Self { taxonomy, regex })
    }

    /// Parser over the built-in taxonomy
    pub fn builtin() -> Result<Self> {
        Self::new(Arc::new(Taxonomy::builtin()))
    }

    /// The taxonomy this parser was compiled from
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Extract every reference in `text`, in order of appearance
    ///
    /// Duplicate mentions produce duplicate references.
    pub fn get_references(&self, source: &Identity, text: &str) -> Vec<Reference> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| self.reference_from(source, &caps))
            .collect()
    }

    fn reference_from(&self, source: &Identity, caps: &Captures<'_>) -> Option<Reference> {
        let target = target_from(source, caps)?;

        let prefix = caps.name("prefix").map(|m| m.as_str());
        let Some(reference_type) = self.taxonomy.lookup_prefix(prefix) else {
            trace!(?prefix, "Discarding match with unregistered prefix");
            return None;
        };
        let resolution = self.taxonomy.resolve(reference_type)?;

        let (source, target) = if resolution.reverse {
            (target, source.clone())
        } else {
            (source.clone(), target)
        };

        Some(Reference {
            reference_type: resolution.reference_type,
            source,
            target,
            text: caps[0].to_string(),
            reversed: resolution.reverse,
        })
    }
}

fn target_from(source: &Identity, caps: &Captures<'_>) -> Option<Identity> {
    let (owner, repo, number) = if caps.name("short").is_some() {
        (&caps["short_owner"], &caps["short_repo"], &caps["short_number"])
    } else if caps.name("local").is_some() {
        (source.owner.as_str(), source.repo.as_str(), &caps["local_number"])
    } else {
        (&caps["url_owner"], &caps["url_repo"], &caps["url_number"])
    };

    let number = number.parse::<u64>().ok()?;
    Identity::new(owner, repo, number).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{Alias, ReferenceTypeConfig, TaxonomyConfig};

    fn id(owner: &str, repo: &str, number: u64) -> Identity {
        Identity::new(owner, repo, number).unwrap()
    }

    fn parser() -> ReferenceParser {
        ReferenceParser::builtin().unwrap()
    }

    #[test]
    fn test_local_reference() {
        let refs = parser().get_references(&id("a", "b", 1), "fixes #42");
        assert_eq!(refs.len(), 1);
        let r = &refs[0];
        assert_eq!(r.reference_type.id, "requires");
        assert_eq!(r.mentioned(), &id("a", "b", 42));
        // fixes is a reversed alias of requires
        assert_eq!(r.source, id("a", "b", 42));
        assert_eq!(r.target, id("a", "b", 1));
        assert!(r.reversed);
    }

    #[test]
    fn test_short_reference() {
        let refs = parser().get_references(&id("a", "b", 1), "depends on foo/bar#7");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].reference_type.id, "requires");
        assert_eq!(refs[0].source, id("a", "b", 1));
        assert_eq!(refs[0].target, id("foo", "bar", 7));
        assert_eq!(refs[0].text, "depends on foo/bar#7");
    }

    #[test]
    fn test_url_reference_uses_default_type() {
        let refs = parser().get_references(&id("a", "b", 1), "https://github.com/x/y/pull/9");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].reference_type.id, "refers");
        assert!(!refs[0].follow());
        assert_eq!(refs[0].target, id("x", "y", 9));
    }

    #[test]
    fn test_colon_separator_and_case() {
        let refs = parser().get_references(
            &id("a", "b", 1),
            "Superseded By: https://github.com/o/r/issues/3",
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].reference_type.id, "requires");
        assert!(!refs[0].reversed);
        assert_eq!(refs[0].target, id("o", "r", 3));
    }

    #[test]
    fn test_multiple_matches_in_order() {
        let text = "Needs #2 and #3, see also other/repo#4.\nCloses #5";
        let refs = parser().get_references(&id("a", "b", 1), text);
        let mentioned: Vec<String> = refs.iter().map(|r| r.mentioned().key()).collect();
        assert_eq!(mentioned, vec!["a/b#2", "a/b#3", "other/repo#4", "a/b#5"]);
        assert_eq!(refs[0].reference_type.id, "requires");
        assert_eq!(refs[1].reference_type.id, "refers");
        assert!(refs[3].reversed);
    }

    #[test]
    fn test_duplicate_mentions_not_merged() {
        let refs = parser().get_references(&id("a", "b", 1), "#2 #2");
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn test_zero_and_overflow_discarded() {
        let refs = parser().get_references(
            &id("a", "b", 1),
            "#0 and #99999999999999999999999 and #5",
        );
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target.number, 5);
    }

    #[test]
    fn test_no_references() {
        assert!(parser().get_references(&id("a", "b", 1), "nothing to see").is_empty());
    }

    #[test]
    fn test_prefix_with_regex_metacharacters() {
        let cfg = TaxonomyConfig {
            default: "plain".to_string(),
            types: [
                ("plain".to_string(), ReferenceTypeConfig::default()),
                (
                    "weird".to_string(),
                    ReferenceTypeConfig {
                        prefixes: vec!["a.b (c)".to_string()],
                        ..Default::default()
                    },
                ),
            ]
            .into_iter()
            .collect(),
        };
        let parser = ReferenceParser::new(Arc::new(Taxonomy::new(cfg).unwrap())).unwrap();

        let refs = parser.get_references(&id("a", "b", 1), "a.b (c) #4 axb (c) #5");
        assert_eq!(refs[0].reference_type.id, "weird");
        assert_eq!(refs[1].reference_type.id, "plain");
    }

    #[test]
    fn test_double_reversal_restores_direction() {
        let cfg = TaxonomyConfig {
            default: "base".to_string(),
            types: [
                ("base".to_string(), ReferenceTypeConfig::default()),
                (
                    "flip".to_string(),
                    ReferenceTypeConfig {
                        alias: Some(Alias::reversed("base")),
                        ..Default::default()
                    },
                ),
                (
                    "flop".to_string(),
                    ReferenceTypeConfig {
                        prefixes: vec!["flop".to_string()],
                        alias: Some(Alias::reversed("flip")),
                        ..Default::default()
                    },
                ),
            ]
            .into_iter()
            .collect(),
        };
        let parser = ReferenceParser::new(Arc::new(Taxonomy::new(cfg).unwrap())).unwrap();

        let refs = parser.get_references(&id("a", "b", 1), "flop #2");
        assert_eq!(refs[0].reference_type.id, "base");
        assert!(!refs[0].reversed);
        assert_eq!(refs[0].source, id("a", "b", 1));
        assert_eq!(refs[0].target, id("a", "b", 2));
    }

    #[test]
    fn test_parse_github_url() {
        let issue = parse_github_url("https://github.com/o/r/issues/1").unwrap();
        assert_eq!(issue, id("o", "r", 1));

        let pull = parse_github_url("https://github.com/rust-lang/rust/pull/12345").unwrap();
        assert_eq!(pull, id("rust-lang", "rust", 12345));
    }

    #[test]
    fn test_parse_github_url_malformed() {
        for url in [
            "",
            "o/r#1",
            "https://github.com/o/r",
            "https://gitlab.com/o/r/issues/1",
            "https://github.com/o/r/issues/0",
        ] {
            let err = parse_github_url(url).unwrap_err();
            assert!(matches!(err, Error::MalformedUrl(_)), "{}: {:?}", url, err);
        }
    }
}
