//! Reference taxonomy: the named kinds of cross-reference text
//!
//! A taxonomy maps type names to trigger phrases ("prefixes") and optional
//! aliases. An alias delegates to another type and may reverse the edge
//! direction, so `fixes #12` can be recorded as "#12 requires this".
//!
//! Taxonomies are validated once when compiled: the default type must
//! exist, every alias must point at a known type, alias chains must not
//! loop, and a prefix may belong to only one type.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{Error, Result};

/// Alias from one reference type to another
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Alias {
    /// Name of the type this one delegates to
    pub id: String,
    /// Swap source and target when resolving through this alias
    #[serde(default)]
    pub reverse: bool,
}

impl Alias {
    /// Alias keeping the textual direction
    pub fn to(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reverse: false,
        }
    }

    /// Alias swapping source and target
    pub fn reversed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reverse: true,
        }
    }
}

/// One entry of a taxonomy file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReferenceTypeConfig {
    /// Trigger phrases, matched case-insensitively
    pub prefixes: Vec<String>,
    /// Delegate to another type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<Alias>,
    /// Whether references of this type are crawled (default true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow: Option<bool>,
    /// Presentation metadata, passed through untouched
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ReferenceTypeConfig {
    fn new(prefixes: &[&str]) -> Self {
        Self {
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    fn alias(mut self, alias: Alias) -> Self {
        self.alias = Some(alias);
        self
    }

    fn follow(mut self, follow: bool) -> Self {
        self.follow = Some(follow);
        self
    }

    fn edge(mut self, edge: Value) -> Self {
        self.metadata.insert("edge".to_string(), edge);
        self
    }
}

/// Uncompiled taxonomy, as read from TOML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TaxonomyConfig {
    /// Type used when a match has no prefix phrase
    pub default: String,
    /// Types by name
    pub types: BTreeMap<String, ReferenceTypeConfig>,
}

impl TaxonomyConfig {
    /// The built-in taxonomy
    pub fn builtin() -> Self {
        let requires = || Alias::reversed("requires");
        let mut types = BTreeMap::new();

        types.insert(
            "refers".to_string(),
            ReferenceTypeConfig::new(&["refers", "refer", "reference"])
                .follow(false)
                .edge(json!({ "color": { "color": "#848484", "opacity": 0.1 }, "length": 200 })),
        );
        types.insert(
            "requires".to_string(),
            ReferenceTypeConfig::new(&["requires", "depends on", "depends", "needs"])
                .edge(json!({ "color": "red", "length": 50 })),
        );
        types.insert(
            "required_by".to_string(),
            ReferenceTypeConfig::new(&["required by", "needed by"]).alias(requires()),
        );
        types.insert(
            "resolves".to_string(),
            ReferenceTypeConfig::new(&["resolve", "resolves", "resolved"]).alias(requires()),
        );
        types.insert(
            "closes".to_string(),
            ReferenceTypeConfig::new(&["close", "closes", "closed"]).alias(requires()),
        );
        types.insert(
            "fixes".to_string(),
            ReferenceTypeConfig::new(&["fixes", "fix", "fixed"]).alias(requires()),
        );
        types.insert(
            "part_of".to_string(),
            ReferenceTypeConfig::new(&["part of"]).alias(requires()),
        );
        types.insert(
            "superseded_by".to_string(),
            ReferenceTypeConfig::new(&["superseded by"]).alias(Alias::to("requires")),
        );
        types.insert(
            "blocked_by".to_string(),
            ReferenceTypeConfig::new(&["blocked by", "blocked on"]).alias(Alias::to("requires")),
        );

        Self {
            default: "refers".to_string(),
            types,
        }
    }

    /// Parse a taxonomy from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Taxonomy(format!("Failed to parse taxonomy: {}", e)))
    }

    /// Load a taxonomy file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_toml_str(&contents)
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A compiled reference type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceType {
    /// Type name
    pub id: String,
    /// Trigger phrases as configured
    pub prefixes: Vec<String>,
    /// Delegation, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<Alias>,
    /// Follow flag; alias types carry the flag of the type they resolve to
    pub follow: bool,
    /// Presentation metadata
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Terminal type reached through an alias chain
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Non-alias type at the end of the chain
    pub reference_type: Arc<ReferenceType>,
    /// True when the chain applied an odd number of reversals
    pub reverse: bool,
}

/// Immutable, validated taxonomy
#[derive(Debug, Clone)]
pub struct Taxonomy {
    types: HashMap<String, Arc<ReferenceType>>,
    default: Arc<ReferenceType>,
    /// lowercased prefix -> type name
    prefixes: HashMap<String, String>,
}

impl Taxonomy {
    /// Compile and validate a taxonomy
    pub fn new(config: TaxonomyConfig) -> Result<Self> {
        for (id, ty) in &config.types {
            if let Some(alias) = &ty.alias {
                if !config.types.contains_key(&alias.id) {
                    return Err(Error::Taxonomy(format!(
                        "alias of '{}' points to unknown type '{}'",
                        id, alias.id
                    )));
                }
            }
        }

        // Walk every chain once; the terminal type supplies the follow flag
        let mut follow_by_id = HashMap::new();
        for id in config.types.keys() {
            let terminal = terminal_of(&config.types, id)?;
            let follow = config.types[terminal].follow.unwrap_or(true);
            follow_by_id.insert(id.clone(), follow);
        }

        let mut prefixes: HashMap<String, String> = HashMap::new();
        for (id, ty) in &config.types {
            for prefix in ty.prefixes.iter().filter(|p| !p.is_empty()) {
                let key = prefix.to_lowercase();
                match prefixes.get(&key) {
                    Some(owner) if owner != id => {
                        return Err(Error::Taxonomy(format!(
                            "prefix '{}' is claimed by both '{}' and '{}'",
                            prefix, owner, id
                        )));
                    }
                    _ => {
                        prefixes.insert(key, id.clone());
                    }
                }
            }
        }

        let types: HashMap<String, Arc<ReferenceType>> = config
            .types
            .into_iter()
            .map(|(id, ty)| {
                let follow = follow_by_id[&id];
                let compiled = ReferenceType {
                    id: id.clone(),
                    prefixes: ty.prefixes,
                    alias: ty.alias,
                    follow,
                    metadata: ty.metadata,
                };
                (id, Arc::new(compiled))
            })
            .collect();

        let default = types.get(&config.default).cloned().ok_or_else(|| {
            Error::Taxonomy(format!("default type '{}' is not defined", config.default))
        })?;

        debug!(
            types = types.len(),
            prefixes = prefixes.len(),
            default = %default.id,
            "Compiled reference taxonomy"
        );

        Ok(Self {
            types,
            default,
            prefixes,
        })
    }

    /// The built-in taxonomy, compiled
    pub fn builtin() -> Self {
        match Self::new(TaxonomyConfig::builtin()) {
            Ok(taxonomy) => taxonomy,
            Err(e) => unreachable!("built-in taxonomy is valid: {}", e),
        }
    }

    /// Look up a type by name
    pub fn get(&self, id: &str) -> Option<&Arc<ReferenceType>> {
        self.types.get(id)
    }

    /// Type used for unprefixed matches
    pub fn default_type(&self) -> &Arc<ReferenceType> {
        &self.default
    }

    /// Type owning a matched prefix, or the default type when there is none
    pub fn lookup_prefix(&self, prefix: Option<&str>) -> Option<&Arc<ReferenceType>> {
        match prefix {
            None => Some(&self.default),
            Some(prefix) => self
                .prefixes
                .get(&prefix.to_lowercase())
                .and_then(|id| self.types.get(id)),
        }
    }

    /// All registered prefixes, lowercased
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.keys().map(String::as_str)
    }

    /// Follow aliases to a terminal type, toggling direction on each reversal
    ///
    /// Returns None if the chain leaves the taxonomy or exceeds its size.
    pub fn resolve(&self, reference_type: &Arc<ReferenceType>) -> Option<Resolution> {
        let mut current = Arc::clone(reference_type);
        let mut reverse = false;
        let mut steps = 0;

        while let Some(alias) = &current.alias {
            if steps >= self.types.len() {
                return None;
            }
            if alias.reverse {
                reverse = !reverse;
            }
            current = Arc::clone(self.types.get(&alias.id)?);
            steps += 1;
        }

        Some(Resolution {
            reference_type: current,
            reverse,
        })
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Name of the terminal type for `id`, rejecting cycles
fn terminal_of<'a>(
    types: &'a BTreeMap<String, ReferenceTypeConfig>,
    id: &'a str,
) -> Result<&'a str> {
    let mut seen = HashSet::new();
    let mut path = vec![id];
    let mut current = id;

    while let Some(alias) = types.get(current).and_then(|ty| ty.alias.as_ref()) {
        if !seen.insert(current) {
            return Err(Error::Taxonomy(format!("alias cycle: {}", path.join(" -> "))));
        }
        current = alias.id.as_str();
        path.push(current);
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(entries: Vec<(&str, ReferenceTypeConfig)>) -> TaxonomyConfig {
        TaxonomyConfig {
            default: entries[0].0.to_string(),
            types: entries
                .into_iter()
                .map(|(id, ty)| (id.to_string(), ty))
                .collect(),
        }
    }

    #[test]
    fn test_builtin_compiles() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(taxonomy.default_type().id, "refers");
        assert!(!taxonomy.default_type().follow);
        assert!(taxonomy.get("requires").unwrap().follow);
    }

    #[test]
    fn test_alias_inherits_follow() {
        let taxonomy = Taxonomy::new(config(vec![
            ("a", ReferenceTypeConfig::new(&["a"]).follow(false)),
            ("b", ReferenceTypeConfig::new(&["b"]).alias(Alias::to("a")).follow(true)),
        ]))
        .unwrap();

        assert!(!taxonomy.get("b").unwrap().follow);
    }

    #[test]
    fn test_every_builtin_type_resolves() {
        let taxonomy = Taxonomy::builtin();
        for id in TaxonomyConfig::builtin().types.keys() {
            let ty = taxonomy.get(id).unwrap();
            let resolved = taxonomy.resolve(ty).unwrap();
            assert!(resolved.reference_type.alias.is_none(), "{} did not terminate", id);
        }
    }

    #[test]
    fn test_reversal_parity() {
        let taxonomy = Taxonomy::new(config(vec![
            ("base", ReferenceTypeConfig::new(&["base"])),
            ("once", ReferenceTypeConfig::new(&["once"]).alias(Alias::reversed("base"))),
            ("twice", ReferenceTypeConfig::new(&["twice"]).alias(Alias::reversed("once"))),
            ("thrice", ReferenceTypeConfig::new(&["thrice"]).alias(Alias::reversed("twice"))),
        ]))
        .unwrap();

        let parity = |id: &str| taxonomy.resolve(taxonomy.get(id).unwrap()).unwrap().reverse;
        assert!(!parity("base"));
        assert!(parity("once"));
        assert!(!parity("twice"));
        assert!(parity("thrice"));
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let result = Taxonomy::new(config(vec![
            ("a", ReferenceTypeConfig::new(&["a"]).alias(Alias::to("b"))),
            ("b", ReferenceTypeConfig::new(&["b"]).alias(Alias::to("a"))),
        ]));

        let err = result.unwrap_err().to_string();
        assert!(err.contains("alias cycle"), "{}", err);
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let result = Taxonomy::new(config(vec![(
            "a",
            ReferenceTypeConfig::new(&["a"]).alias(Alias::to("missing")),
        )]));
        assert!(result.unwrap_err().to_string().contains("unknown type"));
    }

    #[test]
    fn test_unknown_default_rejected() {
        let mut cfg = config(vec![("a", ReferenceTypeConfig::new(&["a"]))]);
        cfg.default = "nope".to_string();
        assert!(Taxonomy::new(cfg).is_err());
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let result = Taxonomy::new(config(vec![
            ("a", ReferenceTypeConfig::new(&["Fix"])),
            ("b", ReferenceTypeConfig::new(&["fix"])),
        ]));
        assert!(result.unwrap_err().to_string().contains("claimed by both"));
    }

    #[test]
    fn test_lookup_prefix_case_insensitive() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(taxonomy.lookup_prefix(Some("Depends On")).unwrap().id, "requires");
        assert_eq!(taxonomy.lookup_prefix(None).unwrap().id, "refers");
        assert!(taxonomy.lookup_prefix(Some("unheard of")).is_none());
    }

    #[test]
    fn test_parse_toml_with_metadata() {
        let toml = r##"
default = "refers"

[types.refers]
prefixes = ["refers"]
follow = false

[types.refers.edge]
color = "#848484"

[types.fixes]
prefixes = ["fixes"]
alias = { id = "refers", reverse = true }
"##;
        let cfg = TaxonomyConfig::from_toml_str(toml).unwrap();
        let refers = &cfg.types["refers"];
        assert_eq!(refers.follow, Some(false));
        assert_eq!(refers.metadata["edge"]["color"], "#848484");
        assert_eq!(cfg.types["fixes"].alias, Some(Alias::reversed("refers")));

        let taxonomy = Taxonomy::new(cfg).unwrap();
        assert_eq!(taxonomy.get("refers").unwrap().metadata["edge"]["color"], "#848484");
    }
}
