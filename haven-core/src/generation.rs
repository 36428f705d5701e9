//! Cache generations and the version registry.
//!
//! A tier name encodes its logical kind and a version tag, e.g. `static-v1`.
//! Exactly one generation per kind is current; every other tier is stale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// Pre-populated at install time from the asset manifest
    Static,
    /// Filled opportunistically by the fetch interceptor
    Dynamic,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Static => "static",
            TierKind::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierKind {
    type Err = GenerationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(TierKind::Static),
            "dynamic" => Ok(TierKind::Dynamic),
            _ => Err(GenerationParseError(s.to_string())),
        }
    }
}

/// Version-tagged logical tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheGeneration {
    pub kind: TierKind,
    pub version: String,
}

impl CacheGeneration {
    pub fn new(kind: TierKind, version: impl Into<String>) -> Self {
        Self {
            kind,
            version: version.into(),
        }
    }

    /// Tier name used in the store.
    pub fn name(&self) -> String {
        format!("{}-{}", self.kind, self.version)
    }

    /// Parse a tier name. Names not shaped `<kind>-<version>` yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

impl fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.version)
    }
}

impl FromStr for CacheGeneration {
    type Err = GenerationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, version) = s
            .split_once('-')
            .ok_or_else(|| GenerationParseError(s.to_string()))?;
        if version.is_empty() {
            return Err(GenerationParseError(s.to_string()));
        }
        let kind = kind
            .parse::<TierKind>()
            .map_err(|_| GenerationParseError(s.to_string()))?;
        Ok(CacheGeneration::new(kind, version))
    }
}

/// Error when parsing a tier name that is not a cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParseError(pub String);

impl fmt::Display for GenerationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid cache generation: {}", self.0)
    }
}

impl std::error::Error for GenerationParseError {}

/// The current static and dynamic generations.
///
/// Passed into the lifecycle controller and interceptor at construction so
/// several agent configurations can coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRegistry {
    pub static_generation: CacheGeneration,
    pub dynamic_generation: CacheGeneration,
}

impl VersionRegistry {
    /// Both tiers share one version tag.
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            static_generation: CacheGeneration::new(TierKind::Static, version.clone()),
            dynamic_generation: CacheGeneration::new(TierKind::Dynamic, version),
        }
    }

    pub fn with_generations(
        static_generation: CacheGeneration,
        dynamic_generation: CacheGeneration,
    ) -> Self {
        Self {
            static_generation,
            dynamic_generation,
        }
    }

    pub fn static_name(&self) -> String {
        self.static_generation.name()
    }

    pub fn dynamic_name(&self) -> String {
        self.dynamic_generation.name()
    }

    pub fn current(&self, kind: TierKind) -> &CacheGeneration {
        match kind {
            TierKind::Static => &self.static_generation,
            TierKind::Dynamic => &self.dynamic_generation,
        }
    }

    /// Names of the tiers that survive activation.
    pub fn current_names(&self) -> [String; 2] {
        [self.static_name(), self.dynamic_name()]
    }

    pub fn is_current(&self, tier_name: &str) -> bool {
        self.current_names().iter().any(|name| name == tier_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generation_name() {
        let generation = CacheGeneration::new(TierKind::Static, "v1");
        assert_eq!(generation.name(), "static-v1");
        assert_eq!(generation.to_string(), "static-v1");
    }

    #[test]
    fn test_parse_keeps_dashes_in_version() {
        let generation = CacheGeneration::parse("dynamic-v1.0.0-beta").unwrap();
        assert_eq!(generation.kind, TierKind::Dynamic);
        assert_eq!(generation.version, "v1.0.0-beta");
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(CacheGeneration::parse("advanced-html-v1.0.0").is_none());
        assert!(CacheGeneration::parse("static").is_none());
        assert!(CacheGeneration::parse("static-").is_none());
        assert!(CacheGeneration::parse("").is_none());
    }

    #[test]
    fn test_registry_current_names() {
        let registry = VersionRegistry::new("v1");
        assert_eq!(registry.current_names(), ["static-v1", "dynamic-v1"]);
        assert!(registry.is_current("static-v1"));
        assert!(registry.is_current("dynamic-v1"));
        assert!(!registry.is_current("static-v0"));
        assert!(!registry.is_current("v1"));
    }

    #[test]
    fn test_registry_independent_versions() {
        let registry = VersionRegistry::with_generations(
            CacheGeneration::new(TierKind::Static, "v3"),
            CacheGeneration::new(TierKind::Dynamic, "v2"),
        );
        assert_eq!(registry.current(TierKind::Static).name(), "static-v3");
        assert_eq!(registry.current(TierKind::Dynamic).name(), "dynamic-v2");
    }

    proptest! {
        #[test]
        fn prop_generation_name_parses_back(version in "v[0-9a-z.\\-]{1,12}") {
            for kind in [TierKind::Static, TierKind::Dynamic] {
                let generation = CacheGeneration::new(kind, version.clone());
                prop_assert_eq!(CacheGeneration::parse(&generation.name()), Some(generation));
            }
        }
    }
}
