//! Tier ladder
//!
//! The host describes its tiers as a catalog of name-linked definitions
//! (`next` names the following tier). [`TierChain::build`] resolves the
//! links by name into a dense, ordered chain. The chain is never patched:
//! any catalog change produces a fresh chain, since external catalogs can
//! insert tiers anywhere and ordinals shift.
//!
//! # Critical Invariants
//!
//! 1. Exactly one root (a tier nobody links to)
//! 2. Every link resolves to a known tier, no tier is linked twice
//! 3. Following `next` from the root visits every tier exactly once
//! 4. `tiers[i].ordinal == i`

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One catalog entry as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierDefinition {
    /// Stable tier name (lookup key)
    pub name: String,

    /// Name of the following tier, `None` for the terminal tier
    #[serde(default)]
    pub next: Option<String>,

    /// Probability that a transition landing on this tier keeps going to
    /// the next one (weighted branching chains). 0.0 = always stop here.
    #[serde(default)]
    pub continue_probability: f64,
}

impl TierDefinition {
    pub fn new(name: &str, next: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            next: next.map(str::to_string),
            continue_probability: 0.0,
        }
    }

    pub fn with_continue_probability(mut self, p: f64) -> Self {
        self.continue_probability = p;
        self
    }
}

/// External tier catalog, in any order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierCatalog {
    pub tiers: Vec<TierDefinition>,
}

impl TierCatalog {
    pub fn new(tiers: Vec<TierDefinition>) -> Self {
        Self { tiers }
    }

    /// Linear catalog from an ordered list of names
    ///
    /// ```
    /// use tier_ladder_engine::models::TierCatalog;
    ///
    /// let catalog = TierCatalog::linear(&["normal", "uncommon", "rare"]);
    /// assert_eq!(catalog.tiers[0].next.as_deref(), Some("uncommon"));
    /// assert_eq!(catalog.tiers[2].next, None);
    /// ```
    pub fn linear(names: &[&str]) -> Self {
        let tiers = names
            .iter()
            .enumerate()
            .map(|(i, name)| TierDefinition::new(name, names.get(i + 1).copied()))
            .collect();
        Self { tiers }
    }
}

/// Resolved tier node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub ordinal: usize,
    pub continue_probability: f64,
    /// `(1 + cost_scaling_factor)^ordinal`
    pub cost_multiplier: f64,
}

/// Ordered tier ladder built wholesale from a [`TierCatalog`]
#[derive(Debug, Clone)]
pub struct TierChain {
    tiers: Vec<Tier>,
    by_name: HashMap<String, usize>,
    weighted: bool,
}

impl TierChain {
    /// Resolve a catalog into a chain
    ///
    /// # Errors
    ///
    /// `EngineError::ConfigInconsistency` when the catalog is empty, has
    /// duplicate names, dangling or shared links, several roots, a cycle,
    /// unreachable tiers, or a continue probability outside `[0, 1]`.
    ///
    /// # Example
    ///
    /// ```
    /// use tier_ladder_engine::models::{TierCatalog, TierChain};
    ///
    /// let chain = TierChain::build(&TierCatalog::linear(&["a", "b", "c"]), 0.5).unwrap();
    /// assert_eq!(chain.len(), 3);
    /// assert_eq!(chain.terminal(), 2);
    /// assert_eq!(chain.tier(1).unwrap().cost_multiplier, 1.5);
    /// ```
    pub fn build(catalog: &TierCatalog, cost_scaling_factor: f64) -> Result<Self, EngineError> {
        let defs = &catalog.tiers;
        if defs.is_empty() {
            return Err(EngineError::ConfigInconsistency(
                "tier catalog is empty".to_string(),
            ));
        }

        let mut by_def: HashMap<&str, &TierDefinition> = HashMap::with_capacity(defs.len());
        for def in defs {
            if !(0.0..=1.0).contains(&def.continue_probability) {
                return Err(EngineError::ConfigInconsistency(format!(
                    "tier '{}' has continue probability {} outside [0, 1]",
                    def.name, def.continue_probability
                )));
            }
            if by_def.insert(def.name.as_str(), def).is_some() {
                return Err(EngineError::ConfigInconsistency(format!(
                    "duplicate tier name '{}'",
                    def.name
                )));
            }
        }

        // Each tier may be the `next` of at most one other tier
        let mut linked: HashSet<&str> = HashSet::with_capacity(defs.len());
        for def in defs {
            if let Some(next) = def.next.as_deref() {
                if !by_def.contains_key(next) {
                    return Err(EngineError::ConfigInconsistency(format!(
                        "tier '{}' links to unknown tier '{}'",
                        def.name, next
                    )));
                }
                if !linked.insert(next) {
                    return Err(EngineError::ConfigInconsistency(format!(
                        "tier '{}' is the next tier of more than one tier",
                        next
                    )));
                }
            }
        }

        let roots: Vec<&TierDefinition> = defs
            .iter()
            .filter(|d| !linked.contains(d.name.as_str()))
            .collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => {
                return Err(EngineError::ConfigInconsistency(
                    "tier catalog has no root tier (links form a cycle)".to_string(),
                ))
            }
            many => {
                let names: Vec<&str> = many.iter().map(|d| d.name.as_str()).collect();
                return Err(EngineError::ConfigInconsistency(format!(
                    "tier catalog has several root tiers: {}",
                    names.join(", ")
                )));
            }
        };

        let mut tiers = Vec::with_capacity(defs.len());
        let mut by_name = HashMap::with_capacity(defs.len());
        let mut current = Some(root);
        while let Some(def) = current {
            if by_name.contains_key(&def.name) {
                return Err(EngineError::ConfigInconsistency(format!(
                    "tier chain loops back to '{}'",
                    def.name
                )));
            }
            let ordinal = tiers.len();
            by_name.insert(def.name.clone(), ordinal);
            tiers.push(Tier {
                name: def.name.clone(),
                ordinal,
                continue_probability: def.continue_probability,
                cost_multiplier: (1.0 + cost_scaling_factor).powi(ordinal as i32),
            });
            current = def.next.as_deref().and_then(|n| by_def.get(n).copied());
        }

        if tiers.len() != defs.len() {
            let unreachable: Vec<&str> = defs
                .iter()
                .map(|d| d.name.as_str())
                .filter(|n| !by_name.contains_key(*n))
                .collect();
            return Err(EngineError::ConfigInconsistency(format!(
                "tiers unreachable from root '{}': {}",
                root.name,
                unreachable.join(", ")
            )));
        }

        // The root's own continue probability never matters: nothing lands on it
        let weighted = tiers.iter().skip(1).any(|t| t.continue_probability > 0.0);

        Ok(Self {
            tiers,
            by_name,
            weighted,
        })
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tier(&self, ordinal: usize) -> Option<&Tier> {
        self.tiers.get(ordinal)
    }

    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Ordinal of the last tier
    pub fn terminal(&self) -> usize {
        self.tiers.len() - 1
    }

    pub fn is_terminal(&self, ordinal: usize) -> bool {
        ordinal >= self.terminal()
    }

    /// True if any reachable tier can pass a transition onward
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }

    /// Name of the tier at `ordinal`, or `"?"` for out-of-range ordinals
    pub fn name_of(&self, ordinal: usize) -> &str {
        self.tiers.get(ordinal).map_or("?", |t| t.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_inconsistent(catalog: TierCatalog, needle: &str) {
        match TierChain::build(&catalog, 0.0) {
            Err(EngineError::ConfigInconsistency(msg)) => {
                assert!(msg.contains(needle), "unexpected message: {}", msg)
            }
            other => panic!("expected ConfigInconsistency, got {:?}", other),
        }
    }

    #[test]
    fn test_build_resolves_links_by_name_in_any_order() {
        let catalog = TierCatalog::new(vec![
            TierDefinition::new("rare", Some("epic")),
            TierDefinition::new("epic", None),
            TierDefinition::new("normal", Some("uncommon")),
            TierDefinition::new("uncommon", Some("rare")),
        ]);
        let chain = TierChain::build(&catalog, 0.0).unwrap();

        let names: Vec<&str> = chain.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["normal", "uncommon", "rare", "epic"]);
        assert_eq!(chain.ordinal_of("rare"), Some(2));
        assert!(chain.is_terminal(3));
        assert!(!chain.is_weighted());
    }

    #[test]
    fn test_cost_multiplier_flat_when_scaling_zero() {
        let chain = TierChain::build(&TierCatalog::linear(&["a", "b", "c"]), 0.0).unwrap();
        assert!(chain.iter().all(|t| t.cost_multiplier == 1.0));
    }

    #[test]
    fn test_weighted_ignores_root_probability() {
        let catalog = TierCatalog::new(vec![
            TierDefinition::new("a", Some("b")).with_continue_probability(0.7),
            TierDefinition::new("b", None),
        ]);
        assert!(!TierChain::build(&catalog, 0.0).unwrap().is_weighted());
    }

    #[test]
    fn test_empty_catalog_rejected() {
        assert_inconsistent(TierCatalog::default(), "empty");
    }

    #[test]
    fn test_dangling_link_rejected() {
        assert_inconsistent(
            TierCatalog::new(vec![TierDefinition::new("a", Some("missing"))]),
            "unknown tier 'missing'",
        );
    }

    #[test]
    fn test_cycle_rejected() {
        assert_inconsistent(
            TierCatalog::new(vec![
                TierDefinition::new("a", Some("b")),
                TierDefinition::new("b", Some("a")),
            ]),
            "cycle",
        );
    }

    #[test]
    fn test_detached_loop_reported_unreachable() {
        assert_inconsistent(
            TierCatalog::new(vec![
                TierDefinition::new("root", None),
                TierDefinition::new("x", Some("y")),
                TierDefinition::new("y", Some("x")),
            ]),
            "unreachable",
        );
    }

    #[test]
    fn test_several_roots_rejected() {
        assert_inconsistent(
            TierCatalog::new(vec![
                TierDefinition::new("a", None),
                TierDefinition::new("b", None),
            ]),
            "several root",
        );
    }

    #[test]
    fn test_shared_next_rejected() {
        assert_inconsistent(
            TierCatalog::new(vec![
                TierDefinition::new("a", Some("c")),
                TierDefinition::new("b", Some("c")),
                TierDefinition::new("c", None),
            ]),
            "more than one",
        );
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        assert_inconsistent(
            TierCatalog::new(vec![
                TierDefinition::new("a", Some("b")),
                TierDefinition::new("b", None).with_continue_probability(1.5),
            ]),
            "outside [0, 1]",
        );
    }
}
