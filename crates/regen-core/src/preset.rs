//! Regeneration presets: which material regenerates into what, after how long,
//! and who is allowed to trigger it.
//!
//! Presets are built once from the config file into a [`PresetRegistry`]. The
//! scheduler only ever sees them through the read-only [`PresetResolver`]
//! lookup.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use regen_config::{DelayConfig, PresetConfig};
use thiserror::Error;
use tracing::warn;

use crate::material::MaterialId;

// ---------------------------------------------------------------------------
// Replacement pool
// ---------------------------------------------------------------------------

/// Weighted set of materials a block may regenerate into.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReplacementPool {
    entries: Vec<(MaterialId, u32)>,
}

impl ReplacementPool {
    /// Creates a pool from `(material, weight)` pairs.
    pub fn new(entries: Vec<(MaterialId, u32)>) -> Self {
        Self { entries }
    }

    /// A pool that always yields `material`.
    pub fn single(material: MaterialId) -> Self {
        Self {
            entries: vec![(material, 1)],
        }
    }

    /// Picks a material proportionally to its weight.
    ///
    /// Returns `None` when the pool is empty or every weight is zero.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<MaterialId> {
        let total: u64 = self.entries.iter().map(|(_, w)| u64::from(*w)).sum();
        if total == 0 {
            return None;
        }

        let mut roll = rng.random_range(0..total);
        for (material, weight) in &self.entries {
            let weight = u64::from(*weight);
            if roll < weight {
                return Some(material.clone());
            }
            roll -= weight;
        }
        None
    }

    /// Returns `true` if no entry can ever be picked.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, w)| *w == 0)
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Inclusive regeneration delay range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Creates a range, swapping the bounds if given in the wrong order.
    pub fn new(a: Duration, b: Duration) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// A range that always yields `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    /// Samples a delay uniformly within the range, at millisecond resolution.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.random_range(min..=max))
    }
}

impl From<DelayConfig> for DelayRange {
    fn from(config: DelayConfig) -> Self {
        Self::new(
            Duration::from_secs(config.min_secs),
            Duration::from_secs(config.max_secs),
        )
    }
}

// ---------------------------------------------------------------------------
// Actor and conditions
// ---------------------------------------------------------------------------

/// Identity of a player or operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

/// What the acting player brings to a block break.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Actor {
    /// Player identity.
    pub id: Option<ActorId>,
    /// Material of the item in the main hand (`None` for an empty hand).
    pub tool: Option<MaterialId>,
    /// Enchantments on the held item, by upper-case name.
    pub enchants: HashMap<String, u32>,
    /// Job levels, by job name.
    pub jobs: HashMap<String, u32>,
}

/// Why an actor does not meet a preset's requirements.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConditionFailure {
    /// None of the listed tools is held.
    #[error("requires one of these tools: {0}")]
    ToolRequired(String),
    /// None of the listed enchantments is present at the required level.
    #[error("requires one of these enchantments: {0}")]
    EnchantRequired(String),
    /// None of the listed jobs is at the required level.
    #[error("requires one of these jobs: {0}")]
    JobRequired(String),
}

/// Tool, enchantment and job requirements of a preset.
///
/// Each list passes when empty or when any single entry is satisfied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PresetConditions {
    tools_required: Vec<MaterialId>,
    enchants_required: Vec<(String, u32)>,
    jobs_required: Vec<(String, u32)>,
}

impl PresetConditions {
    /// Parses the three textual requirement lists.
    ///
    /// Entries are separated by commas; enchantments and jobs take an optional
    /// `;level` suffix defaulting to 1. Malformed entries are skipped with a
    /// warning.
    pub fn parse(tools: &str, enchants: &str, jobs: &str) -> Self {
        Self {
            tools_required: split_list(tools).map(MaterialId::new).collect(),
            enchants_required: split_list(enchants)
                .filter_map(|entry| parse_leveled(entry, "enchantment"))
                .map(|(name, level)| (name.to_uppercase(), level))
                .collect(),
            jobs_required: split_list(jobs)
                .filter_map(|entry| parse_leveled(entry, "job"))
                .collect(),
        }
    }

    /// Returns `true` if no requirement is configured.
    pub fn is_empty(&self) -> bool {
        self.tools_required.is_empty()
            && self.enchants_required.is_empty()
            && self.jobs_required.is_empty()
    }

    /// Checks tools, then enchantments, then jobs.
    pub fn check(&self, actor: &Actor) -> Result<(), ConditionFailure> {
        self.check_tools(actor)?;
        self.check_enchants(actor)?;
        self.check_jobs(actor)
    }

    fn check_tools(&self, actor: &Actor) -> Result<(), ConditionFailure> {
        if self.tools_required.is_empty() {
            return Ok(());
        }
        let held = actor.tool.as_ref();
        if self.tools_required.iter().any(|tool| Some(tool) == held) {
            return Ok(());
        }
        let names: Vec<String> = self
            .tools_required
            .iter()
            .map(|t| t.as_str().replace('_', " ").to_lowercase())
            .collect();
        Err(ConditionFailure::ToolRequired(names.join(", ")))
    }

    fn check_enchants(&self, actor: &Actor) -> Result<(), ConditionFailure> {
        if self.enchants_required.is_empty() {
            return Ok(());
        }
        let empty_hand = actor.tool.as_ref().is_none_or(MaterialId::is_air);
        if !empty_hand && meets_any(&self.enchants_required, &actor.enchants) {
            return Ok(());
        }
        Err(ConditionFailure::EnchantRequired(describe_leveled(
            &self.enchants_required,
        )))
    }

    fn check_jobs(&self, actor: &Actor) -> Result<(), ConditionFailure> {
        if self.jobs_required.is_empty() || meets_any(&self.jobs_required, &actor.jobs) {
            return Ok(());
        }
        Err(ConditionFailure::JobRequired(describe_leveled(
            &self.jobs_required,
        )))
    }
}

fn split_list(input: &str) -> impl Iterator<Item = &str> {
    input.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_leveled(entry: &str, kind: &str) -> Option<(String, u32)> {
    let (name, level) = match entry.split_once(';') {
        Some((name, level)) => match level.trim().parse::<u32>() {
            Ok(level) => (name.trim(), level),
            Err(_) => {
                warn!(entry, kind, "could not parse requirement level");
                return None;
            }
        },
        None => (entry, 1),
    };
    if name.is_empty() {
        warn!(entry, kind, "requirement without a name");
        return None;
    }
    Some((name.to_string(), level))
}

fn meets_any(required: &[(String, u32)], held: &HashMap<String, u32>) -> bool {
    required
        .iter()
        .any(|(name, level)| held.get(name).is_some_and(|have| have >= level))
}

fn describe_leveled(required: &[(String, u32)]) -> String {
    required
        .iter()
        .map(|(name, level)| format!("{name} ({level})"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Preset and registry
// ---------------------------------------------------------------------------

/// A named regeneration rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    /// Unique name, stored in persisted tasks.
    pub name: String,
    /// Material whose breaking triggers this preset.
    pub target: MaterialId,
    /// Placeholder placed while waiting.
    pub replace_with: MaterialId,
    /// What the block comes back as.
    pub regenerate_into: ReplacementPool,
    /// How long it takes.
    pub delay: DelayRange,
    /// Who may trigger it.
    pub conditions: PresetConditions,
}

impl From<&PresetConfig> for Preset {
    fn from(config: &PresetConfig) -> Self {
        Self {
            name: config.name.clone(),
            target: MaterialId::new(&config.target_material),
            replace_with: MaterialId::new(&config.replace_with),
            regenerate_into: ReplacementPool::new(
                config
                    .regenerate_into
                    .iter()
                    .map(|w| (MaterialId::new(&w.material), w.weight))
                    .collect(),
            ),
            delay: config.delay.into(),
            conditions: PresetConditions::parse(
                &config.tools_required,
                &config.enchants_required,
                &config.jobs_required,
            ),
        }
    }
}

/// Read-only preset lookup consumed by the scheduler.
pub trait PresetResolver {
    /// Returns the preset with the given name.
    fn resolve_preset(&self, name: &str) -> Option<&Preset>;
}

/// Ordered collection of presets with lookup by name and by target material.
#[derive(Debug, Default)]
pub struct PresetRegistry {
    presets: Vec<Preset>,
    by_name: HashMap<String, usize>,
}

impl PresetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from config entries. A later entry with a duplicate
    /// name is skipped.
    pub fn from_config(configs: &[PresetConfig]) -> Self {
        let mut registry = Self::new();
        for config in configs {
            if !registry.insert(Preset::from(config)) {
                warn!(preset = %config.name, "duplicate preset name, skipping");
            }
        }
        registry
    }

    /// Adds a preset. Returns `false` if the name is already taken.
    pub fn insert(&mut self, preset: Preset) -> bool {
        if self.by_name.contains_key(&preset.name) {
            return false;
        }
        self.by_name.insert(preset.name.clone(), self.presets.len());
        self.presets.push(preset);
        true
    }

    /// The first preset targeting `material`.
    pub fn for_material(&self, material: &MaterialId) -> Option<&Preset> {
        self.presets.iter().find(|p| &p.target == material)
    }

    /// Number of presets.
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// Returns `true` if there are no presets.
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl PresetResolver for PresetRegistry {
    fn resolve_preset(&self, name: &str) -> Option<&Preset> {
        self.by_name.get(name).map(|&i| &self.presets[i])
    }
}
