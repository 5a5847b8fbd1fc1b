//! # Config Store
//!
//! Rarity tiers and blacklists, loaded from TOML:
//!
//! ```toml
//! [blacklist]
//! items = ["DIRT"]
//! droptables = ["junk_table"]
//!
//! [rare_drops.occasional]
//! min_chance = 0.10
//! max_chance = 0.20
//! message = "&9Occasional DROP! {item} &ex{amount} &f{chance}"
//! sound = "slayerdrop.occasional_drop"
//! ```
//!
//! ## Fallback Rules
//!
//! - Unreadable or unparsable source: built-in tiers, empty blacklists.
//! - No `rare_drops` section: the file's blacklists with built-in tiers.
//! - Empty `rare_drops` section: no tiers, so nothing is announced.
//! - Malformed tier: skipped with a warning.
//!
//! Tiers with equal `max_chance` keep the order they appear in the file.
//!
//! ## Snapshots
//!
//! [`ConfigStore`] hands out `Arc<DropConfig>` snapshots. A reload parses
//! the new config without holding the lock and swaps the pointer, so a reader
//! sees either the old config or the new one in full.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::{MagicFindError, MagicFindResult};
use crate::loot::DEFAULT_MAX_TABLE_DEPTH;
use crate::rarity::{Blacklist, RarityTable, RarityTier};

// ============================================================================
// File schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    blacklist: RawBlacklist,
    rare_drops: Option<RawTiers>,
}

/// `rare_drops` entries in document order.
#[derive(Debug, Default)]
struct RawTiers(Vec<(String, RawTier)>);

impl<'de> Deserialize<'de> for RawTiers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TiersVisitor;

        impl<'de> Visitor<'de> for TiersVisitor {
            type Value = RawTiers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of rarity tiers")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawTiers, A::Error> {
                let mut tiers = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, RawTier>()? {
                    tiers.push(entry);
                }
                Ok(RawTiers(tiers))
            }
        }

        deserializer.deserialize_map(TiersVisitor)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawBlacklist {
    #[serde(default)]
    items: Vec<String>,
    #[serde(default)]
    droptables: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawTier {
    enabled: bool,
    min_chance: f64,
    max_chance: f64,
    message: String,
    sound: String,
    volume: f32,
    pitch: f32,
    broadcast: bool,
}

impl Default for RawTier {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chance: 0.0,
            max_chance: 1.0,
            message: "{item} x{amount}".to_string(),
            sound: "ENTITY_EXPERIENCE_ORB_PICKUP".to_string(),
            volume: 1.0,
            pitch: 1.0,
            broadcast: false,
        }
    }
}

impl RawTier {
    fn into_tier(self, id: String) -> RarityTier {
        RarityTier {
            id,
            enabled: self.enabled,
            min_chance: self.min_chance,
            max_chance: self.max_chance,
            message: self.message,
            sound: self.sound,
            volume: self.volume,
            pitch: self.pitch,
            broadcast: self.broadcast,
        }
    }
}

// ============================================================================
// DropConfig
// ============================================================================

/// One immutable configuration snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct DropConfig {
    /// Rarity tiers in selection order.
    pub tiers: RarityTable,
    /// Announcement blacklists.
    pub blacklist: Blacklist,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            tiers: RarityTable::defaults(),
            blacklist: Blacklist::default(),
        }
    }
}

impl DropConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::InvalidConfig`] if the document does not parse.
    pub fn from_toml_str(text: &str) -> MagicFindResult<Self> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| MagicFindError::InvalidConfig(e.to_string()))?;

        let blacklist = Blacklist::new(raw.blacklist.items, raw.blacklist.droptables);

        let tiers = match raw.rare_drops {
            None => RarityTable::defaults(),
            Some(section) => {
                let mut tiers = Vec::with_capacity(section.0.len());
                for (id, raw_tier) in section.0 {
                    let tier = raw_tier.into_tier(id);
                    if tier.is_well_formed() {
                        tiers.push(tier);
                    } else {
                        tracing::warn!(
                            tier = %tier.id,
                            min = tier.min_chance,
                            max = tier.max_chance,
                            "rarity tier has an invalid chance range, skipped"
                        );
                    }
                }
                RarityTable::new(tiers)
            }
        };

        for (a, b) in tiers.overlaps() {
            tracing::warn!(first = %a, second = %b, "rarity tiers overlap");
        }

        Ok(Self { tiers, blacklist })
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::ConfigIo`] if the file cannot be read and
    /// [`MagicFindError::InvalidConfig`] if it does not parse.
    pub fn try_load(path: &Path) -> MagicFindResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MagicFindError::ConfigIo(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reads a TOML file, falling back to the built-in defaults on failure.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "using built-in rarity tiers");
                Self::default()
            }
        }
    }

    /// Replaces the blacklists.
    #[must_use]
    pub fn with_blacklist(mut self, items: Vec<String>, tables: Vec<String>) -> Self {
        self.blacklist = Blacklist::new(items, tables);
        self
    }

    /// Tier for a drop of `item_ref` with `original_chance`, honoring the item blacklist.
    #[must_use]
    pub fn classify(&self, item_ref: &str, original_chance: f64) -> Option<&RarityTier> {
        if self.blacklist.is_item_blacklisted(item_ref) {
            return None;
        }
        self.tiers.classify(original_chance)
    }
}

// ============================================================================
// ConfigStore
// ============================================================================

/// Where a [`ConfigStore`] reads from on reload.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigSource {
    /// A TOML file on disk.
    File(PathBuf),
    /// An in-memory TOML document.
    Inline(String),
    /// An already-built config.
    Fixed(Box<DropConfig>),
    /// No source; always the built-in defaults.
    Defaults,
}

/// Holds the current [`DropConfig`] snapshot and swaps it on reload.
#[derive(Debug)]
pub struct ConfigStore {
    source: RwLock<ConfigSource>,
    current: RwLock<Arc<DropConfig>>,
}

impl ConfigStore {
    /// Loads `source` and wraps the result.
    #[must_use]
    pub fn open(source: ConfigSource) -> Self {
        let config = load_source(&source);
        Self {
            source: RwLock::new(source),
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// A store that always holds `config`; reload keeps it.
    #[must_use]
    pub fn fixed(config: DropConfig) -> Self {
        Self::open(ConfigSource::Fixed(Box::new(config)))
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<DropConfig> {
        Arc::clone(&self.current.read())
    }

    /// Re-reads the source and swaps in the result.
    ///
    /// A failed load installs the built-in defaults.
    pub fn reload(&self) -> Arc<DropConfig> {
        let source = self.source.read().clone();
        let fresh = Arc::new(load_source(&source));
        *self.current.write() = Arc::clone(&fresh);
        tracing::info!(
            tiers = fresh.tiers.tiers().len(),
            blacklisted_items = fresh.blacklist.item_count(),
            blacklisted_tables = fresh.blacklist.table_count(),
            "drop config reloaded"
        );
        fresh
    }

    /// Points future reloads at a new source.
    pub fn set_source(&self, source: ConfigSource) {
        *self.source.write() = source;
    }
}

fn load_source(source: &ConfigSource) -> DropConfig {
    match source {
        ConfigSource::File(path) => DropConfig::load_or_default(path),
        ConfigSource::Inline(text) => DropConfig::from_toml_str(text).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using built-in rarity tiers");
            DropConfig::default()
        }),
        ConfigSource::Fixed(config) => (**config).clone(),
        ConfigSource::Defaults => DropConfig::default(),
    }
}

// ============================================================================
// Engine settings
// ============================================================================

/// Engine knobs that are not part of the drop config file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Luck variables live at `<luck_namespace>.<actor>`.
    pub luck_namespace: String,
    /// Container slots live at `<container_namespace>.<actor>::<slot>`.
    pub container_namespace: String,
    /// Re-emit the original drops when every line resolved to nothing.
    pub restore_on_empty: bool,
    /// Leave kills by actors with luck `<= 0` untouched.
    pub require_positive_luck: bool,
    /// Bound on nested drop tables.
    pub max_table_depth: u8,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            luck_namespace: "magic_find".to_string(),
            container_namespace: "sel_item".to_string(),
            restore_on_empty: true,
            require_positive_luck: true,
            max_table_depth: DEFAULT_MAX_TABLE_DEPTH,
        }
    }
}

impl EngineSettings {
    /// Variable key holding an actor's luck.
    #[must_use]
    pub fn luck_key(&self, actor: &str) -> String {
        format!("{}.{}", self.luck_namespace, actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[blacklist]
items = ["dirt", "Custom{x}"]
droptables = ["junk_table"]

[rare_drops.common_find]
min_chance = 0.25
max_chance = 0.5
message = "{item}!"

[rare_drops.lucky]
min_chance = 0.01
max_chance = 0.25
broadcast = true
sound = "custom.lucky"
volume = 2
pitch = 0.5
"#;

    #[test]
    fn test_parses_tiers_and_blacklists() {
        let config = DropConfig::from_toml_str(SAMPLE).unwrap();
        let ids: Vec<&str> = config.tiers.tiers().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["common_find", "lucky"]);

        let lucky = &config.tiers.tiers()[1];
        assert!(lucky.broadcast);
        assert!((lucky.volume - 2.0).abs() < f32::EPSILON);
        assert!((lucky.pitch - 0.5).abs() < f32::EPSILON);

        let common = &config.tiers.tiers()[0];
        assert_eq!(common.sound, "ENTITY_EXPERIENCE_ORB_PICKUP");
        assert!(common.enabled);

        assert!(config.blacklist.is_item_blacklisted("DIRT"));
        assert!(config.blacklist.is_table_blacklisted("junk_table"));
    }

    #[test]
    fn test_classify_honors_item_blacklist() {
        let config = DropConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.classify("DIAMOND", 0.3).map(|t| t.id.as_str()), Some("common_find"));
        assert_eq!(config.classify("dirt", 0.3), None);
    }

    #[test]
    fn test_missing_section_keeps_blacklist_with_default_tiers() {
        let config = DropConfig::from_toml_str("[blacklist]\nitems = [\"STONE\"]\n").unwrap();
        assert_eq!(config.tiers, RarityTable::defaults());
        assert!(config.blacklist.is_item_blacklisted("stone"));
    }

    #[test]
    fn test_empty_section_disables_announcements() {
        let config = DropConfig::from_toml_str("[rare_drops]\n").unwrap();
        assert!(config.tiers.tiers().is_empty());
        assert_eq!(config.tiers.classify(0.15), None);
    }

    #[test]
    fn test_tier_defaults_fill_missing_keys() {
        let config = DropConfig::from_toml_str("[rare_drops.bare]\n").unwrap();
        let tier = &config.tiers.tiers()[0];
        assert!((tier.min_chance - 0.0).abs() < f64::EPSILON);
        assert!((tier.max_chance - 1.0).abs() < f64::EPSILON);
        assert_eq!(tier.message, "{item} x{amount}");
        assert!(!tier.broadcast);
    }

    #[test]
    fn test_equal_max_chance_keeps_file_order() {
        let text = "[rare_drops.zeta]\nmin_chance = 0.1\nmax_chance = 0.5\n\n[rare_drops.alpha]\nmin_chance = 0.2\nmax_chance = 0.5\n";
        let config = DropConfig::from_toml_str(text).unwrap();
        let ids: Vec<&str> = config.tiers.tiers().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
        assert_eq!(config.tiers.classify(0.3).map(|t| t.id.as_str()), Some("zeta"));
    }

    #[test]
    fn test_invalid_tier_is_skipped() {
        let text = "[rare_drops.backwards]\nmin_chance = 0.5\nmax_chance = 0.1\n\n[rare_drops.fine]\nmax_chance = 0.1\n";
        let config = DropConfig::from_toml_str(text).unwrap();
        let ids: Vec<&str> = config.tiers.tiers().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["fine"]);
    }

    #[test]
    fn test_garbage_is_invalid_config() {
        assert!(matches!(
            DropConfig::from_toml_str("rare_drops = 3 ="),
            Err(MagicFindError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = Path::new("/definitely/not/here/magicfind.toml");
        assert!(matches!(DropConfig::try_load(path), Err(MagicFindError::ConfigIo(_))));
        assert_eq!(DropConfig::load_or_default(path), DropConfig::default());
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let store = ConfigStore::open(ConfigSource::Inline(SAMPLE.to_string()));
        let before = store.snapshot();
        assert_eq!(before.tiers.tiers().len(), 2);

        store.set_source(ConfigSource::Inline("[rare_drops]\n".to_string()));
        let after = store.reload();
        assert!(after.tiers.tiers().is_empty());
        assert!(store.snapshot().tiers.tiers().is_empty());

        // readers holding the old snapshot still see it whole
        assert_eq!(before.tiers.tiers().len(), 2);
    }

    #[test]
    fn test_failed_reload_installs_defaults() {
        let store = ConfigStore::open(ConfigSource::Inline(SAMPLE.to_string()));
        store.set_source(ConfigSource::Inline("not = [valid".to_string()));
        let config = store.reload();
        assert_eq!(*config, DropConfig::default());
    }

    #[test]
    fn test_shipped_config_matches_builtin_tiers() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data/magicfind.toml");
        let config = DropConfig::try_load(&path).unwrap();
        assert_eq!(config, DropConfig::default());
    }

    #[test]
    fn test_fixed_store_survives_reload() {
        let config = DropConfig::default().with_blacklist(vec!["DIRT".to_string()], Vec::new());
        let store = ConfigStore::fixed(config.clone());
        assert_eq!(*store.reload(), config);
    }

    #[test]
    fn test_engine_settings_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.luck_key("uuid-1"), "magic_find.uuid-1");
        assert!(settings.restore_on_empty);
        assert_eq!(settings.max_table_depth, 8);
    }
}
