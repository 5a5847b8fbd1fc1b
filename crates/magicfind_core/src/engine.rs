//! # MagicFind Engine
//!
//! The explicitly constructed engine instance. It owns the config store and
//! the luck cache and holds the host adapters; the host glue forwards death
//! events to [`MagicFindEngine::on_mob_death`].
//!
//! ```text
//! DeathEvent ─► killer? ─► already processed? ─► luck (cache / store)
//!     ─► luck > 0? ─► mark processed ─► pin luck ─► resolve lines
//!     ─► nothing dropped? restore originals ─► replace event.drops
//! ```
//!
//! Several engines can coexist in one process, each with its own config.

use std::sync::Arc;

use rand::Rng;

use crate::config::{ConfigStore, DropConfig, EngineSettings};
use crate::integration::{
    ActorId, ActorRef, Audience, ContainerStore, DeathEvent, DropTableSource, ItemCatalog,
    SlotContainerStore, VariableStore,
};
use crate::loot::{DropResolver, DropStatistics, Resolution};
use crate::luck_cache::{CacheSweeper, LuckCache};
use crate::rarity::Announcer;

/// The host adapters an engine needs.
#[derive(Clone)]
pub struct EngineAdapters {
    /// Item lookups.
    pub catalog: Arc<dyn ItemCatalog>,
    /// Named drop tables.
    pub tables: Arc<dyn DropTableSource>,
    /// Luck values (and container slots when `containers` is `None`).
    pub variables: Arc<dyn VariableStore>,
    /// Container slots. `None` lays them over `variables`.
    pub containers: Option<Arc<dyn ContainerStore>>,
    /// Message and sound delivery.
    pub audience: Arc<dyn Audience>,
}

/// Luck-scaled drop engine.
pub struct MagicFindEngine {
    config: Arc<ConfigStore>,
    luck_cache: Arc<LuckCache>,
    catalog: Arc<dyn ItemCatalog>,
    tables: Arc<dyn DropTableSource>,
    variables: Arc<dyn VariableStore>,
    containers: Arc<dyn ContainerStore>,
    announcer: Announcer,
    settings: EngineSettings,
}

impl MagicFindEngine {
    /// Creates an engine with a fresh luck cache.
    #[must_use]
    pub fn new(
        adapters: EngineAdapters,
        config: Arc<ConfigStore>,
        settings: EngineSettings,
    ) -> Self {
        Self::with_luck_cache(adapters, config, settings, Arc::new(LuckCache::new()))
    }

    /// Creates an engine sharing an existing luck cache.
    #[must_use]
    pub fn with_luck_cache(
        adapters: EngineAdapters,
        config: Arc<ConfigStore>,
        settings: EngineSettings,
        luck_cache: Arc<LuckCache>,
    ) -> Self {
        let containers: Arc<dyn ContainerStore> = match adapters.containers {
            Some(containers) => containers,
            None => Arc::new(SlotContainerStore::new(
                Arc::clone(&adapters.variables),
                settings.container_namespace.clone(),
            )),
        };

        Self {
            config,
            luck_cache,
            catalog: adapters.catalog,
            tables: adapters.tables,
            variables: adapters.variables,
            containers,
            announcer: Announcer::new(adapters.audience),
            settings,
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The config store.
    #[must_use]
    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// The luck cache.
    #[must_use]
    pub fn luck_cache(&self) -> &Arc<LuckCache> {
        &self.luck_cache
    }

    /// Starts the periodic luck-cache sweep. Stops when the handle drops.
    #[must_use]
    pub fn start_sweeper(&self) -> CacheSweeper {
        CacheSweeper::start(Arc::clone(&self.luck_cache))
    }

    /// Re-reads the drop config.
    pub fn reload_config(&self) -> Arc<DropConfig> {
        self.config.reload()
    }

    // ========================================================================
    // Luck
    // ========================================================================

    /// The actor's luck: cached if fresh, else read from the variable store.
    ///
    /// Absent or non-numeric values are `0`. A failed read is `0` and is not
    /// cached.
    #[must_use]
    pub fn current_luck(&self, actor: &ActorId) -> f64 {
        if let Some(luck) = self.luck_cache.get(actor) {
            return luck;
        }

        // fetched with the cache unlocked
        let key = self.settings.luck_key(actor.as_str());
        let luck = match self.variables.get(&key) {
            Ok(value) => value.and_then(|v| v.as_number()).unwrap_or(0.0),
            Err(e) => {
                tracing::warn!(%actor, error = %e, "luck lookup failed, using 0");
                return 0.0;
            }
        };

        self.luck_cache.set(actor, luck);
        luck
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    fn resolver<'a>(&'a self, config: &'a DropConfig, luck: f64) -> DropResolver<'a> {
        DropResolver::new(self.catalog.as_ref(), self.tables.as_ref(), config, luck)
            .with_max_depth(self.settings.max_table_depth)
    }

    /// Resolves raw drop lines for `killer` with the thread-local RNG.
    ///
    /// Container routing and announcements apply when a killer is given.
    #[must_use]
    pub fn resolve(&self, lines: &[String], killer: Option<&ActorRef>, luck: f64) -> Resolution {
        self.resolve_with_rng(lines, killer, luck, &mut rand::thread_rng())
    }

    /// [`resolve`](Self::resolve) with a caller-supplied RNG.
    pub fn resolve_with_rng<R: Rng + ?Sized>(
        &self,
        lines: &[String],
        killer: Option<&ActorRef>,
        luck: f64,
        rng: &mut R,
    ) -> Resolution {
        let config = self.config.snapshot();
        let resolver = self.resolver(&config, luck);
        match killer {
            Some(killer) => resolver
                .with_containers(self.containers.as_ref())
                .with_announcer(&self.announcer)
                .for_killer(killer)
                .resolve_lines(lines, rng),
            None => resolver.resolve_lines(lines, rng),
        }
    }

    /// Handles a mob death with the thread-local RNG.
    ///
    /// Returns `None` if the event was left untouched.
    pub fn on_mob_death(&self, event: &mut DeathEvent) -> Option<Resolution> {
        self.on_mob_death_with_rng(event, &mut rand::thread_rng())
    }

    /// [`on_mob_death`](Self::on_mob_death) with a caller-supplied RNG.
    pub fn on_mob_death_with_rng<R: Rng + ?Sized>(
        &self,
        event: &mut DeathEvent,
        rng: &mut R,
    ) -> Option<Resolution> {
        let killer = event.killer.clone()?;
        if event.subject.is_processed() {
            tracing::debug!(entity = event.subject.entity_id, "death event already processed");
            return None;
        }

        let luck = self.current_luck(&killer.id);
        if self.settings.require_positive_luck && luck <= 0.0 {
            return None;
        }

        if !event.subject.mark_processed() {
            return None;
        }
        self.luck_cache.set(&killer.id, luck);

        let lines = event.mob.raw_drop_lines();
        if lines.is_empty() {
            return None;
        }

        let originals = std::mem::take(&mut event.drops);
        let config = self.config.snapshot();
        let resolver = self
            .resolver(&config, luck)
            .with_containers(self.containers.as_ref())
            .with_announcer(&self.announcer)
            .for_killer(&killer);

        let mut resolution = resolver.resolve_lines(&lines, rng);
        if resolution.is_empty() && self.settings.restore_on_empty && !originals.is_empty() {
            resolver.restore(&originals, &mut resolution);
        }

        event.drops = resolution.world_stacks();

        tracing::debug!(
            entity = event.subject.entity_id,
            killer = %killer.id,
            luck,
            drops = resolution.drops.len(),
            announcements = resolution.announcements.len(),
            restored = resolution.restored,
            "death event resolved"
        );

        Some(resolution)
    }

    /// Runs `iterations` kills of `lines` at `luck` and aggregates the outcome.
    ///
    /// Nothing is routed to containers and nothing is delivered; rare drops
    /// are counted per tier.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        lines: &[String],
        luck: f64,
        iterations: u64,
        rng: &mut R,
    ) -> DropStatistics {
        let config = self.config.snapshot();
        let resolver = self.resolver(&config, luck);
        let mut stats = DropStatistics::default();
        for _ in 0..iterations {
            stats.record(&resolver.resolve_lines(lines, rng));
        }
        stats
    }
}

impl std::fmt::Debug for MagicFindEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MagicFindEngine")
            .field("settings", &self.settings)
            .field("cached_actors", &self.luck_cache.len())
            .finish_non_exhaustive()
    }
}
