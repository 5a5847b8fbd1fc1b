//! # MagicFind Core
//!
//! Luck-scaled loot resolution for a game server.
//!
//! ## Design Principles
//!
//! 1. **One scalar** - `multiplier = 1 + luck / 100` drives chance and quantity
//! 2. **Fail soft** - a malformed line drops "guaranteed 1x", a failing adapter costs one line
//! 3. **Glass walls** - the host game is reached only through [`integration`] traits
//! 4. **Swap, don't mutate** - config reloads replace a whole snapshot
//!
//! ## Thread Safety
//!
//! Death events may arrive on any host thread. The only shared mutable state
//! is the [`LuckCache`] map and the [`ConfigStore`] pointer; every roll uses a
//! per-call RNG.
//!
//! ## Example
//!
//! ```rust,ignore
//! use magicfind_core::{ConfigSource, ConfigStore, EngineSettings, MagicFindEngine};
//!
//! let config = Arc::new(ConfigStore::open(ConfigSource::File("data/magicfind.toml".into())));
//! let engine = MagicFindEngine::new(adapters, config, EngineSettings::default());
//! let _sweeper = engine.start_sweeper();
//!
//! // from the host's death listener
//! engine.on_mob_death(&mut event);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod integration;
pub mod loot;
pub mod luck_cache;
pub mod memory;
pub mod parser;
pub mod rarity;

pub use command::{handle_command, CommandOutcome, CommandSender, ADMIN_PERMISSION};
pub use config::{ConfigSource, ConfigStore, DropConfig, EngineSettings};
pub use engine::{EngineAdapters, MagicFindEngine};
pub use error::{MagicFindError, MagicFindResult};
pub use integration::{
    ActorId, ActorRef, Audience, CatalogItem, ContainerStore, DeathEvent, DropTable,
    DropTableSource, ItemCatalog, ItemStack, MobDropSource, MobSubject, SlotContainerStore,
    Variable, VariableStore, WeightedEntry,
};
pub use loot::{
    luck_multiplier, DropResolver, DropStatistics, ResolvedDrop, Resolution, Route, ScaledOdds,
};
pub use luck_cache::{CacheSweeper, LuckCache};
pub use parser::{parse_line, DropDefinition, QuantitySpec};
pub use rarity::{Announcement, Announcer, Blacklist, RarityTable, RarityTier};
