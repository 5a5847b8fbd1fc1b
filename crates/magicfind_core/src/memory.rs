//! # In-Memory Adapters
//!
//! Plain `HashMap`-backed implementations of the integration traits, used by
//! the simulator, the benchmarks and the test suites. Each one can be told to
//! fail on specific keys so error isolation can be exercised.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::{MagicFindError, MagicFindResult};
use crate::integration::{
    base_identifier, ActorId, ActorRef, Audience, CatalogItem, DropTable, DropTableSource,
    ItemCatalog, Variable, VariableStore,
};

// ============================================================================
// Item catalog + drop tables
// ============================================================================

/// Item catalog and drop-table source backed by maps.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    items: HashMap<String, CatalogItem>,
    tables: HashMap<String, DropTable>,
    failing: HashSet<String>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a base material, e.g. `DIAMOND`.
    pub fn add_material(&mut self, id: &str, max_stack_size: u32) {
        let id = id.to_uppercase();
        self.items.insert(
            id.clone(),
            CatalogItem {
                id,
                display_name: None,
                max_stack_size,
                custom_model_data: None,
                base_material: true,
            },
        );
    }

    /// Registers a custom item under its exact identifier.
    pub fn add_item(&mut self, item: CatalogItem) {
        self.items.insert(item.id.clone(), item);
    }

    /// Registers a drop table.
    pub fn add_table(&mut self, table: DropTable) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Makes every lookup of `item_ref` fail.
    pub fn fail_on(&mut self, item_ref: &str) {
        self.failing.insert(item_ref.to_string());
    }
}

impl ItemCatalog for MemoryCatalog {
    fn is_base_material(&self, base_id: &str) -> bool {
        self.items
            .get(base_id)
            .is_some_and(|item| item.base_material)
    }

    fn lookup(&self, item_ref: &str) -> MagicFindResult<Option<CatalogItem>> {
        if self.failing.contains(item_ref) {
            return Err(MagicFindError::CatalogFailure {
                item: item_ref.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        if let Some(item) = self.items.get(item_ref) {
            return Ok(Some(item.clone()));
        }

        let base = base_identifier(item_ref);
        Ok(self
            .items
            .get(&base)
            .filter(|item| item.base_material)
            .map(|item| CatalogItem {
                id: item_ref.to_string(),
                ..item.clone()
            }))
    }
}

impl DropTableSource for MemoryCatalog {
    fn drop_table(&self, name: &str) -> Option<DropTable> {
        self.tables.get(name).cloned()
    }
}

// ============================================================================
// Variable store
// ============================================================================

/// Thread-safe variable store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryVariableStore {
    values: Mutex<HashMap<String, Variable>>,
    failing: Mutex<HashSet<String>>,
    reads: Mutex<u64>,
}

impl MemoryVariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read and write of `key` fail.
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }

    /// Total number of `get` calls served.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        *self.reads.lock()
    }

    fn check(&self, key: &str) -> MagicFindResult<()> {
        if self.failing.lock().contains(key) {
            return Err(MagicFindError::VariableStore {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl VariableStore for MemoryVariableStore {
    fn get(&self, key: &str) -> MagicFindResult<Option<Variable>> {
        *self.reads.lock() += 1;
        self.check(key)?;
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Variable) -> MagicFindResult<()> {
        self.check(key)?;
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

// ============================================================================
// Audience
// ============================================================================

/// Audience that records what it was asked to deliver.
#[derive(Debug, Default)]
pub struct RecordingAudience {
    online: Mutex<Vec<ActorRef>>,
    messages: Mutex<Vec<(ActorId, String)>>,
    sounds: Mutex<Vec<(ActorId, String)>>,
    rejected_sounds: Mutex<HashSet<String>>,
}

impl RecordingAudience {
    /// Creates an audience with nobody online.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an actor as connected.
    pub fn connect(&self, actor: ActorRef) {
        self.online.lock().push(actor);
    }

    /// Makes `sound` unplayable.
    pub fn reject_sound(&self, sound: &str) {
        self.rejected_sounds.lock().insert(sound.to_string());
    }

    /// Messages delivered to `actor`, in order.
    #[must_use]
    pub fn messages_for(&self, actor: &ActorId) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(id, _)| id == actor)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Sounds successfully played to `actor`, in order.
    #[must_use]
    pub fn sounds_for(&self, actor: &ActorId) -> Vec<String> {
        self.sounds
            .lock()
            .iter()
            .filter(|(id, _)| id == actor)
            .map(|(_, sound)| sound.clone())
            .collect()
    }

    /// Total number of messages delivered.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }
}

impl Audience for RecordingAudience {
    fn online_actors(&self) -> Vec<ActorRef> {
        self.online.lock().clone()
    }

    fn send_message(&self, actor: &ActorRef, message: &str) {
        self.messages
            .lock()
            .push((actor.id.clone(), message.to_string()));
    }

    fn play_sound(
        &self,
        actor: &ActorRef,
        sound: &str,
        _volume: f32,
        _pitch: f32,
    ) -> MagicFindResult<()> {
        if self.rejected_sounds.lock().contains(sound) {
            return Err(MagicFindError::SoundFailure {
                sound: sound.to_string(),
                reason: "unknown sound".to_string(),
            });
        }
        self.sounds.lock().push((actor.id.clone(), sound.to_string()));
        Ok(())
    }
}
