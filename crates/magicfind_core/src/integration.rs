//! # Integration API
//!
//! **Glass walls** - the engine never touches the host game directly.
//!
//! The host implements the traits in this module; the engine only ever sees
//! these narrow seams:
//!
//! ```text
//! Host defines:                    Engine calls:
//! ┌──────────────────────┐        ┌──────────────────────────────┐
//! │ impl MobDropSource   │ ←───── │ raw_drop_lines()             │
//! │ impl DropTableSource │ ←───── │ drop_table(name).entries     │
//! │ impl ItemCatalog     │ ←───── │ lookup / is_base_material    │
//! │ impl VariableStore   │ ←───── │ luck + container slot keys   │
//! │ impl ContainerStore  │ ←───── │ find_slot / add_to_slot      │
//! │ impl Audience        │ ←───── │ send_message / play_sound    │
//! └──────────────────────┘        └──────────────────────────────┘
//! ```
//!
//! All adapters must be `Send + Sync`: death events can arrive on any host
//! thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MagicFindError, MagicFindResult};
use crate::parser::QuantitySpec;

// ============================================================================
// Actors
// ============================================================================

/// Stable identifier of an actor (a player UUID string on most hosts).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(String);

impl ActorId {
    /// Wraps a host identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An actor as seen by the engine: identity plus display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorRef {
    /// Stable identifier.
    pub id: ActorId,
    /// Name substituted into `{player}`.
    pub name: String,
}

impl ActorRef {
    /// Creates an actor reference.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(id),
            name: name.into(),
        }
    }
}

// ============================================================================
// Items
// ============================================================================

/// Returns the identifier without its bracketed template suffix, upper-cased.
///
/// `diamond{display:"Shiny"}` becomes `DIAMOND`.
#[must_use]
pub fn base_identifier(item_ref: &str) -> String {
    item_ref
        .split('{')
        .next()
        .unwrap_or_default()
        .trim()
        .to_uppercase()
}

/// A concrete stack of items, as placed in a world drop list or a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemStack {
    /// Item identifier (may carry a template suffix).
    pub item_id: String,
    /// Number of items in this stack.
    pub amount: u32,
    /// Maximum stack size for this item type.
    pub max_stack_size: u32,
    /// Custom display name, if the item has one.
    pub display_name: Option<String>,
    /// Custom model data, if the item has one.
    pub custom_model_data: Option<i32>,
}

impl ItemStack {
    /// Creates a plain stack without custom metadata.
    #[must_use]
    pub fn new(item_id: impl Into<String>, amount: u32, max_stack_size: u32) -> Self {
        Self {
            item_id: item_id.into(),
            amount,
            max_stack_size,
            display_name: None,
            custom_model_data: None,
        }
    }

    /// Returns a copy of this stack holding `amount` items.
    #[must_use]
    pub fn with_amount(&self, amount: u32) -> Self {
        Self {
            amount,
            ..self.clone()
        }
    }

    /// Whether two stacks describe the same item, ignoring amounts.
    ///
    /// Same base identifier, same custom model data and same display name.
    #[must_use]
    pub fn is_same_item(&self, other: &Self) -> bool {
        base_identifier(&self.item_id) == base_identifier(&other.item_id)
            && self.custom_model_data == other.custom_model_data
            && self.display_name == other.display_name
    }
}

/// Catalog entry for one item identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogItem {
    /// Resolved identifier.
    pub id: String,
    /// Display name from the catalog, possibly with `&` colour codes.
    pub display_name: Option<String>,
    /// Maximum stack size.
    pub max_stack_size: u32,
    /// Custom model data carried by generated stacks.
    pub custom_model_data: Option<i32>,
    /// Whether this is a plain base material rather than a customized item.
    pub base_material: bool,
}

impl CatalogItem {
    /// Builds a stack of this item.
    #[must_use]
    pub fn stack(&self, amount: u32) -> ItemStack {
        ItemStack {
            item_id: self.id.clone(),
            amount,
            max_stack_size: self.max_stack_size.max(1),
            display_name: self.display_name.clone(),
            custom_model_data: self.custom_model_data,
        }
    }
}

/// Lookup of item identifiers to concrete items.
pub trait ItemCatalog: Send + Sync {
    /// Whether `base_id` (upper-case, no template suffix) is a known base material.
    fn is_base_material(&self, base_id: &str) -> bool;

    /// Resolves an item reference. `Ok(None)` is a lookup miss.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::CatalogFailure`] if the catalog itself fails.
    fn lookup(&self, item_ref: &str) -> MagicFindResult<Option<CatalogItem>>;
}

// ============================================================================
// Drop tables
// ============================================================================

/// One weighted entry of a drop table.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedEntry {
    /// Item (or nested table) identifier.
    pub item_ref: String,
    /// Entry weight as reported by the host.
    pub weight: f64,
    /// Explicit entry chance, if the host tracks one apart from the weight.
    pub chance: Option<f64>,
    /// Quantity to drop (or repeat count for a nested table).
    pub quantity: QuantitySpec,
}

impl WeightedEntry {
    /// Creates an entry whose weight doubles as its chance.
    #[must_use]
    pub fn new(item_ref: impl Into<String>, weight: f64, quantity: QuantitySpec) -> Self {
        Self {
            item_ref: item_ref.into(),
            weight,
            chance: None,
            quantity,
        }
    }

    /// The base chance used by the engine.
    ///
    /// The weight if it is below 1, else the explicit chance if below 1,
    /// else a guaranteed drop.
    #[must_use]
    pub fn base_chance(&self) -> f64 {
        if self.weight.is_finite() && self.weight < 1.0 {
            return self.weight.max(0.0);
        }
        match self.chance {
            Some(chance) if chance.is_finite() && chance < 1.0 => chance.max(0.0),
            _ => 1.0,
        }
    }
}

/// A named, ordered collection of weighted entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DropTable {
    /// Table identifier.
    pub name: String,
    /// Entries in host order.
    pub entries: Vec<WeightedEntry>,
}

/// Access to the host's named drop tables.
pub trait DropTableSource: Send + Sync {
    /// Looks up a drop table by name.
    fn drop_table(&self, name: &str) -> Option<DropTable>;
}

/// Adapter over the host's mob definition.
pub trait MobDropSource: Send + Sync {
    /// The raw `Drops` lines configured for the mob type.
    fn raw_drop_lines(&self) -> Vec<String>;
}

impl MobDropSource for Vec<String> {
    fn raw_drop_lines(&self) -> Vec<String> {
        self.clone()
    }
}

// ============================================================================
// Variables and containers
// ============================================================================

/// A value held by the external variable store.
#[derive(Clone, Debug, PartialEq)]
pub enum Variable {
    /// A number.
    Number(f64),
    /// Free text.
    Text(String),
    /// An item descriptor.
    Item(ItemStack),
}

impl Variable {
    /// Interprets the value as a number.
    ///
    /// Text is accepted if it parses as a finite number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

/// External key-value store (luck values, container slots).
pub trait VariableStore: Send + Sync {
    /// Reads a variable. `Ok(None)` if unset.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::VariableStore`] if the store fails.
    fn get(&self, key: &str) -> MagicFindResult<Option<Variable>>;

    /// Writes a variable.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::VariableStore`] if the store fails.
    fn set(&self, key: &str, value: Variable) -> MagicFindResult<()>;
}

/// Per-actor aggregate storage that absorbs drops of registered items.
pub trait ContainerStore: Send + Sync {
    /// Finds the slot registered for an equivalent item.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::ContainerFailure`] if the store fails.
    fn find_slot(&self, actor: &ActorId, stack: &ItemStack) -> MagicFindResult<Option<u8>>;

    /// Adds `amount` to a slot and returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::ContainerFailure`] if the store fails.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn add_to_slot(&self, actor: &ActorId, slot: u8, amount: u32) -> MagicFindResult<u64>;
}

/// Number of container slots per actor.
pub const CONTAINER_SLOTS: u8 = 27;

/// Container store laid out over a [`VariableStore`].
///
/// ```text
/// <namespace>.<actor>::<slot>          -> registered item descriptor
/// amount.<namespace>.<actor>::<slot>   -> accumulated count
/// ```
pub struct SlotContainerStore<S: VariableStore + ?Sized> {
    store: Arc<S>,
    namespace: String,
}

impl<S: VariableStore + ?Sized> SlotContainerStore<S> {
    /// Creates a container store using `namespace` for its keys.
    #[must_use]
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Key holding the item registered in a slot.
    #[must_use]
    pub fn slot_key(&self, actor: &ActorId, slot: u8) -> String {
        format!("{}.{}::{}", self.namespace, actor, slot)
    }

    /// Key holding the accumulated amount of a slot.
    #[must_use]
    pub fn amount_key(&self, actor: &ActorId, slot: u8) -> String {
        format!("amount.{}", self.slot_key(actor, slot))
    }

    fn container_error(actor: &ActorId, err: &MagicFindError) -> MagicFindError {
        MagicFindError::ContainerFailure {
            actor: actor.to_string(),
            reason: err.to_string(),
        }
    }
}

impl<S: VariableStore + ?Sized> ContainerStore for SlotContainerStore<S> {
    fn find_slot(&self, actor: &ActorId, stack: &ItemStack) -> MagicFindResult<Option<u8>> {
        for slot in 1..=CONTAINER_SLOTS {
            let key = self.slot_key(actor, slot);
            let value = self
                .store
                .get(&key)
                .map_err(|e| Self::container_error(actor, &e))?;
            if let Some(Variable::Item(registered)) = value {
                if registered.is_same_item(stack) {
                    return Ok(Some(slot));
                }
            }
        }
        Ok(None)
    }

    fn add_to_slot(&self, actor: &ActorId, slot: u8, amount: u32) -> MagicFindResult<u64> {
        let key = self.amount_key(actor, slot);
        let current = self
            .store
            .get(&key)
            .map_err(|e| Self::container_error(actor, &e))?
            .and_then(|v| v.as_number())
            .map_or(0, |n| n.max(0.0) as u64);
        let updated = current.saturating_add(u64::from(amount));
        self.store
            .set(&key, Variable::Number(updated as f64))
            .map_err(|e| Self::container_error(actor, &e))?;
        Ok(updated)
    }
}

// ============================================================================
// Announcement delivery
// ============================================================================

/// The set of connected actors plus message and sound delivery.
pub trait Audience: Send + Sync {
    /// Every currently connected actor.
    fn online_actors(&self) -> Vec<ActorRef>;

    /// Sends a chat message to one actor.
    fn send_message(&self, actor: &ActorRef, message: &str);

    /// Plays a sound to one actor.
    ///
    /// # Errors
    ///
    /// Returns [`MagicFindError::SoundFailure`] if the identifier is unknown.
    fn play_sound(&self, actor: &ActorRef, sound: &str, volume: f32, pitch: f32)
        -> MagicFindResult<()>;
}

// ============================================================================
// Death events
// ============================================================================

/// The entity that died, carrying the opaque "already processed" marker.
#[derive(Debug, Default)]
pub struct MobSubject {
    /// Host entity id.
    pub entity_id: u64,
    processed: AtomicBool,
}

impl MobSubject {
    /// Creates an unprocessed subject.
    #[must_use]
    pub fn new(entity_id: u64) -> Self {
        Self {
            entity_id,
            processed: AtomicBool::new(false),
        }
    }

    /// Marks the subject processed. Returns `true` only for the first caller.
    #[inline]
    pub fn mark_processed(&self) -> bool {
        !self.processed.swap(true, Ordering::AcqRel)
    }

    /// Whether the subject has already been processed.
    #[inline]
    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }
}

/// A mob death as delivered by the host.
pub struct DeathEvent {
    /// The killer, if it was an actor that can carry luck.
    pub killer: Option<ActorRef>,
    /// The dead entity.
    pub subject: Arc<MobSubject>,
    /// The mob type's drop configuration.
    pub mob: Arc<dyn MobDropSource>,
    /// The world drop list; replaced by the engine.
    pub drops: Vec<ItemStack>,
}

impl fmt::Debug for DeathEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathEvent")
            .field("killer", &self.killer)
            .field("subject", &self.subject)
            .field("drops", &self.drops)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryVariableStore;

    #[test]
    fn test_entry_chance_prefers_fractional_weight() {
        let mut entry = WeightedEntry::new("GOLD_INGOT", 0.25, QuantitySpec::Fixed(1));
        entry.chance = Some(0.5);
        assert!((entry.base_chance() - 0.25).abs() < f64::EPSILON);

        entry.weight = 10.0;
        assert!((entry.base_chance() - 0.5).abs() < f64::EPSILON);

        entry.chance = None;
        assert!((entry.base_chance() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_item_ignores_amount_and_case() {
        let a = ItemStack::new("diamond", 3, 64);
        let b = ItemStack::new("DIAMOND", 10, 64);
        assert!(a.is_same_item(&b));

        let mut named = b.clone();
        named.display_name = Some("Shiny".to_string());
        assert!(!a.is_same_item(&named));

        let mut modeled = b;
        modeled.custom_model_data = Some(7);
        assert!(!a.is_same_item(&modeled));
    }

    #[test]
    fn test_subject_marks_once() {
        let subject = MobSubject::new(1);
        assert!(!subject.is_processed());
        assert!(subject.mark_processed());
        assert!(!subject.mark_processed());
        assert!(subject.is_processed());
    }

    #[test]
    fn test_slot_store_finds_registered_item_and_accumulates() {
        let vars = Arc::new(MemoryVariableStore::new());
        let store = SlotContainerStore::new(Arc::clone(&vars), "sel_item");
        let actor = ActorId::new("uuid-1");

        vars.set(
            "sel_item.uuid-1::5",
            Variable::Item(ItemStack::new("ROTTEN_FLESH", 1, 64)),
        )
        .unwrap();

        let probe = ItemStack::new("ROTTEN_FLESH", 1, 64);
        assert_eq!(store.find_slot(&actor, &probe).unwrap(), Some(5));
        assert_eq!(
            store.find_slot(&actor, &ItemStack::new("BONE", 1, 64)).unwrap(),
            None
        );

        assert_eq!(store.add_to_slot(&actor, 5, 3).unwrap(), 3);
        assert_eq!(store.add_to_slot(&actor, 5, 4).unwrap(), 7);
        assert_eq!(
            vars.get("amount.sel_item.uuid-1::5").unwrap(),
            Some(Variable::Number(7.0))
        );
    }

    #[test]
    fn test_numeric_text_is_a_number() {
        assert_eq!(Variable::Text(" 42.5 ".to_string()).as_number(), Some(42.5));
        assert_eq!(Variable::Text("lots".to_string()).as_number(), None);
        assert_eq!(Variable::Number(f64::NAN).as_number(), None);
    }
}
