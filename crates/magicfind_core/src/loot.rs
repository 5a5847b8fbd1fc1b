//! # Drop Resolution Engine
//!
//! **Luck-scaled chance and quantity over items and nested drop tables**
//!
//! Every drop line goes through the same transform, driven by one scalar:
//!
//! ```text
//! multiplier = 1 + luck / 100
//!
//! base >= 1          -> chance 1,     amount x max(1, floor(multiplier))
//! base * mult <= 1   -> chance total, amount x 1
//! base * mult >  1   -> chance 1,     amount x max(1, floor(total))
//! ```
//!
//! Probability absorbs luck up to certainty; past that, excess luck turns
//! into bonus quantity.
//!
//! ## Tables
//!
//! A table line rolls its own (unscaled) chance once. If it fires, every
//! entry is walked `repeat` times, each entry rolled with the outer
//! multiplier. Entries naming another table recurse up to a depth bound.
//!
//! ## Failure Isolation
//!
//! Catalog and container failures are logged and cost exactly one drop line.
//! Nothing here returns an error.

use std::collections::BTreeMap;

use rand::Rng;

use crate::config::DropConfig;
use crate::integration::{
    ActorRef, ContainerStore, DropTable, DropTableSource, ItemCatalog, ItemStack,
};
use crate::parser::{parse_line, DropDefinition, QuantitySpec};
use crate::rarity::{display_name, render_message, Announcement, Announcer, RarityTier};

/// Default bound on nested table recursion.
pub const DEFAULT_MAX_TABLE_DEPTH: u8 = 8;

/// Upper bound on world stacks emitted for one resolved drop.
///
/// Excess quantity past `max_stack_size * MAX_WORLD_STACKS_PER_DROP` is
/// discarded. Container slots are not capped.
pub const MAX_WORLD_STACKS_PER_DROP: u32 = 256;

/// `1 + luck / 100`. Non-finite luck counts as zero.
#[inline]
#[must_use]
pub fn luck_multiplier(luck: f64) -> f64 {
    if luck.is_finite() {
        1.0 + luck / 100.0
    } else {
        1.0
    }
}

/// Chance and quantity factor after luck is applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaledOdds {
    /// Probability that the drop fires, in `[0, 1]` for sane inputs.
    pub final_chance: f64,
    /// Factor applied to the sampled quantity. Always at least 1.
    pub amount_multiplier: u32,
}

impl ScaledOdds {
    /// Applies `multiplier` to `base_chance`.
    #[must_use]
    pub fn compute(base_chance: f64, multiplier: f64) -> Self {
        if base_chance >= 1.0 {
            return Self {
                final_chance: 1.0,
                amount_multiplier: floor_at_least_one(multiplier),
            };
        }

        let total = base_chance * multiplier;
        if total <= 1.0 {
            Self {
                final_chance: total,
                amount_multiplier: 1,
            }
        } else {
            Self {
                final_chance: 1.0,
                amount_multiplier: floor_at_least_one(total),
            }
        }
    }

    /// Rolls `U ~ [0, 1)`; fires iff `U <= final_chance`.
    #[inline]
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen::<f64>() <= self.final_chance
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_at_least_one(value: f64) -> u32 {
    // `as` saturates at u32::MAX
    value.floor().max(1.0) as u32
}

// ============================================================================
// Output
// ============================================================================

/// Where a resolved drop went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Added to the killer's container slot.
    Container {
        /// Slot index, `1..=27`.
        slot: u8,
    },
    /// Appended to the world drop list.
    World,
}

/// One concrete output of a resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedDrop {
    /// Identifier from the drop line or table entry.
    pub item_ref: String,
    /// Items in this drop. World drops never exceed the stack size.
    pub quantity: u32,
    /// Destination.
    pub route: Route,
    /// The stack that was produced.
    pub stack: ItemStack,
}

/// Everything one resolution produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// Resolved drops in line order.
    pub drops: Vec<ResolvedDrop>,
    /// Rare-drop announcements, dispatched or previewed.
    pub announcements: Vec<Announcement>,
    /// Whether the original drops were restored because nothing resolved.
    pub restored: bool,
}

impl Resolution {
    /// Whether nothing dropped anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drops.is_empty()
    }

    /// Drops routed to the world.
    #[must_use]
    pub fn world_drops(&self) -> impl Iterator<Item = &ResolvedDrop> {
        self.drops.iter().filter(|d| d.route == Route::World)
    }

    /// Drops routed to containers.
    #[must_use]
    pub fn container_drops(&self) -> impl Iterator<Item = &ResolvedDrop> {
        self.drops.iter().filter(|d| d.route != Route::World)
    }

    /// The stacks that replace the event's world drop list.
    #[must_use]
    pub fn world_stacks(&self) -> Vec<ItemStack> {
        self.world_drops().map(|d| d.stack.clone()).collect()
    }

    /// Total quantity per item reference, over both routes.
    #[must_use]
    pub fn totals(&self) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        for drop in &self.drops {
            *totals.entry(drop.item_ref.clone()).or_insert(0) += u64::from(drop.quantity);
        }
        totals
    }
}

/// Splits `quantity` into stacks no larger than the item's stack size.
#[must_use]
pub fn split_into_stacks(prototype: &ItemStack, quantity: u32) -> Vec<ItemStack> {
    let max = prototype.max_stack_size.max(1);
    let mut stacks = Vec::with_capacity((quantity / max) as usize + 1);
    let mut remaining = quantity;
    while remaining > 0 {
        let amount = remaining.min(max);
        stacks.push(prototype.with_amount(amount));
        remaining -= amount;
    }
    stacks
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves drop lines for one kill.
///
/// Borrowed view over the adapters and the config snapshot; build one per
/// event. Without a container store everything routes to the world; without
/// an announcer rare drops are previewed instead of delivered.
pub struct DropResolver<'a> {
    catalog: &'a dyn ItemCatalog,
    tables: &'a dyn DropTableSource,
    config: &'a DropConfig,
    containers: Option<&'a dyn ContainerStore>,
    announcer: Option<&'a Announcer>,
    killer: Option<&'a ActorRef>,
    luck: f64,
    multiplier: f64,
    max_depth: u8,
}

impl<'a> DropResolver<'a> {
    /// Creates a resolver for `luck`.
    #[must_use]
    pub fn new(
        catalog: &'a dyn ItemCatalog,
        tables: &'a dyn DropTableSource,
        config: &'a DropConfig,
        luck: f64,
    ) -> Self {
        let luck = if luck.is_finite() { luck } else { 0.0 };
        Self {
            catalog,
            tables,
            config,
            containers: None,
            announcer: None,
            killer: None,
            luck,
            multiplier: luck_multiplier(luck),
            max_depth: DEFAULT_MAX_TABLE_DEPTH,
        }
    }

    /// Routes matching drops into `containers`.
    #[must_use]
    pub fn with_containers(mut self, containers: &'a dyn ContainerStore) -> Self {
        self.containers = Some(containers);
        self
    }

    /// Delivers rare-drop announcements through `announcer`.
    #[must_use]
    pub fn with_announcer(mut self, announcer: &'a Announcer) -> Self {
        self.announcer = Some(announcer);
        self
    }

    /// Sets the actor credited with the kill.
    #[must_use]
    pub fn for_killer(mut self, killer: &'a ActorRef) -> Self {
        self.killer = Some(killer);
        self
    }

    /// Sets the nested table depth bound.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The multiplier in effect.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Parses and resolves every raw line.
    pub fn resolve_lines<R: Rng + ?Sized>(&self, lines: &[String], rng: &mut R) -> Resolution {
        let mut out = Resolution::default();
        for line in lines {
            if let Some(def) = parse_line(line, self.catalog) {
                self.resolve_definition(&def, rng, &mut out);
            }
        }
        out
    }

    /// Resolves one parsed line into `out`.
    pub fn resolve_definition<R: Rng + ?Sized>(
        &self,
        def: &DropDefinition,
        rng: &mut R,
        out: &mut Resolution,
    ) {
        if def.is_table_reference {
            if let Some(table) = self.tables.drop_table(&def.item_ref) {
                self.resolve_table(&table, def.quantity, def.base_chance, 0, false, rng, out);
                return;
            }
        }
        self.resolve_item(&def.item_ref, def.quantity, def.base_chance, false, rng, out);
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_table<R: Rng + ?Sized>(
        &self,
        table: &DropTable,
        repeat: QuantitySpec,
        chance: f64,
        depth: u8,
        inherited_skip: bool,
        rng: &mut R,
        out: &mut Resolution,
    ) {
        let roll = rng.gen::<f64>();
        if roll > chance {
            tracing::debug!(table = %table.name, roll, chance, "table did not fire");
            return;
        }

        let repeats = repeat.sample(rng);
        let skip_rare_check =
            inherited_skip || self.config.blacklist.is_table_blacklisted(&table.name);
        tracing::debug!(table = %table.name, repeats, depth, "table fired");

        for _ in 0..repeats {
            for entry in &table.entries {
                let base_chance = entry.base_chance();
                match self.nested_table(&entry.item_ref) {
                    Some(nested) if depth < self.max_depth => {
                        self.resolve_table(
                            &nested,
                            entry.quantity,
                            base_chance,
                            depth + 1,
                            skip_rare_check,
                            rng,
                            out,
                        );
                    }
                    Some(nested) => {
                        tracing::warn!(
                            table = %nested.name,
                            max_depth = self.max_depth,
                            "nested drop table too deep, skipped"
                        );
                    }
                    None => self.resolve_item(
                        &entry.item_ref,
                        entry.quantity,
                        base_chance,
                        skip_rare_check,
                        rng,
                        out,
                    ),
                }
            }
        }
    }

    fn nested_table(&self, item_ref: &str) -> Option<DropTable> {
        if item_ref.contains('{') || self.catalog.is_base_material(&item_ref.to_uppercase()) {
            return None;
        }
        self.tables.drop_table(item_ref)
    }

    fn resolve_item<R: Rng + ?Sized>(
        &self,
        item_ref: &str,
        quantity: QuantitySpec,
        base_chance: f64,
        skip_rare_check: bool,
        rng: &mut R,
        out: &mut Resolution,
    ) {
        let odds = ScaledOdds::compute(base_chance, self.multiplier);
        if !odds.roll(rng) {
            tracing::debug!(item = item_ref, chance = odds.final_chance, "drop did not fire");
            return;
        }

        let final_quantity = quantity.sample(rng).saturating_mul(odds.amount_multiplier);
        if final_quantity == 0 {
            return;
        }

        let item = match self.catalog.lookup(item_ref) {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::debug!(item = item_ref, "unknown item or table, line skipped");
                return;
            }
            Err(e) => {
                tracing::warn!(item = item_ref, error = %e, "item catalog failed, line skipped");
                return;
            }
        };

        let prototype = item.stack(1);
        if !self.route(item_ref, &prototype, final_quantity, out) {
            return;
        }

        tracing::debug!(
            item = item_ref,
            quantity = final_quantity,
            amount_multiplier = odds.amount_multiplier,
            "drop resolved"
        );

        if skip_rare_check {
            return;
        }
        if let Some(tier) = self.config.classify(item_ref, base_chance) {
            let name = display_name(item_ref, &item);
            if let Some(announcement) = self.announce(tier, &name, final_quantity, base_chance) {
                out.announcements.push(announcement);
            }
        }
    }

    /// Routes to a container slot if one matches, else to world stacks.
    /// Returns `false` if the container store failed.
    fn route(
        &self,
        item_ref: &str,
        prototype: &ItemStack,
        quantity: u32,
        out: &mut Resolution,
    ) -> bool {
        if let (Some(containers), Some(killer)) = (self.containers, self.killer) {
            let slot = containers
                .find_slot(&killer.id, prototype)
                .and_then(|slot| match slot {
                    Some(slot) => containers
                        .add_to_slot(&killer.id, slot, quantity)
                        .map(|_| Some(slot)),
                    None => Ok(None),
                });

            match slot {
                Ok(Some(slot)) => {
                    out.drops.push(ResolvedDrop {
                        item_ref: item_ref.to_string(),
                        quantity,
                        route: Route::Container { slot },
                        stack: prototype.with_amount(quantity),
                    });
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(item = item_ref, error = %e, "container store failed, line skipped");
                    return false;
                }
            }
        }

        let world_cap = prototype
            .max_stack_size
            .max(1)
            .saturating_mul(MAX_WORLD_STACKS_PER_DROP);
        if quantity > world_cap {
            tracing::warn!(
                item = item_ref,
                quantity,
                kept = world_cap,
                "world drop exceeds stack cap, excess discarded"
            );
        }

        for stack in split_into_stacks(prototype, quantity.min(world_cap)) {
            out.drops.push(ResolvedDrop {
                item_ref: item_ref.to_string(),
                quantity: stack.amount,
                route: Route::World,
                stack,
            });
        }
        true
    }

    fn announce(
        &self,
        tier: &RarityTier,
        item_name: &str,
        quantity: u32,
        original_chance: f64,
    ) -> Option<Announcement> {
        match (self.announcer, self.killer) {
            (Some(announcer), Some(killer)) => Some(announcer.announce(
                tier,
                item_name,
                quantity,
                killer,
                self.luck,
                original_chance,
            )),
            (Some(_), None) => None,
            (None, killer) => {
                let anonymous = ActorRef::new("", "");
                let actor = killer.unwrap_or(&anonymous);
                Some(Announcement {
                    tier_id: tier.id.clone(),
                    message: render_message(
                        tier,
                        item_name,
                        quantity,
                        actor,
                        self.luck,
                        original_chance,
                    ),
                    sound: tier.sound.clone(),
                    broadcast: tier.broadcast,
                    recipients: Vec::new(),
                })
            }
        }
    }

    /// Re-emits the event's original drops with the quantity multiplier.
    ///
    /// No chance roll and no announcement.
    pub fn restore(&self, originals: &[ItemStack], out: &mut Resolution) {
        let amount_multiplier = floor_at_least_one(self.multiplier);
        for original in originals {
            let quantity = original.amount.saturating_mul(amount_multiplier);
            if quantity == 0 {
                continue;
            }
            let prototype = original.with_amount(1);
            self.route(&original.item_id, &prototype, quantity, out);
        }
        out.restored = true;
        tracing::debug!(stacks = originals.len(), amount_multiplier, "original drops restored");
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregate over repeated simulated kills.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DropStatistics {
    /// Kills simulated.
    pub iterations: u64,
    /// Kills that produced at least one drop.
    pub kills_with_drops: u64,
    /// Total items per item reference.
    pub item_totals: BTreeMap<String, u64>,
    /// Announcements per tier id.
    pub tier_counts: BTreeMap<String, u64>,
}

impl DropStatistics {
    /// Folds one kill into the aggregate.
    pub fn record(&mut self, resolution: &Resolution) {
        self.iterations += 1;
        if !resolution.is_empty() {
            self.kills_with_drops += 1;
        }
        for (item, total) in resolution.totals() {
            *self.item_totals.entry(item).or_insert(0) += total;
        }
        for announcement in &resolution.announcements {
            *self.tier_counts.entry(announcement.tier_id.clone()).or_insert(0) += 1;
        }
    }

    /// Fraction of kills that dropped anything.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fire_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.kills_with_drops as f64 / self.iterations as f64
        }
    }

    /// Mean items per kill for `item_ref`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_per_kill(&self, item_ref: &str) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        self.item_totals.get(item_ref).copied().unwrap_or(0) as f64 / self.iterations as f64
    }
}
