//! # Rarity Classification & Announcements
//!
//! Decides which drops are rare enough to announce and renders the message.
//!
//! ## Tier Selection
//!
//! Tiers are sorted by `max_chance` descending. The first enabled tier with
//! `min_chance <= chance < max_chance` wins; the chance used is the drop's
//! ORIGINAL chance, before luck.
//!
//! ```text
//! occasional   [0.10,     0.20)
//! rare         [0.02,     0.10)
//! extraordinary[0.001,    0.02)
//! pray         [0.0002,   0.001)     broadcast
//! incarnate    [0.00005,  0.0002)    broadcast
//! insane       [0.000005, 0.00005)   broadcast
//! unleashed    [0,        0.000005)  broadcast
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::integration::{base_identifier, ActorId, ActorRef, Audience, CatalogItem};

/// One configured rarity bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct RarityTier {
    /// Tier key from the config file.
    pub id: String,
    /// Disabled tiers never match.
    pub enabled: bool,
    /// Inclusive lower chance bound.
    pub min_chance: f64,
    /// Exclusive upper chance bound.
    pub max_chance: f64,
    /// Message template with `{item}`, `{amount}`, `{chance}`, `{player}`, `{magicfind}`.
    pub message: String,
    /// Sound identifier.
    pub sound: String,
    /// Sound volume.
    pub volume: f32,
    /// Sound pitch.
    pub pitch: f32,
    /// Deliver to every connected actor instead of only the killer.
    pub broadcast: bool,
}

impl RarityTier {
    #[allow(clippy::too_many_arguments)]
    fn builtin(
        id: &str,
        min_chance: f64,
        max_chance: f64,
        message: &str,
        sound: &str,
        pitch: f32,
        broadcast: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            min_chance,
            max_chance,
            message: message.to_string(),
            sound: sound.to_string(),
            volume: 1.0,
            pitch,
            broadcast,
        }
    }

    /// Whether `0 <= min_chance < max_chance <= 1`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.min_chance >= 0.0 && self.min_chance < self.max_chance && self.max_chance <= 1.0
    }

    /// Whether this tier selects `chance`.
    #[inline]
    #[must_use]
    pub fn matches(&self, chance: f64) -> bool {
        self.enabled && chance >= self.min_chance && chance < self.max_chance
    }
}

/// Immutable, sorted list of rarity tiers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RarityTable {
    tiers: Vec<RarityTier>,
}

impl RarityTable {
    /// Sorts `tiers` by `max_chance` descending (stable for ties).
    #[must_use]
    pub fn new(mut tiers: Vec<RarityTier>) -> Self {
        tiers.sort_by(|a, b| b.max_chance.total_cmp(&a.max_chance));
        Self { tiers }
    }

    /// The built-in seven-tier set.
    #[must_use]
    pub fn defaults() -> Self {
        Self::new(vec![
            RarityTier::builtin(
                "occasional",
                0.10,
                0.20,
                "&9Occasional DROP! {item} &ex{amount} &f{chance}",
                "slayerdrop.occasional_drop",
                1.0,
                false,
            ),
            RarityTier::builtin(
                "rare",
                0.02,
                0.10,
                "&5Rare DROP! {item} &ex{amount} &f{chance}",
                "slayerdrop.occasional_drop",
                1.0,
                false,
            ),
            RarityTier::builtin(
                "extraordinary",
                0.001,
                0.02,
                "&6Extraordinary DROP! {item} &ex{amount} &f{chance}",
                "slayerdrop.rare_drop",
                1.0,
                false,
            ),
            RarityTier::builtin(
                "pray",
                0.0002,
                0.001,
                "&dPray RNGesus DROP! {item} &ex{amount} &f{chance} &f- &b{player}",
                "slayerdrop.pray_rngesus_drop",
                1.0,
                true,
            ),
            RarityTier::builtin(
                "incarnate",
                0.000_05,
                0.0002,
                "&cRNGesus Incarnate DROP! {item} &ex{amount} &f{chance} &f- &b{player}",
                "slayerdrop.pray_rngesus_drop",
                1.0,
                true,
            ),
            RarityTier::builtin(
                "insane",
                0.000_005,
                0.000_05,
                "&4RNGesus Insane DROP! {item} &ex{amount} &f{chance} &f- &b{player}",
                "slayerdrop.rngesus_incarnate_drop",
                1.0,
                true,
            ),
            RarityTier::builtin(
                "unleashed",
                0.0,
                0.000_005,
                "&5&lRNGesus Unleashed DROP! &r{item} &ex{amount} &f{chance} &f- &b{player}",
                "slayerdrop.rngesus_incarnate_drop",
                1.5,
                true,
            ),
        ])
    }

    /// Tiers in selection order.
    #[must_use]
    pub fn tiers(&self) -> &[RarityTier] {
        &self.tiers
    }

    /// First enabled tier containing `original_chance`.
    #[must_use]
    pub fn classify(&self, original_chance: f64) -> Option<&RarityTier> {
        self.tiers.iter().find(|tier| tier.matches(original_chance))
    }

    /// Pairs of enabled tiers whose ranges overlap.
    #[must_use]
    pub fn overlaps(&self) -> Vec<(String, String)> {
        let enabled: Vec<&RarityTier> = self.tiers.iter().filter(|t| t.enabled).collect();
        let mut found = Vec::new();
        for (i, a) in enabled.iter().enumerate() {
            for b in &enabled[i + 1..] {
                if a.min_chance < b.max_chance && b.min_chance < a.max_chance {
                    found.push((a.id.clone(), b.id.clone()));
                }
            }
        }
        found
    }
}

// ============================================================================
// Blacklists
// ============================================================================

/// Items and tables whose drops are never announced.
///
/// Blacklisting suppresses announcements only, never luck scaling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blacklist {
    items: HashSet<String>,
    tables: HashSet<String>,
}

impl Blacklist {
    /// Builds a blacklist. Item identifiers are upper-cased.
    #[must_use]
    pub fn new<I, T>(items: I, tables: T) -> Self
    where
        I: IntoIterator<Item = String>,
        T: IntoIterator<Item = String>,
    {
        Self {
            items: items.into_iter().map(|i| i.to_uppercase()).collect(),
            tables: tables.into_iter().collect(),
        }
    }

    /// Whether an item reference is blacklisted, by base identifier or verbatim.
    #[must_use]
    pub fn is_item_blacklisted(&self, item_ref: &str) -> bool {
        self.items.contains(&base_identifier(item_ref)) || self.items.contains(item_ref)
    }

    /// Whether a drop table is blacklisted.
    #[must_use]
    pub fn is_table_blacklisted(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Number of blacklisted items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Number of blacklisted tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

// ============================================================================
// Message rendering
// ============================================================================

/// Formats the luck-adjusted chance for `{chance}`, e.g. `15.0%`.
///
/// Precision grows as the chance shrinks: one decimal from 10%, two from 1%,
/// three below.
#[must_use]
pub fn format_display_chance(original_chance: f64, luck: f64) -> String {
    let percent = (original_chance * (1.0 + luck / 100.0)).clamp(0.0, 1.0) * 100.0;
    if percent >= 10.0 {
        format!("{percent:.1}%")
    } else if percent >= 1.0 {
        format!("{percent:.2}%")
    } else {
        format!("{percent:.3}%")
    }
}

/// Formats luck for `{magicfind}`, rounded to a whole percent.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_luck(luck: f64) -> String {
    format!("{}%", luck.round() as i64)
}

const COLOR_CODES: &str = "0123456789AaBbCcDdEeFfKkLlMmNnOoRrXx";

/// Translates `&`-prefixed colour codes to the section-sign form.
#[must_use]
pub fn translate_color_codes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&code) if c == '&' && COLOR_CODES.contains(code) => {
                out.push('\u{a7}');
                out.push(code.to_ascii_lowercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// `DIAMOND_SWORD` -> `Diamond Sword`.
#[must_use]
pub fn prettify_material(base_id: &str) -> String {
    base_id
        .to_lowercase()
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name shown for `{item}`.
///
/// Catalog display name, else the prettified material name, else the raw
/// identifier.
#[must_use]
pub fn display_name(item_ref: &str, item: &CatalogItem) -> String {
    match item.display_name.as_deref() {
        Some(name) if !name.is_empty() => translate_color_codes(name),
        _ if item.base_material => prettify_material(&base_identifier(item_ref)),
        _ => item_ref.to_string(),
    }
}

/// Substitutes all placeholders into a tier template.
#[must_use]
pub fn render_message(
    tier: &RarityTier,
    item_name: &str,
    quantity: u32,
    actor: &ActorRef,
    luck: f64,
    original_chance: f64,
) -> String {
    translate_color_codes(&tier.message)
        .replace("{item}", item_name)
        .replace("{amount}", &quantity.to_string())
        .replace("{chance}", &format_display_chance(original_chance, luck))
        .replace("{player}", &actor.name)
        .replace("{magicfind}", &format_luck(luck))
}

// ============================================================================
// Announcer
// ============================================================================

/// Built-in sounds used when a configured sound cannot be played.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CannedSound {
    /// Dramatic growl.
    DragonGrowl,
    /// Level-up chime.
    LevelUp,
    /// Experience pickup blip.
    ExperiencePickup,
}

impl CannedSound {
    /// Picks the fallback for a failed sound identifier.
    #[must_use]
    pub fn fallback_for(sound: &str) -> Self {
        if sound.contains("incarnate") {
            Self::DragonGrowl
        } else if sound.contains("rare") || sound.contains("pray") {
            Self::LevelUp
        } else {
            Self::ExperiencePickup
        }
    }

    /// Host identifier of the sound.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DragonGrowl => "ENTITY_ENDER_DRAGON_GROWL",
            Self::LevelUp => "ENTITY_PLAYER_LEVELUP",
            Self::ExperiencePickup => "ENTITY_EXPERIENCE_ORB_PICKUP",
        }
    }
}

/// Record of one announcement that was dispatched.
#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    /// Selected tier.
    pub tier_id: String,
    /// Rendered message.
    pub message: String,
    /// Configured sound identifier.
    pub sound: String,
    /// Whether it went to everyone.
    pub broadcast: bool,
    /// Who received it.
    pub recipients: Vec<ActorId>,
}

/// Dispatches rare-drop messages and sounds.
#[derive(Clone)]
pub struct Announcer {
    audience: Arc<dyn Audience>,
}

impl Announcer {
    /// Creates an announcer delivering through `audience`.
    #[must_use]
    pub fn new(audience: Arc<dyn Audience>) -> Self {
        Self { audience }
    }

    /// Renders and delivers an announcement for a classified drop.
    pub fn announce(
        &self,
        tier: &RarityTier,
        item_name: &str,
        quantity: u32,
        killer: &ActorRef,
        luck: f64,
        original_chance: f64,
    ) -> Announcement {
        let message = render_message(tier, item_name, quantity, killer, luck, original_chance);

        let recipients = if tier.broadcast {
            self.audience.online_actors()
        } else {
            vec![killer.clone()]
        };

        for recipient in &recipients {
            self.audience.send_message(recipient, &message);
            self.play_with_fallback(recipient, tier);
        }

        tracing::debug!(tier = %tier.id, recipients = recipients.len(), "rare drop announced");

        Announcement {
            tier_id: tier.id.clone(),
            message,
            sound: tier.sound.clone(),
            broadcast: tier.broadcast,
            recipients: recipients.into_iter().map(|r| r.id).collect(),
        }
    }

    fn play_with_fallback(&self, recipient: &ActorRef, tier: &RarityTier) {
        let Err(first) = self
            .audience
            .play_sound(recipient, &tier.sound, tier.volume, tier.pitch)
        else {
            return;
        };

        let fallback = CannedSound::fallback_for(&tier.sound);
        if let Err(second) =
            self.audience
                .play_sound(recipient, fallback.as_str(), tier.volume, tier.pitch)
        {
            tracing::debug!(%first, %second, "rare drop sound unavailable");
        }
    }
}

impl std::fmt::Debug for Announcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Announcer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingAudience;

    #[test]
    fn test_default_tiers_are_sorted_and_disjoint() {
        let table = RarityTable::defaults();
        assert_eq!(table.tiers().len(), 7);
        assert!(table
            .tiers()
            .windows(2)
            .all(|w| w[0].max_chance >= w[1].max_chance));
        assert!(table.tiers().iter().all(RarityTier::is_well_formed));
        assert!(table.overlaps().is_empty());
    }

    #[test]
    fn test_classify_boundaries() {
        let table = RarityTable::defaults();
        assert_eq!(table.classify(0.15).map(|t| t.id.as_str()), Some("occasional"));
        assert_eq!(table.classify(0.10).map(|t| t.id.as_str()), Some("occasional"));
        assert_eq!(table.classify(0.0999).map(|t| t.id.as_str()), Some("rare"));
        assert_eq!(table.classify(0.0).map(|t| t.id.as_str()), Some("unleashed"));
        assert_eq!(table.classify(0.20), None);
        assert_eq!(table.classify(0.5), None);
        assert_eq!(table.classify(1.0), None);
    }

    #[test]
    fn test_at_most_one_tier_matches() {
        let table = RarityTable::defaults();
        for i in 0..=10_000 {
            let chance = f64::from(i) / 10_000.0;
            let matching = table.tiers().iter().filter(|t| t.matches(chance)).count();
            assert!(matching <= 1, "chance {chance} matched {matching} tiers");
        }
    }

    #[test]
    fn test_disabled_tier_is_skipped() {
        let mut tiers = RarityTable::defaults().tiers().to_vec();
        tiers[0].enabled = false;
        let table = RarityTable::new(tiers);
        assert_eq!(table.classify(0.15), None);
    }

    #[test]
    fn test_overlap_detection() {
        let mut tiers = RarityTable::defaults().tiers().to_vec();
        tiers[1].max_chance = 0.15;
        let table = RarityTable::new(tiers);
        assert_eq!(
            table.overlaps(),
            vec![("occasional".to_string(), "rare".to_string())]
        );
    }

    #[test]
    fn test_display_chance_precision() {
        assert_eq!(format_display_chance(0.15, 0.0), "15.0%");
        assert_eq!(format_display_chance(0.05, 0.0), "5.00%");
        assert_eq!(format_display_chance(0.001, 0.0), "0.100%");
        assert_eq!(format_display_chance(0.05, 100.0), "10.0%");
        assert_eq!(format_display_chance(0.8, 100.0), "100.0%");
    }

    #[test]
    fn test_luck_rounds_to_whole_percent() {
        assert_eq!(format_luck(149.6), "150%");
        assert_eq!(format_luck(0.0), "0%");
    }

    #[test]
    fn test_color_codes() {
        assert_eq!(translate_color_codes("&9Hi &Lthere"), "\u{a7}9Hi \u{a7}lthere");
        assert_eq!(translate_color_codes("a & b &"), "a & b &");
        assert_eq!(translate_color_codes("&zx"), "&zx");
    }

    #[test]
    fn test_prettify_material() {
        assert_eq!(prettify_material("DIAMOND_SWORD"), "Diamond Sword");
        assert_eq!(prettify_material("DIAMOND"), "Diamond");
    }

    #[test]
    fn test_display_name_resolution() {
        let mut item = CatalogItem {
            id: "DIAMOND_SWORD".to_string(),
            display_name: None,
            max_stack_size: 1,
            custom_model_data: None,
            base_material: true,
        };
        assert_eq!(display_name("diamond_sword", &item), "Diamond Sword");

        item.display_name = Some("&6Excalibur".to_string());
        assert_eq!(display_name("diamond_sword", &item), "\u{a7}6Excalibur");

        item.display_name = None;
        item.base_material = false;
        assert_eq!(display_name("KingsBlade", &item), "KingsBlade");
    }

    #[test]
    fn test_render_message_substitutes_everything() {
        let tier = RarityTier {
            message: "{item} x{amount} {chance} {player} {magicfind}".to_string(),
            ..RarityTable::defaults().tiers()[0].clone()
        };
        let actor = ActorRef::new("id", "Steve");
        let message = render_message(&tier, "Diamond", 3, &actor, 50.0, 0.1);
        assert_eq!(message, "Diamond x3 15.0% Steve 50%");
    }

    #[test]
    fn test_blacklist_matches_base_and_verbatim() {
        let blacklist = Blacklist::new(
            vec!["dirt".to_string(), "Custom{x}".to_string()],
            vec!["junk_table".to_string()],
        );
        assert!(blacklist.is_item_blacklisted("DIRT"));
        assert!(blacklist.is_item_blacklisted("dirt{display:\"Mud\"}"));
        assert!(blacklist.is_item_blacklisted("CUSTOM{X}"));
        assert!(!blacklist.is_item_blacklisted("STONE"));
        assert!(blacklist.is_table_blacklisted("junk_table"));
        assert!(!blacklist.is_table_blacklisted("JUNK_TABLE"));
    }

    #[test]
    fn test_fallback_sound_selection() {
        assert_eq!(
            CannedSound::fallback_for("slayerdrop.rngesus_incarnate_drop"),
            CannedSound::DragonGrowl
        );
        assert_eq!(CannedSound::fallback_for("slayerdrop.rare_drop"), CannedSound::LevelUp);
        assert_eq!(
            CannedSound::fallback_for("slayerdrop.pray_rngesus_drop"),
            CannedSound::LevelUp
        );
        assert_eq!(
            CannedSound::fallback_for("slayerdrop.occasional_drop"),
            CannedSound::ExperiencePickup
        );
    }

    #[test]
    fn test_private_announcement_goes_to_killer_only() {
        let audience = Arc::new(RecordingAudience::new());
        audience.connect(ActorRef::new("other", "Alex"));
        let killer = ActorRef::new("killer", "Steve");
        audience.connect(killer.clone());

        let announcer = Announcer::new(audience.clone());
        let tier = RarityTable::defaults().classify(0.05).unwrap().clone();
        let announcement = announcer.announce(&tier, "Diamond", 2, &killer, 0.0, 0.05);

        assert!(!announcement.broadcast);
        assert_eq!(announcement.recipients, vec![killer.id.clone()]);
        assert_eq!(audience.messages_for(&killer.id).len(), 1);
        assert!(audience.messages_for(&ActorId::new("other")).is_empty());
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let audience = Arc::new(RecordingAudience::new());
        audience.connect(ActorRef::new("a", "Alex"));
        audience.connect(ActorRef::new("b", "Steve"));

        let announcer = Announcer::new(audience.clone());
        let tier = RarityTable::defaults().classify(0.0005).unwrap().clone();
        let killer = ActorRef::new("b", "Steve");
        let announcement = announcer.announce(&tier, "Relic", 1, &killer, 0.0, 0.0005);

        assert!(announcement.broadcast);
        assert_eq!(announcement.recipients.len(), 2);
        assert!(announcement.message.ends_with("Steve"));
    }

    #[test]
    fn test_failed_sound_falls_back_once() {
        let audience = Arc::new(RecordingAudience::new());
        let killer = ActorRef::new("k", "Steve");
        audience.connect(killer.clone());
        audience.reject_sound("slayerdrop.rare_drop");

        let announcer = Announcer::new(audience.clone());
        let tier = RarityTable::defaults().classify(0.01).unwrap().clone();
        announcer.announce(&tier, "Gem", 1, &killer, 0.0, 0.01);

        assert_eq!(
            audience.sounds_for(&killer.id),
            vec![CannedSound::LevelUp.as_str().to_string()]
        );
    }

    #[test]
    fn test_second_sound_failure_is_swallowed() {
        let audience = Arc::new(RecordingAudience::new());
        let killer = ActorRef::new("k", "Steve");
        audience.connect(killer.clone());
        audience.reject_sound("slayerdrop.occasional_drop");
        audience.reject_sound(CannedSound::ExperiencePickup.as_str());

        let announcer = Announcer::new(audience.clone());
        let tier = RarityTable::defaults().classify(0.15).unwrap().clone();
        let announcement = announcer.announce(&tier, "Gem", 1, &killer, 0.0, 0.15);

        assert_eq!(announcement.recipients.len(), 1);
        assert!(audience.sounds_for(&killer.id).is_empty());
        assert_eq!(audience.messages_for(&killer.id).len(), 1);
    }
}
