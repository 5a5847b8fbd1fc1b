//! # Drop Line Parser
//!
//! Turns one raw `Drops` line into a [`DropDefinition`].
//!
//! ```text
//! <item> [quantity] [chance]
//! DIAMOND 2-4 0.5
//! rare_table 1to3 0.05
//! GOLD_NUGGET 1 to 3 0.25
//! ```
//!
//! Parsing never fails. Malformed tokens degrade to the defaults below, so a
//! broken line drops as "guaranteed 1x" instead of aborting the whole kill:
//!
//! | Token     | Missing | Unparsable | Notes                                  |
//! |-----------|---------|------------|----------------------------------------|
//! | quantity  | `1`     | `Fixed(1)` | range halves that fail become `1`      |
//! | chance    | `1.0`   | `1.0`      | negative clamps to `0.0`               |

use rand::Rng;

use crate::integration::ItemCatalog;

/// How many items a drop line yields (or how often a table repeats).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantitySpec {
    /// Exactly this many.
    Fixed(u32),
    /// Uniformly sampled from `min..=max`.
    Range {
        /// Inclusive lower bound.
        min: u32,
        /// Inclusive upper bound.
        max: u32,
    },
}

impl Default for QuantitySpec {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl QuantitySpec {
    /// Creates a range, swapping reversed bounds.
    #[must_use]
    pub fn range(a: u32, b: u32) -> Self {
        Self::Range {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Parses a quantity token.
    ///
    /// Integer literal -> `Fixed`; `a-b`, `atob` or `a to b` -> `Range`;
    /// anything else -> `Fixed(1)`.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if let Ok(n) = token.parse::<u32>() {
            return Self::Fixed(n);
        }

        let normalized = token.to_ascii_lowercase().replace("to", "-");
        if !normalized.contains('-') {
            return Self::Fixed(1);
        }

        let mut halves = normalized.split('-');
        let low = parse_bound(halves.next());
        let high = parse_bound(halves.next());
        Self::range(low, high)
    }

    /// Samples a concrete amount.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            Self::Fixed(n) => n,
            Self::Range { min, max } if min >= max => min,
            Self::Range { min, max } => rng.gen_range(min..=max),
        }
    }
}

fn parse_bound(half: Option<&str>) -> u32 {
    half.and_then(|h| h.trim().parse::<u32>().ok()).unwrap_or(1)
}

/// Parses a chance token: a non-negative decimal, `1.0` if unparsable.
#[must_use]
pub fn parse_chance(token: &str) -> f64 {
    match token.trim().parse::<f64>() {
        Ok(chance) if chance.is_finite() => chance.max(0.0),
        _ => 1.0,
    }
}

/// One structured drop line.
#[derive(Clone, Debug, PartialEq)]
pub struct DropDefinition {
    /// Item identifier or drop table name.
    pub item_ref: String,
    /// Quantity, or repeat count for a table.
    pub quantity: QuantitySpec,
    /// Chance before luck is applied.
    pub base_chance: f64,
    /// Whether the identifier may name a drop table.
    ///
    /// True when it carries no template bracket and is not a base material.
    /// The engine still falls back to an item lookup when no such table exists.
    pub is_table_reference: bool,
}

/// Splits off the next whitespace-delimited field.
fn next_field(rest: &str) -> (&str, &str) {
    let rest = rest.trim_start();
    match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], rest[i..].trim_start()),
        None => (rest, ""),
    }
}

/// Parses a raw drop line. `None` for blanks, comments and experience lines.
#[must_use]
pub fn parse_line(line: &str, catalog: &dyn ItemCatalog) -> Option<DropDefinition> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let (item, rest) = next_field(trimmed);
    if item.eq_ignore_ascii_case("exp") || item.eq_ignore_ascii_case("experience") {
        return None;
    }

    let (quantity_token, rest) = next_field(rest);
    let (quantity, chance_token) = match next_field(rest) {
        // `a to b` spans three fields
        (sep, after) if sep.eq_ignore_ascii_case("to") && !quantity_token.is_empty() => {
            let (upper, chance) = next_field(after);
            (
                QuantitySpec::parse(&format!("{quantity_token}-{upper}")),
                chance.trim(),
            )
        }
        _ if quantity_token.is_empty() => (QuantitySpec::default(), ""),
        _ => (QuantitySpec::parse(quantity_token), rest.trim()),
    };

    let base_chance = if chance_token.is_empty() {
        1.0
    } else {
        parse_chance(chance_token)
    };

    let is_table_reference =
        !item.contains('{') && !catalog.is_base_material(&item.to_uppercase());

    Some(DropDefinition {
        item_ref: item.to_string(),
        quantity,
        base_chance,
        is_table_reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCatalog;
    use rand::rngs::mock::StepRng;

    fn catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog.add_material("DIAMOND", 64);
        catalog.add_material("GOLD_NUGGET", 64);
        catalog
    }

    #[test]
    fn test_quantity_tokens() {
        assert_eq!(QuantitySpec::parse("3"), QuantitySpec::Fixed(3));
        assert_eq!(QuantitySpec::parse("0"), QuantitySpec::Fixed(0));
        assert_eq!(QuantitySpec::parse("2-4"), QuantitySpec::Range { min: 2, max: 4 });
        assert_eq!(QuantitySpec::parse("1to3"), QuantitySpec::Range { min: 1, max: 3 });
        assert_eq!(QuantitySpec::parse("5 to 7"), QuantitySpec::Range { min: 5, max: 7 });
    }

    #[test]
    fn test_malformed_quantity_defaults() {
        assert_eq!(QuantitySpec::parse("lots"), QuantitySpec::Fixed(1));
        assert_eq!(QuantitySpec::parse(""), QuantitySpec::Fixed(1));
        assert_eq!(QuantitySpec::parse("2.5"), QuantitySpec::Fixed(1));
        // bad halves become 1
        assert_eq!(QuantitySpec::parse("x-4"), QuantitySpec::Range { min: 1, max: 4 });
        assert_eq!(QuantitySpec::parse("3-y"), QuantitySpec::Range { min: 1, max: 3 });
        // a leading minus reads as a separator
        assert_eq!(QuantitySpec::parse("-3"), QuantitySpec::Range { min: 1, max: 3 });
        // reversed bounds are swapped
        assert_eq!(QuantitySpec::parse("9-2"), QuantitySpec::Range { min: 2, max: 9 });
    }

    #[test]
    fn test_chance_tokens() {
        assert!((parse_chance("0.25") - 0.25).abs() < f64::EPSILON);
        assert!((parse_chance("3") - 3.0).abs() < f64::EPSILON);
        assert!((parse_chance("often") - 1.0).abs() < f64::EPSILON);
        assert!((parse_chance("NaN") - 1.0).abs() < f64::EPSILON);
        assert!((parse_chance("inf") - 1.0).abs() < f64::EPSILON);
        assert!(parse_chance("-0.5").abs() < f64::EPSILON);
    }

    #[test]
    fn test_skipped_lines() {
        let catalog = catalog();
        assert_eq!(parse_line("", &catalog), None);
        assert_eq!(parse_line("   ", &catalog), None);
        assert_eq!(parse_line("# DIAMOND 1 1", &catalog), None);
        assert_eq!(parse_line("exp 100", &catalog), None);
        assert_eq!(parse_line("EXPERIENCE 5-10 0.5", &catalog), None);
    }

    #[test]
    fn test_full_line() {
        let def = parse_line("DIAMOND 2-4 0.5", &catalog()).unwrap();
        assert_eq!(def.item_ref, "DIAMOND");
        assert_eq!(def.quantity, QuantitySpec::Range { min: 2, max: 4 });
        assert!((def.base_chance - 0.5).abs() < f64::EPSILON);
        assert!(!def.is_table_reference);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let def = parse_line("diamond", &catalog()).unwrap();
        assert_eq!(def.quantity, QuantitySpec::Fixed(1));
        assert!((def.base_chance - 1.0).abs() < f64::EPSILON);
        // materials match case-insensitively
        assert!(!def.is_table_reference);
    }

    #[test]
    fn test_spaced_range_keeps_chance() {
        let def = parse_line("GOLD_NUGGET 1 to 3 0.25", &catalog()).unwrap();
        assert_eq!(def.quantity, QuantitySpec::Range { min: 1, max: 3 });
        assert!((def.base_chance - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trailing_garbage_degrades_chance() {
        // the chance field is the whole remainder of the line
        let def = parse_line("DIAMOND 1 0.5 extra", &catalog()).unwrap();
        assert!((def.base_chance - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_table_reference_classification() {
        let catalog = catalog();
        assert!(parse_line("somecraftable 1 1.0", &catalog).unwrap().is_table_reference);
        assert!(
            !parse_line("DIAMOND{display:\"Gem\"} 1 1.0", &catalog)
                .unwrap()
                .is_table_reference
        );
    }

    #[test]
    fn test_sample_stays_in_range() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(QuantitySpec::Range { min: 2, max: 4 }.sample(&mut rng), 2);
        assert_eq!(QuantitySpec::Fixed(7).sample(&mut rng), 7);

        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let n = QuantitySpec::Range { min: 2, max: 4 }.sample(&mut rng);
            assert!((2..=4).contains(&n));
        }
    }
}
