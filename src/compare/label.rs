//! Percentage-change labels

use rust_decimal::{Decimal, RoundingStrategy};

/// Label the change from `previous` to `current`.
///
/// A zero `previous` prints `current` as-is, without the two-decimal
/// formatting the other branches use. Existing comments depend on that
/// output, so it stays.
pub fn label(current: f64, previous: f64) -> String {
    if previous == 0.0 {
        format!("+{}%", current)
    } else if previous > current {
        format!("-{}%", two_places(previous - current))
    } else if current > previous {
        format!("+{}%", two_places(current - previous))
    } else {
        "No Change".to_string()
    }
}

/// Two decimals, rounding the exact binary value with ties away from zero.
/// `{:.2}` on the float would round exact ties to even.
fn two_places(value: f64) -> String {
    match Decimal::from_f64_retain(value) {
        Some(exact) => format!(
            "{:.2}",
            exact.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        ),
        None => format!("{:.2}", value),
    }
}
