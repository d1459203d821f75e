//! Link/route cost: a non-negative integer or the distinguished "infinity"
//! sentinel meaning unreachable. Modeled as an explicit sum type rather than
//! overloading a float so that "finite < infinity" and saturating addition
//! can't silently drift (see spec.md design notes on the dynamic typing of
//! costs).

use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

/// Wire sentinel for infinity (spec.md §4.2): 0xFFFF in a 16-bit field.
pub const WIRE_INFINITY: u16 = 0xFFFF;

/// Console rendering of infinity (spec.md §4.3 `display`).
pub const DISPLAY_INFINITY: u32 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Finite(u32),
    Infinity,
}

impl Cost {
    pub fn is_finite(self) -> bool {
        matches!(self, Cost::Finite(_))
    }

    /// Parse a console/topology-file cost token: the literal `inf`
    /// (case-insensitive) or a decimal integer. Negative integers and
    /// anything unparseable clamp to infinity, matching
    /// `update_link`'s documented leniency in spec.md §4.1.
    pub fn parse(token: &str) -> Cost {
        let token = token.trim();
        if token.eq_ignore_ascii_case("inf") {
            return Cost::Infinity;
        }
        match token.parse::<i64>() {
            Ok(value) if value >= 0 => Cost::Finite(value as u32),
            _ => Cost::Infinity,
        }
    }

    /// Decode a wire-format 16-bit cost field.
    pub fn from_wire(raw: u16) -> Cost {
        if raw == WIRE_INFINITY {
            Cost::Infinity
        } else {
            Cost::Finite(u32::from(raw))
        }
    }

    /// Encode to the wire's 16-bit field, clamping any finite cost large
    /// enough to collide with the `WIRE_INFINITY` sentinel.
    pub fn to_wire(self) -> u16 {
        match self {
            Cost::Infinity => WIRE_INFINITY,
            Cost::Finite(v) => v.min(u32::from(WIRE_INFINITY - 1)) as u16,
        }
    }

    /// Value printed by the console `display` command.
    pub fn to_display(self) -> u32 {
        match self {
            Cost::Infinity => DISPLAY_INFINITY,
            Cost::Finite(v) => v,
        }
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cost::Infinity, Cost::Infinity) => Ordering::Equal,
            (Cost::Infinity, Cost::Finite(_)) => Ordering::Greater,
            (Cost::Finite(_), Cost::Infinity) => Ordering::Less,
            (Cost::Finite(a), Cost::Finite(b)) => a.cmp(b),
        }
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Finite(a), Cost::Finite(b)) => Cost::Finite(a.saturating_add(b)),
            _ => Cost::Infinity,
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Infinity => write!(f, "inf"),
            Cost::Finite(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_inf_token_case_insensitively() {
        assert_eq!(Cost::parse("inf"), Cost::Infinity);
        assert_eq!(Cost::parse("INF"), Cost::Infinity);
        assert_eq!(Cost::parse(" Inf "), Cost::Infinity);
    }

    #[test]
    fn parse_clamps_negative_to_infinity() {
        assert_eq!(Cost::parse("-5"), Cost::Infinity);
    }

    #[test]
    fn finite_is_strictly_less_than_infinity() {
        assert!(Cost::Finite(1_000_000) < Cost::Infinity);
        assert!(Cost::Finite(0) < Cost::Infinity);
    }

    #[test]
    fn add_saturates_to_infinity() {
        assert_eq!(Cost::Finite(3) + Cost::Finite(4), Cost::Finite(7));
        assert_eq!(Cost::Finite(3) + Cost::Infinity, Cost::Infinity);
        assert_eq!(Cost::Infinity + Cost::Infinity, Cost::Infinity);
    }

    #[test]
    fn wire_roundtrip_for_finite_and_infinite() {
        assert_eq!(Cost::from_wire(Cost::Finite(7).to_wire()), Cost::Finite(7));
        assert_eq!(Cost::from_wire(Cost::Infinity.to_wire()), Cost::Infinity);
    }

    #[test]
    fn display_rendering_matches_console_contract() {
        assert_eq!(Cost::Finite(10).to_display(), 10);
        assert_eq!(Cost::Infinity.to_display(), DISPLAY_INFINITY);
    }
}
