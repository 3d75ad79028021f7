//! Sort order applied to encoded bytes.

use std::cmp::Ordering;
use std::fmt;

/// The direction an encoded value sorts in.
///
/// Codecs produce an ascending encoding and then pass every byte through
/// [`Order::apply`]. Flipping all bits reverses unsigned lexicographic order,
/// so a descending encoding sorts exactly opposite to the ascending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Natural order.
    #[default]
    Ascending,
    /// Reversed order.
    Descending,
}

const MASK: u8 = 0xff;

impl Order {
    /// Transform one encoded byte.
    #[inline]
    pub fn apply(self, b: u8) -> u8 {
        match self {
            Order::Ascending => b,
            Order::Descending => b ^ MASK,
        }
    }

    /// Transform a run of encoded bytes in place.
    pub fn apply_slice(self, bytes: &mut [u8]) {
        if self == Order::Descending {
            for b in bytes.iter_mut() {
                *b ^= MASK;
            }
        }
    }

    /// Adjust a comparison of natural values to this order.
    pub fn cmp(self, ordering: Ordering) -> Ordering {
        match self {
            Order::Ascending => ordering,
            Order::Descending => ordering.reverse(),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Ascending => write!(f, "ASCENDING"),
            Order::Descending => write!(f, "DESCENDING"),
        }
    }
}
