//! Domain identifiers (strongly-typed IDs).
//!
//! Item ids are assigned by the backing store (an auto-increment key), so the
//! inner value is a plain `i64`. The phantom marker keeps ids of different
//! collections from being mixed up at compile time while costing nothing at
//! runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Marker trait for each id kind.
///
/// Provides the prefix used by `Display` ("item-", ...).
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic store-assigned id.
///
/// `T` only exists at compile time (`PhantomData`).
///
/// # Example
/// ```ignore
/// let id: ItemId = Id::new(42);
/// assert_eq!(id.to_string(), "item-42");
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: i64,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub fn as_i64(&self) -> i64 {
        self.value
    }
}

impl<T: IdMarker> From<i64> for Id<T> {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.value)
    }
}

/// Marker for queue items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Item {}

impl IdMarker for Item {
    fn prefix() -> &'static str {
        "item-"
    }
}

/// Identifier of a queue item (one row of the item collection).
pub type ItemId = Id<Item>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        let id = ItemId::new(42);
        assert_eq!(id.to_string(), "item-42");
        assert_eq!(id.as_i64(), 42);
    }

    #[test]
    fn ids_order_by_value() {
        // FIFO tie-breaking relies on this ordering.
        assert!(ItemId::new(1) < ItemId::new(2));
        assert!(ItemId::new(-1) < ItemId::new(0));
    }

    #[test]
    fn serializes_as_bare_number() {
        let id = ItemId::new(7);
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "7");
        let back: ItemId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<ItemId>(), size_of::<i64>());
    }
}
