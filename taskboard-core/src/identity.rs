//! Identity types for board entities.
//!
//! Rows confirmed by the store carry the UUID the store assigned. Rows created
//! optimistically carry a provisional identity until the store answers; the
//! two never compare equal and provisional identities never leave the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Server-assigned row identifier.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

const PROVISIONAL_PREFIX: &str = "temp-";

static NEXT_PROVISIONAL: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity for an entity the store has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProvisionalId(u64);

impl ProvisionalId {
    /// Allocate the next provisional identity.
    pub fn next() -> Self {
        Self(NEXT_PROVISIONAL.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PROVISIONAL_PREFIX, self.0)
    }
}

/// Either a confirmed store id or a provisional local id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Confirmed(EntityId),
    Provisional(ProvisionalId),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Confirmed(id) => write!(f, "{}", id),
            RecordKey::Provisional(id) => write!(f, "{}", id),
        }
    }
}

/// Error returned when parsing a record key from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record id: {0}")]
pub struct ParseRecordKeyError(pub String);

impl FromStr for RecordKey {
    type Err = ParseRecordKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix(PROVISIONAL_PREFIX) {
            return rest
                .parse::<u64>()
                .map(|n| RecordKey::Provisional(ProvisionalId(n)))
                .map_err(|_| ParseRecordKeyError(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(RecordKey::Confirmed)
            .map_err(|_| ParseRecordKeyError(s.to_string()))
    }
}

/// Defines a strongly-typed identity over [`RecordKey`].
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(RecordKey);

        impl $name {
            /// Wrap a store-assigned id.
            pub fn confirmed(id: EntityId) -> Self {
                Self(RecordKey::Confirmed(id))
            }

            /// Allocate a fresh provisional id.
            pub fn provisional() -> Self {
                Self(RecordKey::Provisional(ProvisionalId::next()))
            }

            pub fn from_provisional(id: ProvisionalId) -> Self {
                Self(RecordKey::Provisional(id))
            }

            pub fn key(&self) -> RecordKey {
                self.0
            }

            pub fn is_provisional(&self) -> bool {
                matches!(self.0, RecordKey::Provisional(_))
            }

            /// The store id, if this identity has been confirmed.
            pub fn as_uuid(&self) -> Option<EntityId> {
                match self.0 {
                    RecordKey::Confirmed(id) => Some(id),
                    RecordKey::Provisional(_) => None,
                }
            }

            pub fn provisional_id(&self) -> Option<ProvisionalId> {
                match self.0 {
                    RecordKey::Provisional(id) => Some(id),
                    RecordKey::Confirmed(_) => None,
                }
            }
        }

        impl From<EntityId> for $name {
            fn from(id: EntityId) -> Self {
                Self::confirmed(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ParseRecordKeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

record_id!(
    /// Identity of a board column.
    ColumnId
);

record_id!(
    /// Identity of a task.
    TaskId
);

/// The user a row belongs to. Row visibility in the store is scoped by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub EntityId);

impl OwnerId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> EntityId {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_ids_are_unique_and_distinct_from_confirmed() {
        let a = TaskId::provisional();
        let b = TaskId::provisional();
        assert_ne!(a, b);
        assert!(a.is_provisional());
        assert_eq!(a.as_uuid(), None);

        let confirmed = TaskId::confirmed(Uuid::now_v7());
        assert!(!confirmed.is_provisional());
        assert_ne!(a, confirmed);
    }

    #[test]
    fn provisional_ids_render_with_prefix() {
        let id = ColumnId::from_provisional(ProvisionalId(42));
        assert_eq!(id.to_string(), "temp-42");
        assert_eq!("temp-42".parse::<ColumnId>(), Ok(id));
    }

    #[test]
    fn confirmed_ids_round_trip_through_json() {
        let uuid = Uuid::now_v7();
        let id = TaskId::confirmed(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn garbage_ids_are_rejected() {
        assert!("temp-x".parse::<TaskId>().is_err());
        assert!("not-a-uuid".parse::<ColumnId>().is_err());
    }
}
