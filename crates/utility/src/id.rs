use std::{fmt, hash, marker::PhantomData};

use serde::{Deserialize, Serialize};

/// Marker trait for entities that are identified by a bare `i64` primary key.
///
/// Mirrors the phantom-typed id wrapper used throughout the store layer, but
/// specialized to the single id representation every AUBus entity needs —
/// there is no multi-origin id merging here, just a primary key.
pub trait HasId {}

pub struct Id<T: HasId>(i64, PhantomData<T>);

impl<T: HasId> Id<T> {
    pub fn new(raw: i64) -> Self {
        Self(raw, PhantomData)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl<T: HasId> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.0).finish()
    }
}

impl<T: HasId> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: HasId> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: HasId> Copy for Id<T> {}

impl<T: HasId> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: HasId> Eq for Id<T> {}

impl<T: HasId> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: HasId> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: HasId> hash::Hash for Id<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl<'de, T: HasId> Deserialize<'de> for Id<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        i64::deserialize(deserializer).map(Id::new)
    }
}

impl<T: HasId> Serialize for Id<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}
