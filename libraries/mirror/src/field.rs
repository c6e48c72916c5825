//! Three-way optional fields for partial documents.
//!
//! A partial document coming from the remote side (or a local patch) has to distinguish between a field that was
//! not sent at all and a field that was explicitly sent as `null`. `Option<T>` collapses the two, so patches use
//! [`Field`] instead:
//!
//! | JSON                 | `Field`           | effect on an `Option<T>` |
//! |----------------------|-------------------|--------------------------|
//! | key missing          | `Field::Absent`   | unchanged                |
//! | `"key": null`        | `Field::Null`     | cleared                  |
//! | `"key": value`       | `Field::Value(v)` | set to `v`               |
//!
//! Struct fields of this type need `#[serde(default, skip_serializing_if = "Field::is_absent")]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_present(&self) -> bool {
        !self.is_absent()
    }

    /// Apply this field to an optional value. Returns whether the target was touched.
    pub fn apply_to(self, target: &mut Option<T>) -> bool {
        match self {
            Field::Absent => false,
            Field::Null => {
                *target = None;
                true
            }
            Field::Value(value) => {
                *target = Some(value);
                true
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Absent => Field::Absent,
            Field::Null => Field::Null,
            Field::Value(value) => Field::Value(f(value)),
        }
    }

    /// Present values become `Some(Option<T>)`, absent becomes `None`.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            Field::Absent => None,
            Field::Null => Some(None),
            Field::Value(value) => Some(Some(value)),
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Null, Field::Value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // only reachable without `skip_serializing_if`
            Field::Absent | Field::Null => serializer.serialize_none(),
            Field::Value(value) => serializer.serialize_some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Missing keys never reach this point, they take the `#[serde(default)]` path.
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}
