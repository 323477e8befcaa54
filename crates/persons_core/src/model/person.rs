//! Person domain model.
//!
//! # Responsibility
//! - Define the persisted `Person` record and its `PersonProperties` draft.
//! - Own the merge rule used by partial updates.
//!
//! # Invariants
//! - `id` is assigned by the store and never supplied on creation.
//! - A value without an `id` is a draft (`PersonProperties`), not a `Person`.
//! - Merge treats empty strings and zero age as "not supplied".

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned identity of a persisted person.
pub type PersonId = i64;

/// Mutable part of a person record.
///
/// Used both as a creation payload and as a partial-update payload. Fields
/// missing from a deserialized payload default to empty/zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonProperties {
    pub name: String,
    pub age: i32,
    pub address: String,
    pub work: String,
}

/// Persisted person record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    #[serde(flatten)]
    pub properties: PersonProperties,
}

/// Validation failures detected before a write reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonValidationError {
    /// `age` is below zero.
    NegativeAge(i32),
}

impl Display for PersonValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativeAge(age) => write!(f, "person age must not be negative, got {age}"),
        }
    }
}

impl Error for PersonValidationError {}

impl PersonProperties {
    pub fn new(
        name: impl Into<String>,
        age: i32,
        address: impl Into<String>,
        work: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            age,
            address: address.into(),
            work: work.into(),
        }
    }

    /// Checks the properties a stored row must satisfy.
    ///
    /// Mirrors the column constraints of the `persons` table, so empty text
    /// fields are accepted.
    ///
    /// # Errors
    /// - `NegativeAge` when `age < 0`.
    pub fn validate(&self) -> Result<(), PersonValidationError> {
        if self.age < 0 {
            return Err(PersonValidationError::NegativeAge(self.age));
        }
        Ok(())
    }

    /// Returns `self` with every supplied field of `patch` applied.
    ///
    /// A field counts as supplied when it is a non-empty string or a non-zero
    /// age. Everything else keeps the current value.
    pub fn merged_with(&self, patch: &PersonProperties) -> PersonProperties {
        PersonProperties {
            name: pick_text(&self.name, &patch.name),
            age: if patch.age != 0 { patch.age } else { self.age },
            address: pick_text(&self.address, &patch.address),
            work: pick_text(&self.work, &patch.work),
        }
    }
}

impl Person {
    pub fn new(id: PersonId, properties: PersonProperties) -> Self {
        Self { id, properties }
    }

    /// Applies a partial update in place. See [`PersonProperties::merged_with`].
    pub fn update_by(&mut self, patch: &PersonProperties) {
        self.properties = self.properties.merged_with(patch);
    }
}

fn pick_text(current: &str, supplied: &str) -> String {
    if supplied.is_empty() {
        current.to_string()
    } else {
        supplied.to_string()
    }
}
