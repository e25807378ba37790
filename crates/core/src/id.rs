// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uuid-backed entity identifiers.
//!
//! Rows reference each other by id only; there are no pointers between
//! persistent entities.

/// Define a newtype ID wrapper around [`uuid::Uuid`].
///
/// Generates `new()` (random v4), `from_uuid()`, `as_uuid()`, `Display`
/// (hyphenated), `FromStr`, and serde as a plain uuid string.
///
/// ```ignore
/// define_uuid_id! {
///     /// Doc comment for the ID type.
///     pub struct TaskId;
/// }
/// ```
#[macro_export]
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(id: uuid::Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

define_uuid_id! {
    /// Unique identifier for a task instance.
    pub struct TaskId;
}

define_uuid_id! {
    /// Identifier of the workflow a task belongs to.
    pub struct WorkflowId;
}

define_uuid_id! {
    /// Unique identifier for a graph edge.
    pub struct EdgeId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
