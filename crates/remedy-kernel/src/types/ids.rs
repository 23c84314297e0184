//! Identifier newtypes
//!
//! Each kind of id is its own type so an incident id can never be passed
//! where a plan id is expected. All ids serialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Check for an empty identifier
            #[inline]
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Incident identifier, assigned by the ingestion path
    IncidentId
);
string_id!(
    /// Tenant identifier
    TenantId
);
string_id!(
    /// Correlation identifier supplied by the caller of a command
    CorrelationId
);
string_id!(
    /// Plan node identifier (the step name declared in the playbook)
    NodeId
);
string_id!(
    /// Plan identifier (ULID, sortable by creation)
    PlanId
);
string_id!(
    /// Orchestration run identifier (ULID, sortable by creation)
    RunId
);

impl PlanId {
    /// Generate a fresh plan id
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl RunId {
    /// Generate a fresh run id
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}
