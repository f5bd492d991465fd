//! Identifier newtypes.
//!
//! Every entity key is a string on the wire, but mixing a student id with an
//! offering id is always a bug, so each gets its own type.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of any authenticated user (student entry number,
    /// instructor id, admin login).
    UserId
);
string_id!(
    /// Student entry number, e.g. `2021CSB1001`.
    StudentId
);
string_id!(
    /// Instructor identifier. Advisors are instructors too.
    InstructorId
);
string_id!(
    /// Catalog key of a course, e.g. `CS301`.
    CourseCode
);
string_id!(OfferingId);
string_id!(EnrollmentId);
string_id!(AlertId);

impl From<&UserId> for StudentId {
    fn from(id: &UserId) -> Self {
        Self(id.0.clone())
    }
}

impl From<&UserId> for InstructorId {
    fn from(id: &UserId) -> Self {
        Self(id.0.clone())
    }
}

impl PartialEq<UserId> for StudentId {
    fn eq(&self, other: &UserId) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<UserId> for InstructorId {
    fn eq(&self, other: &UserId) -> bool {
        self.0 == other.0
    }
}
