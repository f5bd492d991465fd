//! Enrollment status vocabulary and enrollment categories.
//!
//! The stored and wire representation is the human-readable string
//! (`"pending instructor approval"` etc.). Older records spell the two
//! student-initiated exits as `"student withdrawn"` / `"student dropped"`;
//! both spellings parse, the short one is written.
//!
//! `FromStr` is lenient for user input (case, underscores, short forms).
//! Stored rows go through [`EnrollmentStatus::from_stored`] instead, which
//! only takes what was ever written.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Current state of an enrollment's approval lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    #[serde(rename = "pending instructor approval")]
    PendingInstructor,
    #[serde(rename = "pending advisor approval")]
    PendingAdvisor,
    #[serde(rename = "enrolled")]
    Enrolled,
    #[serde(rename = "instructor rejected")]
    InstructorRejected,
    #[serde(rename = "advisor rejected")]
    AdvisorRejected,
    #[serde(rename = "withdrawn", alias = "student withdrawn")]
    Withdrawn,
    #[serde(rename = "dropped", alias = "student dropped")]
    Dropped,
    #[serde(rename = "completed")]
    Completed,
}

impl EnrollmentStatus {
    pub const ALL: [EnrollmentStatus; 8] = [
        Self::PendingInstructor,
        Self::PendingAdvisor,
        Self::Enrolled,
        Self::InstructorRejected,
        Self::AdvisorRejected,
        Self::Withdrawn,
        Self::Dropped,
        Self::Completed,
    ];

    /// The state every new enrollment starts in.
    pub const INITIAL: EnrollmentStatus = Self::PendingInstructor;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingInstructor => "pending instructor approval",
            Self::PendingAdvisor => "pending advisor approval",
            Self::Enrolled => "enrolled",
            Self::InstructorRejected => "instructor rejected",
            Self::AdvisorRejected => "advisor rejected",
            Self::Withdrawn => "withdrawn",
            Self::Dropped => "dropped",
            Self::Completed => "completed",
        }
    }

    /// Parse a persisted status: the canonical spellings plus the two
    /// legacy terminal ones.
    pub fn from_stored(s: &str) -> Result<Self, ParseError> {
        match s {
            "student withdrawn" => Ok(Self::Withdrawn),
            "student dropped" => Ok(Self::Dropped),
            _ => Self::ALL
                .into_iter()
                .find(|status| status.as_str() == s)
                .ok_or_else(|| ParseError {
                    kind: "stored enrollment status",
                    value: s.to_string(),
                }),
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::InstructorRejected
                | Self::AdvisorRejected
                | Self::Withdrawn
                | Self::Dropped
                | Self::Completed
        )
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingInstructor | Self::PendingAdvisor)
    }

    /// Active enrollments block a second request for the same offering.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::PendingInstructor | Self::PendingAdvisor | Self::Enrolled | Self::Completed
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string that is not part of a closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.value)
    }
}

impl std::error::Error for ParseError {}

impl FromStr for EnrollmentStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', " ");
        match normalized.as_str() {
            "pending instructor approval" | "pending instructor" => Ok(Self::PendingInstructor),
            "pending advisor approval" | "pending advisor" => Ok(Self::PendingAdvisor),
            "enrolled" => Ok(Self::Enrolled),
            "instructor rejected" => Ok(Self::InstructorRejected),
            "advisor rejected" => Ok(Self::AdvisorRejected),
            "withdrawn" | "student withdrawn" => Ok(Self::Withdrawn),
            "dropped" | "student dropped" => Ok(Self::Dropped),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseError {
                kind: "enrollment status",
                value: s.to_string(),
            }),
        }
    }
}

/// Category a student picks when requesting an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnrolType {
    #[serde(rename = "Credit")]
    Credit,
    #[serde(rename = "Audit")]
    Audit,
    #[serde(rename = "Credit for Concentration")]
    CreditForConcentration,
    #[serde(rename = "Remedial")]
    Remedial,
}

impl EnrolType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "Credit",
            Self::Audit => "Audit",
            Self::CreditForConcentration => "Credit for Concentration",
            Self::Remedial => "Remedial",
        }
    }

    /// Audit enrollments never contribute to credits or CGPA.
    pub fn counts_toward_cgpa(self) -> bool {
        !matches!(self, Self::Audit)
    }
}

impl fmt::Display for EnrolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrolType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(Self::Credit),
            "audit" => Ok(Self::Audit),
            "credit for concentration" => Ok(Self::CreditForConcentration),
            "remedial" => Ok(Self::Remedial),
            _ => Err(ParseError {
                kind: "enrollment type",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_parse_back() {
        for status in EnrollmentStatus::ALL {
            assert_eq!(status.as_str().parse::<EnrollmentStatus>(), Ok(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_legacy_spellings_are_accepted() {
        assert_eq!(
            "student withdrawn".parse::<EnrollmentStatus>(),
            Ok(EnrollmentStatus::Withdrawn)
        );
        let dropped: EnrollmentStatus = serde_json::from_str("\"student dropped\"").unwrap();
        assert_eq!(dropped, EnrollmentStatus::Dropped);
        assert_eq!(
            "PENDING_ADVISOR".parse::<EnrollmentStatus>(),
            Ok(EnrollmentStatus::PendingAdvisor)
        );
    }

    #[test]
    fn test_stored_status_takes_only_written_spellings() {
        for status in EnrollmentStatus::ALL {
            assert_eq!(EnrollmentStatus::from_stored(status.as_str()), Ok(status));
        }
        assert_eq!(
            EnrollmentStatus::from_stored("student withdrawn"),
            Ok(EnrollmentStatus::Withdrawn)
        );
        assert_eq!(
            EnrollmentStatus::from_stored("student dropped"),
            Ok(EnrollmentStatus::Dropped)
        );
        for loose in [
            "pending_instructor",
            "pending instructor",
            "PENDING ADVISOR APPROVAL",
            " enrolled",
            "student_dropped",
        ] {
            assert!(loose.parse::<EnrollmentStatus>().is_ok(), "{}", loose);
            assert!(EnrollmentStatus::from_stored(loose).is_err(), "{}", loose);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "approved".parse::<EnrollmentStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown enrollment status `approved`");
    }

    #[test]
    fn test_terminal_and_active_partition() {
        for status in EnrollmentStatus::ALL {
            if status.is_pending() {
                assert!(!status.is_terminal());
                assert!(status.is_active());
            }
        }
        assert!(EnrollmentStatus::Completed.is_terminal());
        assert!(EnrollmentStatus::Completed.is_active());
        assert!(!EnrollmentStatus::Dropped.is_active());
        assert!(!EnrollmentStatus::Enrolled.is_terminal());
    }

    #[test]
    fn test_enrol_type_wire_names() {
        let t: EnrolType = serde_json::from_str("\"Credit for Concentration\"").unwrap();
        assert_eq!(t, EnrolType::CreditForConcentration);
        assert_eq!("audit".parse::<EnrolType>(), Ok(EnrolType::Audit));
        assert!(!EnrolType::Audit.counts_toward_cgpa());
        assert!(EnrolType::Remedial.counts_toward_cgpa());
    }
}
