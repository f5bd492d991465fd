//! Transition table for the enrollment approval workflow.
//!
//! This is the single source of truth for which status changes exist and
//! which roles may make them. Everything that writes `enrol_status` goes
//! through [`plan`] first; the storage layer then applies the planned edge
//! as a conditional update on `from`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::status::{EnrollmentStatus, ParseError};

/// Role an actor presents for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Advisor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::Advisor => "advisor",
            Self::Admin => "admin",
        }
    }

    /// Staff may browse other people's data within their scope.
    pub fn is_staff(self) -> bool {
        !matches!(self, Self::Student)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "instructor" | "faculty" => Ok(Self::Instructor),
            "advisor" => Ok(Self::Advisor),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseError {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Named actions the UI exposes as buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Reject,
    Withdraw,
    Drop,
    /// Grade posted by the grading process.
    Complete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Withdraw => "withdraw",
            Self::Drop => "drop",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "accept" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "withdraw" => Ok(Self::Withdraw),
            "drop" => Ok(Self::Drop),
            "complete" => Ok(Self::Complete),
            _ => Err(ParseError {
                kind: "action",
                value: s.to_string(),
            }),
        }
    }
}

/// What a caller asked for: either a concrete target status or an action
/// whose target depends on the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Target(EnrollmentStatus),
    Action(Action),
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(status) => write!(f, "`{}`", status),
            Self::Action(action) => write!(f, "{}", action),
        }
    }
}

/// One legal status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
    pub action: Action,
    pub roles: &'static [Role],
}

impl Edge {
    pub fn allows(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

const INSTRUCTOR_OR_ADMIN: &[Role] = &[Role::Instructor, Role::Admin];
const ADVISOR: &[Role] = &[Role::Advisor];
const STUDENT: &[Role] = &[Role::Student];

pub const TRANSITIONS: &[Edge] = &[
    Edge {
        from: EnrollmentStatus::PendingInstructor,
        to: EnrollmentStatus::PendingAdvisor,
        action: Action::Approve,
        roles: INSTRUCTOR_OR_ADMIN,
    },
    Edge {
        from: EnrollmentStatus::PendingInstructor,
        to: EnrollmentStatus::InstructorRejected,
        action: Action::Reject,
        roles: INSTRUCTOR_OR_ADMIN,
    },
    Edge {
        from: EnrollmentStatus::PendingAdvisor,
        to: EnrollmentStatus::Enrolled,
        action: Action::Approve,
        roles: ADVISOR,
    },
    Edge {
        from: EnrollmentStatus::PendingAdvisor,
        to: EnrollmentStatus::AdvisorRejected,
        action: Action::Reject,
        roles: ADVISOR,
    },
    Edge {
        from: EnrollmentStatus::Enrolled,
        to: EnrollmentStatus::Withdrawn,
        action: Action::Withdraw,
        roles: STUDENT,
    },
    Edge {
        from: EnrollmentStatus::PendingInstructor,
        to: EnrollmentStatus::Dropped,
        action: Action::Drop,
        roles: STUDENT,
    },
    Edge {
        from: EnrollmentStatus::PendingAdvisor,
        to: EnrollmentStatus::Dropped,
        action: Action::Drop,
        roles: STUDENT,
    },
    Edge {
        from: EnrollmentStatus::Enrolled,
        to: EnrollmentStatus::Dropped,
        action: Action::Drop,
        roles: STUDENT,
    },
    Edge {
        from: EnrollmentStatus::Enrolled,
        to: EnrollmentStatus::Completed,
        action: Action::Complete,
        roles: INSTRUCTOR_OR_ADMIN,
    },
];

/// Why a requested change was refused by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// No edge leads from `from` for this intent.
    Invalid {
        from: EnrollmentStatus,
        intent: Intent,
    },
    /// The edge exists but `role` may not take it.
    Forbidden {
        role: Role,
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { from, intent } => {
                write!(f, "cannot apply {} to an enrollment in `{}`", intent, from)
            }
            Self::Forbidden { role, from, to } => {
                write!(f, "role {} may not move an enrollment from `{}` to `{}`", role, from, to)
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// All edges leaving `from`.
pub fn edges_from(from: EnrollmentStatus) -> impl Iterator<Item = &'static Edge> {
    TRANSITIONS.iter().filter(move |edge| edge.from == from)
}

/// Find the edge an intent names, ignoring roles.
pub fn resolve(from: EnrollmentStatus, intent: Intent) -> Option<&'static Edge> {
    edges_from(from).find(|edge| match intent {
        Intent::Target(to) => edge.to == to,
        Intent::Action(action) => edge.action == action,
    })
}

/// Validate an intent against the table for the acting role.
///
/// Unknown edges are reported as `Invalid` before the role is considered, so
/// acting on a terminal record always fails the same way regardless of who
/// asks.
pub fn plan(
    from: EnrollmentStatus,
    intent: Intent,
    role: Role,
) -> Result<&'static Edge, TransitionError> {
    let edge = resolve(from, intent).ok_or(TransitionError::Invalid { from, intent })?;
    if !edge.allows(role) {
        return Err(TransitionError::Forbidden {
            role,
            from,
            to: edge.to,
        });
    }
    Ok(edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ROLES: [Role; 4] = [Role::Student, Role::Instructor, Role::Advisor, Role::Admin];
    const ACTIONS: [Action; 5] = [
        Action::Approve,
        Action::Reject,
        Action::Withdraw,
        Action::Drop,
        Action::Complete,
    ];

    #[test]
    fn test_instructor_approval_goes_to_advisor() {
        let edge = plan(
            EnrollmentStatus::PendingInstructor,
            Intent::Action(Action::Approve),
            Role::Instructor,
        )
        .unwrap();
        assert_eq!(edge.to, EnrollmentStatus::PendingAdvisor);
    }

    #[test]
    fn test_advisor_approval_enrolls() {
        let edge = plan(
            EnrollmentStatus::PendingAdvisor,
            Intent::Action(Action::Approve),
            Role::Advisor,
        )
        .unwrap();
        assert_eq!(edge.to, EnrollmentStatus::Enrolled);
    }

    #[test]
    fn test_admin_cannot_stand_in_for_advisor() {
        let err = plan(
            EnrollmentStatus::PendingAdvisor,
            Intent::Action(Action::Approve),
            Role::Admin,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::Forbidden {
                role: Role::Admin,
                from: EnrollmentStatus::PendingAdvisor,
                to: EnrollmentStatus::Enrolled,
            }
        );
    }

    #[test]
    fn test_student_cannot_approve() {
        let err = plan(
            EnrollmentStatus::PendingInstructor,
            Intent::Target(EnrollmentStatus::PendingAdvisor),
            Role::Student,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::Forbidden { .. }));
    }

    #[test]
    fn test_skipping_advisor_is_invalid() {
        let err = plan(
            EnrollmentStatus::PendingInstructor,
            Intent::Target(EnrollmentStatus::Enrolled),
            Role::Admin,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
    }

    #[test]
    fn test_drop_allowed_from_pending_and_enrolled() {
        for from in [
            EnrollmentStatus::PendingInstructor,
            EnrollmentStatus::PendingAdvisor,
            EnrollmentStatus::Enrolled,
        ] {
            let edge = plan(from, Intent::Action(Action::Drop), Role::Student).unwrap();
            assert_eq!(edge.to, EnrollmentStatus::Dropped);
        }
    }

    #[test]
    fn test_withdraw_only_from_enrolled() {
        let err = plan(
            EnrollmentStatus::PendingAdvisor,
            Intent::Action(Action::Withdraw),
            Role::Student,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
    }

    #[test]
    fn test_error_messages_name_states() {
        let err = plan(
            EnrollmentStatus::AdvisorRejected,
            Intent::Action(Action::Approve),
            Role::Advisor,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot apply approve to an enrollment in `advisor rejected`"
        );
    }

    #[test]
    fn test_table_has_no_duplicate_edges() {
        for (i, a) in TRANSITIONS.iter().enumerate() {
            for b in &TRANSITIONS[i + 1..] {
                assert!(
                    !(a.from == b.from && (a.to == b.to || a.action == b.action)),
                    "ambiguous edges {:?} and {:?}",
                    a,
                    b
                );
            }
        }
    }

    fn status_strategy() -> impl Strategy<Value = EnrollmentStatus> {
        prop::sample::select(EnrollmentStatus::ALL.to_vec())
    }

    fn intent_strategy() -> impl Strategy<Value = Intent> {
        prop_oneof![
            status_strategy().prop_map(Intent::Target),
            prop::sample::select(ACTIONS.to_vec()).prop_map(Intent::Action),
        ]
    }

    proptest! {
        #[test]
        fn prop_terminal_states_have_no_exit(
            from in status_strategy(),
            intent in intent_strategy(),
            role in prop::sample::select(ROLES.to_vec()),
        ) {
            prop_assume!(from.is_terminal());
            let result = plan(from, intent, role);
            let is_invalid = matches!(result, Err(TransitionError::Invalid { .. }));
            prop_assert!(is_invalid);
        }

        #[test]
        fn prop_planned_edge_starts_at_current_status(
            from in status_strategy(),
            intent in intent_strategy(),
            role in prop::sample::select(ROLES.to_vec()),
        ) {
            if let Ok(edge) = plan(from, intent, role) {
                prop_assert_eq!(edge.from, from);
                prop_assert!(edge.allows(role));
                if let Intent::Target(to) = intent {
                    prop_assert_eq!(edge.to, to);
                }
            }
        }

        #[test]
        fn prop_approve_never_jumps_to_enrolled_from_instructor_stage(
            role in prop::sample::select(ROLES.to_vec()),
        ) {
            if let Ok(edge) = plan(
                EnrollmentStatus::PendingInstructor,
                Intent::Action(Action::Approve),
                role,
            ) {
                prop_assert_eq!(edge.to, EnrollmentStatus::PendingAdvisor);
            }
        }
    }
}
