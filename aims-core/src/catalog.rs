//! Catalog and people: courses, offerings, students, instructors, advisor
//! assignments and alerts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::ids::{AlertId, CourseCode, InstructorId, OfferingId, StudentId, UserId};

/// A catalog course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_code: CourseCode,
    pub title: String,
    pub credits: f64,
    pub department: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Course {
    pub fn validate(&self) -> Result<(), String> {
        if self.course_code.as_str().trim().is_empty() {
            return Err("course_code must not be empty".to_string());
        }
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if !self.credits.is_finite() || self.credits <= 0.0 {
            return Err(format!("credits must be positive, got {}", self.credits));
        }
        Ok(())
    }
}

/// A scheduled instance of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub offering_id: OfferingId,
    pub course_code: CourseCode,
    /// Academic session, e.g. `2024-I`.
    pub session: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub slot: Option<String>,
    pub instructors: Vec<InstructorId>,
    pub coordinator_id: InstructorId,
}

impl Offering {
    pub fn validate(&self) -> Result<(), String> {
        if self.session.trim().is_empty() {
            return Err("session must not be empty".to_string());
        }
        if self.instructors.is_empty() {
            return Err("an offering needs at least one instructor".to_string());
        }
        let mut seen = HashSet::new();
        if let Some(repeated) = self.instructors.iter().find(|i| !seen.insert(*i)) {
            return Err(format!("instructor {} is listed more than once", repeated));
        }
        if !self.instructors.contains(&self.coordinator_id) {
            return Err(format!(
                "coordinator {} is not one of the offering's instructors",
                self.coordinator_id
            ));
        }
        Ok(())
    }

    pub fn is_taught_by(&self, user: &UserId) -> bool {
        self.instructors.iter().any(|i| i == user)
    }

    pub fn is_coordinated_by(&self, user: &UserId) -> bool {
        self.coordinator_id == *user
    }
}

/// Degree, branch and admission batch; the unit advisors are assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cohort {
    pub degree: String,
    pub branch: String,
    pub batch: i32,
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.degree, self.branch, self.batch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: StudentId,
    pub name: String,
    pub email: String,
    pub degree: String,
    pub branch: String,
    pub batch: i32,
}

impl Student {
    pub fn cohort(&self) -> Cohort {
        Cohort {
            degree: self.degree.clone(),
            branch: self.branch.clone(),
            batch: self.batch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instructor {
    pub instructor_id: InstructorId,
    pub name: String,
    pub email: String,
    pub department: String,
}

/// An instructor acting as faculty advisor for one cohort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorAssignment {
    pub advisor_id: InstructorId,
    #[serde(flatten)]
    pub cohort: Cohort,
}

/// A notice posted to all users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: AlertId,
    pub owner_id: UserId,
    pub message: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offering() -> Offering {
        Offering {
            offering_id: OfferingId::from("o1"),
            course_code: CourseCode::from("CS301"),
            session: "2024-I".to_string(),
            section: None,
            slot: Some("PCE-1".to_string()),
            instructors: vec![InstructorId::from("i1"), InstructorId::from("i2")],
            coordinator_id: InstructorId::from("i1"),
        }
    }

    #[test]
    fn test_offering_requires_coordinator_among_instructors() {
        let mut o = offering();
        assert!(o.validate().is_ok());
        o.coordinator_id = InstructorId::from("i9");
        assert!(o.validate().is_err());
        o.instructors.clear();
        assert!(o.validate().is_err());
    }

    #[test]
    fn test_offering_rejects_repeated_instructor() {
        let mut o = offering();
        o.instructors.push(InstructorId::from("i2"));
        let err = o.validate().unwrap_err();
        assert_eq!(err, "instructor i2 is listed more than once");
    }

    #[test]
    fn test_offering_membership() {
        let o = offering();
        assert!(o.is_taught_by(&UserId::from("i2")));
        assert!(!o.is_coordinated_by(&UserId::from("i2")));
        assert!(o.is_coordinated_by(&UserId::from("i1")));
    }

    #[test]
    fn test_course_validation() {
        let mut c = Course {
            course_code: CourseCode::from("CS301"),
            title: "Operating Systems".to_string(),
            credits: 4.0,
            department: "CSE".to_string(),
            description: None,
        };
        assert!(c.validate().is_ok());
        c.credits = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_advisor_assignment_flattens_cohort() {
        let a = AdvisorAssignment {
            advisor_id: InstructorId::from("i1"),
            cohort: Cohort {
                degree: "B.Tech".to_string(),
                branch: "CSE".to_string(),
                batch: 2021,
            },
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["batch"], 2021);
        assert_eq!(v["advisor_id"], "i1");
    }
}
