//! Letter grades and the academic record (credits earned, CGPA).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::enrollment::{EnrolType, Enrollment, EnrollmentStatus, ParseError};
use crate::ids::{CourseCode, EnrollmentId, OfferingId, StudentId};

/// Letter grade on the ten-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "F")]
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AMinus => "A-",
            Self::B => "B",
            Self::BMinus => "B-",
            Self::C => "C",
            Self::CMinus => "C-",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        }
    }

    pub fn points(self) -> u8 {
        match self {
            Self::A => 10,
            Self::AMinus => 9,
            Self::B => 8,
            Self::BMinus => 7,
            Self::C => 6,
            Self::CMinus => 5,
            Self::D => 4,
            Self::E => 2,
            Self::F => 0,
        }
    }

    pub fn is_passing(self) -> bool {
        !matches!(self, Self::E | Self::F)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "A-" => Ok(Self::AMinus),
            "B" => Ok(Self::B),
            "B-" => Ok(Self::BMinus),
            "C" => Ok(Self::C),
            "C-" => Ok(Self::CMinus),
            "D" => Ok(Self::D),
            "E" => Ok(Self::E),
            "F" => Ok(Self::F),
            _ => Err(ParseError {
                kind: "grade",
                value: s.to_string(),
            }),
        }
    }
}

/// A completed enrollment joined with its course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub enrollment_id: EnrollmentId,
    pub offering_id: OfferingId,
    pub course_code: CourseCode,
    pub title: String,
    pub session: String,
    pub credits: f64,
    pub enrol_type: EnrolType,
    pub grade: Grade,
}

/// Transcript view of one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicRecord {
    pub student_id: StudentId,
    pub entries: Vec<RecordEntry>,
    pub credits_earned: f64,
    pub credits_graded: f64,
    pub cgpa: f64,
}

impl AcademicRecord {
    /// Build the record from graded entries.
    ///
    /// Audit entries are listed but never counted. Failing grades count in
    /// the CGPA denominator but earn no credits.
    pub fn compute(student_id: StudentId, entries: Vec<RecordEntry>) -> Self {
        let mut credits_earned = 0.0;
        let mut credits_graded = 0.0;
        let mut weighted_points = 0.0;

        for entry in entries.iter().filter(|e| e.enrol_type.counts_toward_cgpa()) {
            credits_graded += entry.credits;
            weighted_points += f64::from(entry.grade.points()) * entry.credits;
            if entry.grade.is_passing() {
                credits_earned += entry.credits;
            }
        }

        let cgpa = if credits_graded > 0.0 {
            round2(weighted_points / credits_graded)
        } else {
            0.0
        };

        Self {
            student_id,
            entries,
            credits_earned,
            credits_graded,
            cgpa,
        }
    }
}

/// Only completed enrollments with a grade belong on the record.
pub fn is_recordable(enrollment: &Enrollment) -> bool {
    enrollment.enrol_status == EnrollmentStatus::Completed && enrollment.grade.is_some()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, credits: f64, enrol_type: EnrolType, grade: Grade) -> RecordEntry {
        RecordEntry {
            enrollment_id: EnrollmentId::from(format!("e-{}", code)),
            offering_id: OfferingId::from(format!("o-{}", code)),
            course_code: CourseCode::from(code),
            title: format!("Course {}", code),
            session: "2024-I".to_string(),
            credits,
            enrol_type,
            grade,
        }
    }

    #[test]
    fn test_empty_record_has_zero_cgpa() {
        let record = AcademicRecord::compute(StudentId::from("s1"), vec![]);
        assert_eq!(record.cgpa, 0.0);
        assert_eq!(record.credits_earned, 0.0);
    }

    #[test]
    fn test_cgpa_is_credit_weighted() {
        let record = AcademicRecord::compute(
            StudentId::from("s1"),
            vec![
                entry("CS101", 4.0, EnrolType::Credit, Grade::A),
                entry("MA101", 3.0, EnrolType::Credit, Grade::B),
            ],
        );
        // (40 + 24) / 7 = 9.142857...
        assert_eq!(record.cgpa, 9.14);
        assert_eq!(record.credits_earned, 7.0);
        assert_eq!(record.credits_graded, 7.0);
    }

    #[test]
    fn test_audit_is_listed_but_not_counted() {
        let record = AcademicRecord::compute(
            StudentId::from("s1"),
            vec![
                entry("CS101", 4.0, EnrolType::Credit, Grade::B),
                entry("HS201", 3.0, EnrolType::Audit, Grade::F),
            ],
        );
        assert_eq!(record.entries.len(), 2);
        assert_eq!(record.cgpa, 8.0);
        assert_eq!(record.credits_earned, 4.0);
    }

    #[test]
    fn test_failing_grade_earns_no_credit() {
        let record = AcademicRecord::compute(
            StudentId::from("s1"),
            vec![
                entry("CS101", 3.0, EnrolType::Credit, Grade::A),
                entry("CS102", 3.0, EnrolType::Remedial, Grade::F),
            ],
        );
        assert_eq!(record.credits_earned, 3.0);
        assert_eq!(record.credits_graded, 6.0);
        assert_eq!(record.cgpa, 5.0);
    }

    #[test]
    fn test_grade_parsing() {
        assert_eq!("a-".parse::<Grade>(), Ok(Grade::AMinus));
        assert_eq!(Grade::CMinus.points(), 5);
        assert!("A+".parse::<Grade>().is_err());
        let g: Grade = serde_json::from_str("\"B-\"").unwrap();
        assert_eq!(g, Grade::BMinus);
    }
}
