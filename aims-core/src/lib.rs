pub mod catalog;
pub mod enrollment;
pub mod ids;
pub mod record;

pub use catalog::*;
pub use enrollment::{
    plan, Action, EnrolType, Enrollment, EnrollmentEvent, EnrollmentStatus, Intent, ParseError,
    Role, TransitionError,
};
pub use ids::*;
pub use record::{AcademicRecord, Grade, RecordEntry};
