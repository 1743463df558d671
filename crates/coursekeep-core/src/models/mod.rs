//! Entity model for coursekeep.
//!
//! - `Course`, `Difficulty`: catalog entries with enrollment counts and progress
//! - `Student`, `StudentStatus`: learners with an optional course reference
//! - `CourseFields`, `StudentFields`: raw input carriers for create and update
//! - `Query`, `SortSpec`, `Sortable`: filtering and named-field sorting

pub mod course;
pub mod fields;
pub mod query;
pub mod student;

use crate::error::ValidationErrors;
use crate::utils::round2;

pub use course::{Course, Difficulty};
pub use fields::{CourseFields, StudentFields};
pub use query::{Query, SortOrder, SortSpec, SortValue, Sortable};
pub use student::{Student, StudentStatus};

/// Progress bounds shared by courses and students
pub const PROGRESS_MIN: f64 = 0.0;
pub const PROGRESS_MAX: f64 = 100.0;

/// Check a progress value is finite and within [0, 100]
pub fn check_progress(progress: f64) -> Result<f64, ValidationErrors> {
    if !progress.is_finite() {
        return Err(ValidationErrors::single("progress", "Progress must be a number"));
    }
    if !(PROGRESS_MIN..=PROGRESS_MAX).contains(&progress) {
        return Err(ValidationErrors::single(
            "progress",
            "Progress must be between 0 and 100",
        ));
    }
    Ok(round2(progress))
}
