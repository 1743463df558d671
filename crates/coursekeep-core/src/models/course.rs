use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_progress, CourseFields, SortValue, Sortable};
use crate::error::ValidationErrors;
use crate::utils::{decode_html, generate_id};

pub const TITLE_LEN: RangeInclusive<usize> = 3..=100;
pub const DESCRIPTION_LEN: RangeInclusive<usize> = 10..=1000;
pub const INSTRUCTOR_LEN: RangeInclusive<usize> = 2..=100;
/// Course length in whole hours
pub const DURATION_HOURS: RangeInclusive<u32> = 1..=1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
    ];

    /// Effort multiplier applied to the nominal duration
    pub fn multiplier(&self) -> f64 {
        match self {
            Difficulty::Beginner => 1.0,
            Difficulty::Intermediate => 1.3,
            Difficulty::Advanced => 1.6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!(
                "Difficulty must be one of beginner, intermediate, advanced (got '{}')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Nominal length in hours
    pub duration: u32,
    pub instructor: String,
    pub difficulty: Difficulty,
    /// Number of students whose `course_id` references this course
    pub enrollment_count: u32,
    pub progress: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Build a course from raw input. Every required field must be present and valid.
    pub fn new(fields: &CourseFields) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let title = required_text(&mut errors, "title", &fields.title, TITLE_LEN);
        let description =
            required_text(&mut errors, "description", &fields.description, DESCRIPTION_LEN);
        let instructor =
            required_text(&mut errors, "instructor", &fields.instructor, INSTRUCTOR_LEN);
        let duration = match fields.duration {
            Some(d) => parse_duration(&mut errors, d),
            None => {
                errors.add("duration", "Duration is required");
                None
            }
        };
        let difficulty = match &fields.difficulty {
            Some(d) => parse_difficulty(&mut errors, d),
            None => {
                errors.add("difficulty", "Difficulty is required");
                None
            }
        };

        errors.into_result()?;
        let (Some(title), Some(description), Some(instructor), Some(duration), Some(difficulty)) =
            (title, description, instructor, duration, difficulty)
        else {
            return Err(ValidationErrors::single("course", "Incomplete course data"));
        };

        let now = Utc::now();
        Ok(Course {
            id: generate_id(),
            title,
            description,
            duration,
            instructor,
            difficulty,
            enrollment_count: 0,
            progress: 0.0,
            is_active: fields.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        })
    }

    /// Validate the record as a whole
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.id.trim().is_empty() {
            errors.add("id", "Id is required");
        }
        check_len(&mut errors, "title", &self.title, TITLE_LEN);
        check_len(&mut errors, "description", &self.description, DESCRIPTION_LEN);
        check_len(&mut errors, "instructor", &self.instructor, INSTRUCTOR_LEN);
        if !DURATION_HOURS.contains(&self.duration) {
            errors.add(
                "duration",
                format!(
                    "Duration must be between {} and {} hours",
                    DURATION_HOURS.start(),
                    DURATION_HOURS.end()
                ),
            );
        }
        if let Err(e) = check_progress(self.progress) {
            errors.merge(e);
        }

        errors.into_result()
    }

    /// Merge the present fields, re-validate, and only then commit the change
    pub fn apply(&mut self, fields: &CourseFields) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut next = self.clone();

        if let Some(title) = &fields.title {
            next.title = title.trim().to_string();
        }
        if let Some(description) = &fields.description {
            next.description = description.trim().to_string();
        }
        if let Some(instructor) = &fields.instructor {
            next.instructor = instructor.trim().to_string();
        }
        if let Some(d) = fields.duration {
            if let Some(duration) = parse_duration(&mut errors, d) {
                next.duration = duration;
            }
        }
        if let Some(d) = &fields.difficulty {
            if let Some(difficulty) = parse_difficulty(&mut errors, d) {
                next.difficulty = difficulty;
            }
        }
        if let Some(active) = fields.is_active {
            next.is_active = active;
        }

        if let Err(e) = next.check() {
            errors.merge(e);
        }
        errors.into_result()?;

        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    /// Hours to finish, scaled by difficulty
    pub fn estimated_completion_time(&self) -> u32 {
        (self.duration as f64 * self.difficulty.multiplier()).round() as u32
    }

    /// Set progress, rounded to two decimals. Out-of-range values leave it unchanged.
    pub fn update_progress(&mut self, progress: f64) -> Result<(), ValidationErrors> {
        self.progress = check_progress(progress)?;
        self.touch();
        Ok(())
    }

    pub fn increment_enrollment(&mut self) {
        self.enrollment_count += 1;
        self.touch();
    }

    pub fn decrement_enrollment(&mut self) -> Result<(), ValidationErrors> {
        if self.enrollment_count == 0 {
            return Err(ValidationErrors::single(
                "enrollmentCount",
                "Enrollment count cannot go below zero",
            ));
        }
        self.enrollment_count -= 1;
        self.touch();
        Ok(())
    }

    pub fn activate(&mut self) {
        self.is_active = true;
        self.touch();
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    pub fn is_completed(&self) -> bool {
        self.progress >= 100.0
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Sortable for Course {
    fn sort_value(&self, field: &str) -> Option<SortValue> {
        let value = match field {
            "id" => SortValue::Text(self.id.clone()),
            "title" => SortValue::Text(self.title.clone()),
            "description" => SortValue::Text(self.description.clone()),
            "instructor" => SortValue::Text(self.instructor.clone()),
            "duration" => SortValue::Number(self.duration as f64),
            "difficulty" => SortValue::Number(self.difficulty.multiplier()),
            "enrollmentCount" | "enrollment_count" => {
                SortValue::Number(self.enrollment_count as f64)
            }
            "progress" => SortValue::Number(self.progress),
            "isActive" | "is_active" => SortValue::Flag(self.is_active),
            "createdAt" | "created_at" => SortValue::Time(self.created_at),
            "updatedAt" | "updated_at" => SortValue::Time(self.updated_at),
            _ => return None,
        };
        Some(value)
    }
}

/// Present, non-blank and within length bounds
pub(crate) fn required_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: &Option<String>,
    bounds: RangeInclusive<usize>,
) -> Option<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => {
            let before = errors.len();
            check_len(errors, field, v, bounds);
            (errors.len() == before).then(|| v.to_string())
        }
        _ => {
            errors.add(field, format!("{} is required", capitalize(field)));
            None
        }
    }
}

fn parse_duration(errors: &mut ValidationErrors, duration: f64) -> Option<u32> {
    if !duration.is_finite() || duration.fract() != 0.0 {
        errors.add("duration", "Duration must be a whole number of hours");
        return None;
    }
    if duration < *DURATION_HOURS.start() as f64 || duration > *DURATION_HOURS.end() as f64 {
        errors.add(
            "duration",
            format!(
                "Duration must be between {} and {} hours",
                DURATION_HOURS.start(),
                DURATION_HOURS.end()
            ),
        );
        return None;
    }
    Some(duration as u32)
}

fn parse_difficulty(errors: &mut ValidationErrors, value: &str) -> Option<Difficulty> {
    match value.parse() {
        Ok(d) => Some(d),
        Err(msg) => {
            errors.add("difficulty", msg);
            None
        }
    }
}

pub(crate) fn check_len(
    errors: &mut ValidationErrors,
    field: &str,
    value: &str,
    bounds: RangeInclusive<usize>,
) {
    let len = decode_html(value.trim()).chars().count();
    if !bounds.contains(&len) {
        errors.add(
            field,
            format!(
                "{} must be between {} and {} characters",
                capitalize(field),
                bounds.start(),
                bounds.end()
            ),
        );
    }
}

pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(duration: f64, difficulty: &str) -> CourseFields {
        CourseFields::new(
            "Intro to Rust",
            "Ownership, borrowing and lifetimes",
            duration,
            "Ferris Crab",
            difficulty,
        )
    }

    #[test]
    fn test_new_course_defaults() {
        let course = Course::new(&fields(10.0, "beginner")).unwrap();
        assert_eq!(course.enrollment_count, 0);
        assert_eq!(course.progress, 0.0);
        assert!(course.is_active);
        assert_eq!(course.difficulty, Difficulty::Beginner);
        assert!(!course.id.is_empty());
    }

    #[test]
    fn test_new_course_reports_every_missing_field() {
        let errors = Course::new(&CourseFields::default()).unwrap_err();
        for field in ["title", "description", "instructor", "duration", "difficulty"] {
            assert!(errors.contains(field), "missing error for {}", field);
        }
    }

    #[test]
    fn test_new_course_rejects_bad_values() {
        let mut bad = fields(2.5, "expert");
        bad.title = Some("Go".to_string());
        let errors = Course::new(&bad).unwrap_err();
        assert!(errors.contains("duration"));
        assert!(errors.contains("difficulty"));
        assert!(errors.contains("title"));
    }

    #[test]
    fn test_estimated_completion_time() {
        let beginner = Course::new(&fields(10.0, "beginner")).unwrap();
        assert_eq!(beginner.estimated_completion_time(), 10);
        let intermediate = Course::new(&fields(10.0, "intermediate")).unwrap();
        assert_eq!(intermediate.estimated_completion_time(), 13);
        let advanced = Course::new(&fields(10.0, "advanced")).unwrap();
        assert_eq!(advanced.estimated_completion_time(), 16);
    }

    #[test]
    fn test_update_progress_rounds_and_rejects() {
        let mut course = Course::new(&fields(10.0, "beginner")).unwrap();
        course.update_progress(45.678).unwrap();
        assert_eq!(course.progress, 45.68);

        assert!(course.update_progress(101.0).is_err());
        assert!(course.update_progress(-1.0).is_err());
        assert_eq!(course.progress, 45.68);
    }

    #[test]
    fn test_enrollment_count_never_negative() {
        let mut course = Course::new(&fields(10.0, "beginner")).unwrap();
        assert!(course.decrement_enrollment().is_err());
        course.increment_enrollment();
        course.increment_enrollment();
        course.decrement_enrollment().unwrap();
        assert_eq!(course.enrollment_count, 1);
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut course = Course::new(&fields(10.0, "beginner")).unwrap();
        let patch = CourseFields {
            title: Some("Advanced Rust".to_string()),
            duration: Some(0.0),
            ..Default::default()
        };
        assert!(course.apply(&patch).is_err());
        assert_eq!(course.title, "Intro to Rust");
        assert_eq!(course.duration, 10);

        let patch = CourseFields {
            title: Some("Advanced Rust".to_string()),
            difficulty: Some("advanced".to_string()),
            ..Default::default()
        };
        course.apply(&patch).unwrap();
        assert_eq!(course.title, "Advanced Rust");
        assert_eq!(course.difficulty, Difficulty::Advanced);
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let course = Course::new(&fields(10.0, "advanced")).unwrap();
        let json = serde_json::to_value(&course).unwrap();
        assert_eq!(json["enrollmentCount"], 0);
        assert_eq!(json["difficulty"], "advanced");
        assert!(json["createdAt"].is_string());
        let back: Course = serde_json::from_value(json).unwrap();
        assert_eq!(back, course);
    }

    #[test]
    fn test_sort_values() {
        let course = Course::new(&fields(10.0, "beginner")).unwrap();
        assert!(course.sort_value("title").is_some());
        assert!(course.sort_value("enrollmentCount").is_some());
        assert!(course.sort_value("nonexistent").is_none());
    }
}
