use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::course::{check_len, required_text};
use super::{check_progress, SortValue, Sortable, StudentFields};
use crate::error::ValidationErrors;
use crate::utils::{generate_id, is_valid_email, is_valid_name, is_valid_phone};

pub const NAME_LEN: RangeInclusive<usize> = 2..=100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    NotEnrolled,
    InProgress,
    Completed,
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentStatus::NotEnrolled => write!(f, "Not enrolled"),
            StudentStatus::InProgress => write!(f, "In progress"),
            StudentStatus::Completed => write!(f, "Completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Stored lowercased; unique across all students
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Course this student is enrolled in, if any
    #[serde(default)]
    pub course_id: Option<String>,
    pub progress: f64,
    #[serde(default)]
    pub completed_lessons: BTreeSet<String>,
    pub is_active: bool,
    pub enrollment_date: DateTime<Utc>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical form used for storage and uniqueness checks
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Student {
    /// Build a student from raw input. A present `course_id` is taken as-is;
    /// the repository verifies the course exists.
    pub fn new(fields: &StudentFields) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let name = required_text(&mut errors, "name", &fields.name, NAME_LEN);
        if let Some(n) = &name {
            check_name(&mut errors, n);
        }
        let email = match fields.email.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => {
                check_email(&mut errors, e);
                Some(normalize_email(e))
            }
            _ => {
                errors.add("email", "Email is required");
                None
            }
        };
        let phone = clean_phone(&mut errors, fields.phone.as_deref());
        let course_id = fields
            .course_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        errors.into_result()?;
        let (Some(name), Some(email)) = (name, email) else {
            return Err(ValidationErrors::single("student", "Incomplete student data"));
        };

        let now = Utc::now();
        Ok(Student {
            id: generate_id(),
            name,
            email,
            phone,
            course_id,
            progress: 0.0,
            completed_lessons: BTreeSet::new(),
            is_active: fields.is_active.unwrap_or(true),
            enrollment_date: now,
            last_login_at: None,
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
        check_len(&mut errors, "name", &self.name, NAME_LEN);
        check_name(&mut errors, &self.name);
        check_email(&mut errors, &self.email);
        if let Some(phone) = &self.phone {
            if !is_valid_phone(phone) {
                errors.add("phone", "Invalid phone number");
            }
        }
        if let Err(e) = check_progress(self.progress) {
            errors.merge(e);
        }
        if self.course_id.is_none() && (self.progress > 0.0 || !self.completed_lessons.is_empty())
        {
            errors.add("progress", "Progress requires an enrolled course");
        }

        errors.into_result()
    }

    /// Merge the present fields (enrollment excluded), re-validate, then commit
    pub fn apply(&mut self, fields: &StudentFields) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut next = self.clone();

        if let Some(name) = &fields.name {
            next.name = name.trim().to_string();
        }
        if let Some(email) = &fields.email {
            next.email = normalize_email(email);
        }
        if fields.phone.is_some() {
            next.phone = clean_phone(&mut errors, fields.phone.as_deref());
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

    pub fn is_enrolled(&self) -> bool {
        self.course_id.is_some()
    }

    pub fn status(&self) -> StudentStatus {
        match (&self.course_id, self.progress) {
            (None, _) => StudentStatus::NotEnrolled,
            (Some(_), p) if p >= 100.0 => StudentStatus::Completed,
            (Some(_), _) => StudentStatus::InProgress,
        }
    }

    /// Start a course: progress resets and the enrollment date is stamped
    pub fn enroll(&mut self, course_id: &str) -> Result<(), String> {
        if let Some(current) = &self.course_id {
            return Err(format!(
                "Student {} is already enrolled in course {}",
                self.id, current
            ));
        }
        let now = Utc::now();
        self.course_id = Some(course_id.to_string());
        self.progress = 0.0;
        self.completed_lessons.clear();
        self.enrollment_date = now;
        self.updated_at = now;
        Ok(())
    }

    /// Leave the current course; returns the course id that was left
    pub fn unenroll(&mut self) -> Result<String, String> {
        let Some(course_id) = self.course_id.take() else {
            return Err(format!("Student {} is not enrolled in any course", self.id));
        };
        self.progress = 0.0;
        self.completed_lessons.clear();
        self.updated_at = Utc::now();
        Ok(course_id)
    }

    /// Progress is only meaningful while enrolled
    pub fn update_progress(&mut self, progress: f64) -> Result<(), ValidationErrors> {
        let progress = check_progress(progress)?;
        if !self.is_enrolled() {
            return Err(ValidationErrors::single(
                "progress",
                "Student must be enrolled in a course to record progress",
            ));
        }
        self.progress = progress;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark a lesson complete. Returns false if it was already recorded.
    pub fn complete_lesson(&mut self, lesson_id: &str) -> Result<bool, ValidationErrors> {
        if !self.is_enrolled() {
            return Err(ValidationErrors::single(
                "completedLessons",
                "Student must be enrolled in a course to complete lessons",
            ));
        }
        let lesson_id = lesson_id.trim();
        if lesson_id.is_empty() {
            return Err(ValidationErrors::single(
                "completedLessons",
                "Lesson id is required",
            ));
        }
        let added = self.completed_lessons.insert(lesson_id.to_string());
        if added {
            self.updated_at = Utc::now();
        }
        Ok(added)
    }

    pub fn record_login(&mut self) {
        let now = Utc::now();
        self.last_login_at = Some(now);
        self.updated_at = now;
    }
}

impl Sortable for Student {
    fn sort_value(&self, field: &str) -> Option<SortValue> {
        let value = match field {
            "id" => SortValue::Text(self.id.clone()),
            "name" => SortValue::Text(self.name.clone()),
            "email" => SortValue::Text(self.email.clone()),
            "phone" => self
                .phone
                .clone()
                .map(SortValue::Text)
                .unwrap_or(SortValue::Empty),
            "courseId" | "course_id" => self
                .course_id
                .clone()
                .map(SortValue::Text)
                .unwrap_or(SortValue::Empty),
            "progress" => SortValue::Number(self.progress),
            "completedLessons" | "completed_lessons" => {
                SortValue::Number(self.completed_lessons.len() as f64)
            }
            "isActive" | "is_active" => SortValue::Flag(self.is_active),
            "enrollmentDate" | "enrollment_date" => SortValue::Time(self.enrollment_date),
            "lastLoginAt" | "last_login_at" => self
                .last_login_at
                .map(SortValue::Time)
                .unwrap_or(SortValue::Empty),
            "createdAt" | "created_at" => SortValue::Time(self.created_at),
            "updatedAt" | "updated_at" => SortValue::Time(self.updated_at),
            _ => return None,
        };
        Some(value)
    }
}

fn check_name(errors: &mut ValidationErrors, name: &str) {
    if !name.trim().is_empty() && !is_valid_name(name) {
        errors.add(
            "name",
            "Name may only contain letters, spaces, apostrophes, periods and hyphens",
        );
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !is_valid_email(email) {
        errors.add("email", "Invalid email address");
    }
}

/// Blank phone means none
fn clean_phone(errors: &mut ValidationErrors, phone: Option<&str>) -> Option<String> {
    let phone = phone.map(str::trim).filter(|p| !p.is_empty())?;
    if !is_valid_phone(phone) {
        errors.add("phone", "Invalid phone number");
    }
    Some(phone.to_string())
}
