//! Manager facades over the repository.
//!
//! `CourseManager` and `StudentManager` validate input, cache list queries
//! for five minutes, clear their cache on every mutation and notify
//! observers of each lifecycle event. The repository remains responsible
//! for the Course/Student count invariant; the managers only orchestrate.

pub mod course;
pub mod stats;
pub mod student;

use serde::{Deserialize, Serialize};

use crate::models::{Course, Difficulty, Query, SortSpec, Student};

pub use course::CourseManager;
pub use stats::{CourseStatistics, StudentStatistics};
pub use student::StudentManager;

/// Per-step progress increments used by `simulate_progress`
pub const STUDENT_PROGRESS_STEP: std::ops::RangeInclusive<u32> = 3..=20;
pub const COURSE_PROGRESS_STEP: std::ops::RangeInclusive<u32> = 5..=25;

/// Outcome of a best-effort batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub attempted: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Case-insensitive match against title, description and instructor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl CourseFilter {
    pub fn matches(&self, course: &Course) -> bool {
        if let Some(d) = self.difficulty {
            if course.difficulty != d {
                return false;
            }
        }
        if let Some(instructor) = &self.instructor {
            if !course.instructor.eq_ignore_ascii_case(instructor.trim()) {
                return false;
            }
        }
        if let Some(active) = self.active {
            if course.is_active != active {
                return false;
            }
        }
        if let Some(term) = search_term(&self.search) {
            return [&course.title, &course.description, &course.instructor]
                .iter()
                .any(|field| field.to_lowercase().contains(&term));
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseListOptions {
    #[serde(default)]
    pub filter: CourseFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl CourseListOptions {
    pub fn sorted(sort: SortSpec) -> Self {
        Self {
            sort: Some(sort),
            ..Default::default()
        }
    }

    pub fn cache_key(&self) -> String {
        cache_key(self)
    }

    pub fn to_query(&self) -> Query<Course> {
        let mut query = if self.filter == CourseFilter::default() {
            Query::all()
        } else {
            let filter = self.filter.clone();
            Query::filtered(move |c: &Course| filter.matches(c))
        };
        query.sort = self.sort.clone();
        query
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Case-insensitive match against name and email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        if let Some(course_id) = &self.course_id {
            if student.course_id.as_deref() != Some(course_id.as_str()) {
                return false;
            }
        }
        if let Some(enrolled) = self.enrolled {
            if student.is_enrolled() != enrolled {
                return false;
            }
        }
        if let Some(active) = self.active {
            if student.is_active != active {
                return false;
            }
        }
        if let Some(term) = search_term(&self.search) {
            return student.name.to_lowercase().contains(&term) || student.email.contains(&term);
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentListOptions {
    #[serde(default)]
    pub filter: StudentFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl StudentListOptions {
    pub fn sorted(sort: SortSpec) -> Self {
        Self {
            sort: Some(sort),
            ..Default::default()
        }
    }

    pub fn cache_key(&self) -> String {
        cache_key(self)
    }

    pub fn to_query(&self) -> Query<Student> {
        let mut query = if self.filter == StudentFilter::default() {
            Query::all()
        } else {
            let filter = self.filter.clone();
            Query::filtered(move |s: &Student| filter.matches(s))
        };
        query.sort = self.sort.clone();
        query
    }
}

fn search_term(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn cache_key<T: Serialize + std::fmt::Debug>(options: &T) -> String {
    serde_json::to_string(options).unwrap_or_else(|_| format!("{:?}", options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CourseFields;

    fn course(title: &str, difficulty: &str) -> Course {
        Course::new(&CourseFields::new(
            title,
            "A thorough introduction to the topic",
            10.0,
            "Grace Hopper",
            difficulty,
        ))
        .unwrap()
    }

    #[test]
    fn test_cache_key_tracks_options() {
        let a = CourseListOptions::default();
        let b = CourseListOptions::sorted(SortSpec::desc("title"));
        let mut c = CourseListOptions::default();
        c.filter.difficulty = Some(Difficulty::Advanced);
        assert_eq!(a.cache_key(), CourseListOptions::default().cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_course_filter() {
        let courses = vec![course("Rust Basics", "beginner"), course("Rust Async", "advanced")];
        let mut options = CourseListOptions::default();
        options.filter.difficulty = Some(Difficulty::Advanced);
        let out = options.to_query().apply(&courses);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Rust Async");

        let mut options = CourseListOptions::default();
        options.filter.search = Some("  BASICS ".to_string());
        assert_eq!(options.to_query().apply(&courses).len(), 1);
    }

    #[test]
    fn test_student_filter() {
        let mut enrolled =
            Student::new(&crate::models::StudentFields::new("Ada Lovelace", "ada@example.com"))
                .unwrap();
        enrolled.enroll("c1").unwrap();
        let idle =
            Student::new(&crate::models::StudentFields::new("Alan Turing", "alan@example.com"))
                .unwrap();
        let students = vec![enrolled, idle];

        let mut options = StudentListOptions::default();
        options.filter.enrolled = Some(false);
        let out = options.to_query().apply(&students);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Alan Turing");

        let mut options = StudentListOptions::default();
        options.filter.course_id = Some("c1".to_string());
        assert_eq!(options.to_query().apply(&students)[0].name, "Ada Lovelace");
    }
}
