//! Aggregate figures over the current collections.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Course, Difficulty, Student, StudentStatus};
use crate::utils::round2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularCourse {
    pub id: String,
    pub title: String,
    pub enrollment_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStatistics {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub total_enrollments: u32,
    pub average_progress: f64,
    pub average_duration: f64,
    pub by_difficulty: BTreeMap<Difficulty, usize>,
    /// Highest enrollment count; ties go to the earliest course
    pub most_popular: Option<PopularCourse>,
}

impl CourseStatistics {
    pub fn from_courses(courses: &[Course]) -> Self {
        let total = courses.len();
        let active = courses.iter().filter(|c| c.is_active).count();

        let mut by_difficulty: BTreeMap<Difficulty, usize> =
            Difficulty::ALL.iter().map(|d| (*d, 0)).collect();
        for course in courses {
            *by_difficulty.entry(course.difficulty).or_default() += 1;
        }

        let most_popular = courses
            .iter()
            .filter(|c| c.enrollment_count > 0)
            .fold(None::<&Course>, |best, c| match best {
                Some(b) if b.enrollment_count >= c.enrollment_count => Some(b),
                _ => Some(c),
            })
            .map(|c| PopularCourse {
                id: c.id.clone(),
                title: c.title.clone(),
                enrollment_count: c.enrollment_count,
            });

        Self {
            total,
            active,
            inactive: total - active,
            total_enrollments: courses.iter().map(|c| c.enrollment_count).sum(),
            average_progress: average(courses.iter().map(|c| c.progress)),
            average_duration: average(courses.iter().map(|c| c.duration as f64)),
            by_difficulty,
            most_popular,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatistics {
    pub total: usize,
    pub active: usize,
    pub enrolled: usize,
    pub unenrolled: usize,
    /// Percentage of students enrolled in a course
    pub enrollment_rate: f64,
    /// Mean progress of enrolled students
    pub average_progress: f64,
    pub completed: usize,
    /// Percentage of enrolled students at 100%
    pub completion_rate: f64,
    /// Enrolled students per course id
    pub by_course: BTreeMap<String, usize>,
}

impl StudentStatistics {
    pub fn from_students(students: &[Student]) -> Self {
        let total = students.len();
        let enrolled: Vec<&Student> = students.iter().filter(|s| s.is_enrolled()).collect();
        let completed = enrolled
            .iter()
            .filter(|s| s.status() == StudentStatus::Completed)
            .count();

        let mut by_course = BTreeMap::new();
        for course_id in enrolled.iter().filter_map(|s| s.course_id.as_ref()) {
            *by_course.entry(course_id.clone()).or_default() += 1;
        }

        Self {
            total,
            active: students.iter().filter(|s| s.is_active).count(),
            enrolled: enrolled.len(),
            unenrolled: total - enrolled.len(),
            enrollment_rate: percentage(enrolled.len(), total),
            average_progress: average(enrolled.iter().map(|s| s.progress)),
            completed,
            completion_rate: percentage(completed, enrolled.len()),
            by_course,
        }
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        round2(sum / count as f64)
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / whole as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseFields, StudentFields};

    fn course(title: &str, duration: f64, difficulty: &str, enrolled: u32) -> Course {
        let mut c = Course::new(&CourseFields::new(
            title,
            "A thorough introduction to the topic",
            duration,
            "Grace Hopper",
            difficulty,
        ))
        .unwrap();
        for _ in 0..enrolled {
            c.increment_enrollment();
        }
        c
    }

    #[test]
    fn test_course_statistics() {
        let mut inactive = course("Go Basics", 20.0, "intermediate", 0);
        inactive.deactivate();
        let courses = vec![
            course("Rust Basics", 10.0, "beginner", 2),
            course("Rust Async", 30.0, "advanced", 2),
            inactive,
        ];

        let stats = CourseStatistics::from_courses(&courses);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.total_enrollments, 4);
        assert_eq!(stats.average_duration, 20.0);
        assert_eq!(stats.by_difficulty[&Difficulty::Advanced], 1);
        assert_eq!(stats.most_popular.unwrap().title, "Rust Basics");
    }

    #[test]
    fn test_empty_statistics() {
        let stats = CourseStatistics::from_courses(&[]);
        assert_eq!(stats.average_progress, 0.0);
        assert!(stats.most_popular.is_none());
        assert_eq!(stats.by_difficulty.len(), 3);

        let stats = StudentStatistics::from_students(&[]);
        assert_eq!(stats.enrollment_rate, 0.0);
        assert_eq!(stats.completion_rate, 0.0);
    }

    #[test]
    fn test_student_statistics() {
        let mut done = Student::new(&StudentFields::new("Ada Lovelace", "ada@example.com")).unwrap();
        done.enroll("c1").unwrap();
        done.update_progress(100.0).unwrap();
        let mut halfway =
            Student::new(&StudentFields::new("Alan Turing", "alan@example.com")).unwrap();
        halfway.enroll("c1").unwrap();
        halfway.update_progress(50.0).unwrap();
        let idle = Student::new(&StudentFields::new("Grace Hopper", "grace@example.com")).unwrap();

        let stats = StudentStatistics::from_students(&[done, halfway, idle]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.enrolled, 2);
        assert_eq!(stats.unenrolled, 1);
        assert_eq!(stats.enrollment_rate, 66.67);
        assert_eq!(stats.average_progress, 75.0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.completion_rate, 50.0);
        assert_eq!(stats.by_course.get("c1"), Some(&2));
    }
}
