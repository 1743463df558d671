//! The application context: one repository, one validation service and the
//! two managers over them, built once at startup and shared by reference.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::DataResult;
use crate::managers::{CourseManager, StudentManager};
use crate::models::{CourseFields, StudentFields};
use crate::service::{DataService, DataServiceOptions};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::validation::ValidationService;

pub struct AppContext {
    pub service: Arc<DataService>,
    pub validation: Arc<ValidationService>,
    pub courses: CourseManager,
    pub students: StudentManager,
}

/// What `seed_demo_data` added; records that already existed are skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub courses: usize,
    pub students: usize,
    pub skipped: usize,
}

const DEMO_COURSES: &[(&str, &str, f64, &str, &str)] = &[
    (
        "Introduction to Rust",
        "Ownership, borrowing and the type system from first principles",
        12.0,
        "Ferris Crab",
        "beginner",
    ),
    (
        "Async Programming",
        "Futures, executors and structured concurrency in practice",
        20.0,
        "Grace Hopper",
        "intermediate",
    ),
    (
        "Systems Design",
        "Storage engines, caching layers and consistency trade-offs",
        30.0,
        "Barbara Liskov",
        "advanced",
    ),
];

const DEMO_STUDENTS: &[(&str, &str, Option<usize>)] = &[
    ("Ada Lovelace", "ada@example.com", Some(0)),
    ("Alan Turing", "alan@example.com", Some(1)),
    ("Katherine Johnson", "katherine@example.com", Some(2)),
    ("Edsger Dijkstra", "edsger@example.com", Some(0)),
    ("Margaret Hamilton", "margaret@example.com", None),
];

impl AppContext {
    pub fn new(store: Arc<dyn KeyValueStore>, options: DataServiceOptions) -> Self {
        let service = Arc::new(DataService::new(store, options));
        let validation = Arc::new(ValidationService::new());
        Self {
            courses: CourseManager::new(service.clone(), validation.clone()),
            students: StudentManager::new(service.clone(), validation.clone()),
            service,
            validation,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(config.open_store()?, config.service_options()))
    }

    /// Fresh memory-backed context with no latency
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DataServiceOptions::immediate())
    }

    /// Memory-backed context that keeps the configured latency
    pub fn scratch(config: &Config) -> Self {
        let options = DataServiceOptions {
            latency: config.latency(),
            ..DataServiceOptions::default()
        };
        Self::new(Arc::new(MemoryStore::new()), options)
    }

    /// Add a small demo catalog. Conflicts with existing data are skipped.
    pub async fn seed_demo_data(&self) -> DataResult<SeedReport> {
        let mut report = SeedReport::default();
        let mut course_ids = Vec::with_capacity(DEMO_COURSES.len());

        for (title, description, duration, instructor, difficulty) in DEMO_COURSES {
            let fields = CourseFields::new(title, description, *duration, instructor, difficulty);
            match self.courses.create_course(&fields).await {
                Ok(course) => {
                    report.courses += 1;
                    course_ids.push(Some(course.id));
                }
                Err(e) if e.is_conflict() => {
                    report.skipped += 1;
                    course_ids.push(None);
                }
                Err(e) => return Err(e),
            }
        }

        for (name, email, course) in DEMO_STUDENTS {
            let mut fields = StudentFields::new(name, email);
            if let Some(Some(course_id)) = course.and_then(|i| course_ids.get(i)) {
                fields = fields.with_course(course_id);
            }
            match self.students.create_student(&fields).await {
                Ok(_) => report.students += 1,
                Err(e) if e.is_conflict() => report.skipped += 1,
                Err(e) => return Err(e),
            }
        }

        info!(
            courses = report.courses,
            students = report.students,
            skipped = report.skipped,
            "Seeded demo data"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Query;

    #[tokio::test]
    async fn test_seed_is_consistent_and_repeatable() {
        let ctx = AppContext::in_memory();
        let first = ctx.seed_demo_data().await.unwrap();
        assert_eq!(first.courses, DEMO_COURSES.len());
        assert_eq!(first.students, DEMO_STUDENTS.len());
        assert!(ctx.service.verify_integrity().await.is_consistent());

        let second = ctx.seed_demo_data().await.unwrap();
        assert_eq!(second.courses, 0);
        assert_eq!(second.skipped, DEMO_COURSES.len() + DEMO_STUDENTS.len());
        assert_eq!(ctx.service.get_courses(&Query::all()).await.len(), DEMO_COURSES.len());
    }

    #[tokio::test]
    async fn test_managers_share_one_repository() {
        let ctx = AppContext::in_memory();
        let course = ctx
            .courses
            .create_course(&CourseFields::new(
                "Shared State",
                "Both managers see the same collections",
                5.0,
                "Grace Hopper",
                "beginner",
            ))
            .await
            .unwrap();
        ctx.students
            .create_student(&StudentFields::new("Ada Lovelace", "ada@example.com").with_course(&course.id))
            .await
            .unwrap();
        assert_eq!(ctx.courses.get_course(&course.id).await.unwrap().enrollment_count, 1);
    }
}
