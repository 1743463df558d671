use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{CourseListOptions, CourseStatistics, SimulationReport, COURSE_PROGRESS_STEP};
use crate::cache::QueryCache;
use crate::error::{DataError, DataResult};
use crate::events::{CourseEvent, EventBus, Observer, SubscriptionId};
use crate::models::{Course, CourseFields, Query, PROGRESS_MAX};
use crate::service::DataService;
use crate::utils::{random_increment, round2};
use crate::validation::{sanitize_input, ValidationMode, ValidationService};

pub struct CourseManager {
    service: Arc<DataService>,
    validation: Arc<ValidationService>,
    cache: QueryCache<Vec<Course>>,
    events: EventBus<CourseEvent>,
}

impl CourseManager {
    pub fn new(service: Arc<DataService>, validation: Arc<ValidationService>) -> Self {
        Self {
            service,
            validation,
            cache: QueryCache::new("courses"),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<CourseEvent>>) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Number of cached list queries, including expired ones
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    /// List courses. With `use_cache`, a fresh entry for the same options is
    /// returned without touching the repository.
    pub async fn get_courses(&self, options: &CourseListOptions, use_cache: bool) -> Vec<Course> {
        self.events.emit(&CourseEvent::Loading);

        let key = options.cache_key();
        let revision = self.service.revision();
        let cached = if use_cache {
            self.cache.get(&key, revision)
        } else {
            None
        };

        let courses = match cached {
            Some(courses) => courses,
            None => {
                let courses = self.service.get_courses(&options.to_query()).await;
                if use_cache {
                    self.cache.insert(key, courses.clone(), revision);
                }
                courses
            }
        };

        self.events.emit(&CourseEvent::Loaded(courses.clone()));
        courses
    }

    /// `None` when the id is unknown
    pub async fn get_course(&self, id: &str) -> Option<Course> {
        self.service.get_course(id).await
    }

    /// Case-insensitive match on title, description or instructor
    pub async fn search(&self, term: &str) -> Vec<Course> {
        let mut options = CourseListOptions::default();
        options.filter.search = Some(term.to_string());
        self.get_courses(&options, true).await
    }

    pub async fn create_course(&self, fields: &CourseFields) -> DataResult<Course> {
        let fields = sanitize_input(fields);
        let result = match self.validation.validate_course(&fields, ValidationMode::Create) {
            Ok(()) => self.service.create_course(&fields).await,
            Err(errors) => Err(errors.into()),
        };

        let course = self.settle(result)?;
        info!(course_id = %course.id, title = %course.title, "Course created");
        self.events.emit(&CourseEvent::Created(course.clone()));
        Ok(course)
    }

    pub async fn update_course(&self, id: &str, fields: &CourseFields) -> DataResult<Course> {
        let fields = sanitize_input(fields);
        let result = match self.validation.validate_course(&fields, ValidationMode::Update) {
            Ok(()) => self.service.update_course(id, &fields).await,
            Err(errors) => Err(errors.into()),
        };

        let course = self.settle(result)?;
        self.events.emit(&CourseEvent::Updated(course.clone()));
        Ok(course)
    }

    pub async fn delete_course(&self, id: &str) -> DataResult<()> {
        let result = self.service.delete_course(id).await;
        self.settle(result)?;
        info!(course_id = %id, "Course deleted");
        self.events.emit(&CourseEvent::Deleted(id.to_string()));
        Ok(())
    }

    /// The value is validated before the repository is consulted
    pub async fn update_course_progress(&self, id: &str, progress: f64) -> DataResult<Course> {
        let result = match self.validation.validate_progress(progress) {
            Ok(()) => self.service.update_course_progress(id, progress).await,
            Err(errors) => Err(errors.into()),
        };

        let course = self.settle(result)?;
        self.events.emit(&CourseEvent::Updated(course.clone()));
        Ok(course)
    }

    pub async fn activate_course(&self, id: &str) -> DataResult<Course> {
        self.update_course(id, &CourseFields { is_active: Some(true), ..Default::default() })
            .await
    }

    pub async fn deactivate_course(&self, id: &str) -> DataResult<Course> {
        self.update_course(id, &CourseFields { is_active: Some(false), ..Default::default() })
            .await
    }

    /// Advance every active course below 100% by a random step, one at a time.
    /// A failure is logged and the batch moves on.
    pub async fn simulate_progress(&self) -> SimulationReport {
        let courses = self
            .service
            .get_courses(&Query::filtered(|c: &Course| c.is_active && !c.is_completed()))
            .await;

        let mut report = SimulationReport::default();
        for course in courses {
            report.attempted += 1;
            let step = random_increment(COURSE_PROGRESS_STEP) as f64;
            let next = round2((course.progress + step).min(PROGRESS_MAX));
            match self.update_course_progress(&course.id, next).await {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(course_id = %course.id, error = %e, "Progress simulation step failed");
                    report.failed += 1;
                }
            }
        }
        debug!(?report, "Course progress simulated");
        report
    }

    pub async fn statistics(&self) -> CourseStatistics {
        let courses = self.service.get_courses(&Query::all()).await;
        CourseStatistics::from_courses(&courses)
    }

    /// Clear the cache after a mutation attempt and report any failure once
    fn settle<T>(&self, result: DataResult<T>) -> DataResult<T> {
        self.cache.clear();
        result.map_err(|err| {
            let event = match &err {
                DataError::Validation(errors) => CourseEvent::ValidationError(errors.clone()),
                other => CourseEvent::Error(other.clone()),
            };
            self.events.emit(&event);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventName;
    use std::sync::Mutex;

    fn manager() -> CourseManager {
        CourseManager::new(
            Arc::new(DataService::in_memory()),
            Arc::new(ValidationService::new()),
        )
    }

    fn fields(title: &str) -> CourseFields {
        CourseFields::new(
            title,
            "A thorough introduction to the topic",
            10.0,
            "Grace Hopper",
            "beginner",
        )
    }

    fn recorder(manager: &CourseManager) -> Arc<Mutex<Vec<&'static str>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.subscribe(Arc::new(move |e: &CourseEvent| -> anyhow::Result<()> {
            sink.lock().unwrap().push(e.name());
            Ok(())
        }));
        seen
    }

    #[tokio::test]
    async fn test_read_after_write_sees_new_course() {
        let manager = manager();
        let options = CourseListOptions::default();
        assert!(manager.get_courses(&options, true).await.is_empty());
        assert_eq!(manager.cached_queries(), 1);

        manager.create_course(&fields("Intro to X")).await.unwrap();
        assert_eq!(manager.cached_queries(), 0);

        let courses = manager.get_courses(&options, true).await;
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].title, "Intro to X");
    }

    #[tokio::test]
    async fn test_failed_mutation_clears_cache_and_reports_once() {
        let manager = manager();
        manager.get_courses(&CourseListOptions::default(), true).await;
        let seen = recorder(&manager);

        let err = manager.delete_course("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(manager.cached_queries(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["courseError"]);
    }

    #[tokio::test]
    async fn test_validation_failure_reports_every_field() {
        let manager = manager();
        let seen = recorder(&manager);

        let bad = CourseFields {
            title: Some("X".to_string()),
            duration: Some(0.0),
            ..Default::default()
        };
        let err = manager.create_course(&bad).await.unwrap_err();
        let DataError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        for field in ["title", "description", "duration", "instructor", "difficulty"] {
            assert!(errors.contains(field), "missing {}", field);
        }
        assert_eq!(*seen.lock().unwrap(), vec!["courseValidationError"]);
    }

    #[tokio::test]
    async fn test_events_for_lifecycle() {
        let manager = manager();
        let seen = recorder(&manager);

        let course = manager.create_course(&fields("Rust 101")).await.unwrap();
        manager.update_course_progress(&course.id, 40.0).await.unwrap();
        manager.get_courses(&CourseListOptions::default(), false).await;
        manager.delete_course(&course.id).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "courseCreated",
                "courseUpdated",
                "coursesLoading",
                "coursesLoaded",
                "courseDeleted"
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_rejected_before_repository() {
        let manager = manager();
        let course = manager.create_course(&fields("Rust 101")).await.unwrap();
        let err = manager
            .update_course_progress(&course.id, 150.0)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(manager.get_course(&course.id).await.unwrap().progress, 0.0);

        let err = manager.update_course_progress("missing", 150.0).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_sanitized_title_is_stored() {
        let manager = manager();
        let course = manager
            .create_course(&fields("<b>Rust</b> & Friends"))
            .await
            .unwrap();
        assert_eq!(course.title, "Rust &amp; Friends");
    }

    #[tokio::test]
    async fn test_comparison_text_is_kept_whole() {
        let manager = manager();
        let mut input = fields("Sorting where a < b holds");
        input.description = Some("Compare keys when x < y and more text".to_string());
        let course = manager.create_course(&input).await.unwrap();
        assert_eq!(course.title, "Sorting where a &lt; b holds");
        assert_eq!(course.description, "Compare keys when x &lt; y and more text");
    }

    #[tokio::test]
    async fn test_resaving_stored_text_leaves_it_unchanged() {
        let manager = manager();
        let created = manager
            .create_course(&fields("<b>Rust</b> & Friends"))
            .await
            .unwrap();
        for _ in 0..3 {
            let stored = manager.get_course(&created.id).await.unwrap();
            let patch = CourseFields {
                title: Some(stored.title.clone()),
                description: Some(stored.description.clone()),
                ..Default::default()
            };
            let saved = manager.update_course(&created.id, &patch).await.unwrap();
            assert_eq!(saved.title, "Rust &amp; Friends");
            assert_eq!(saved.description, created.description);
        }
    }

    #[tokio::test]
    async fn test_title_limits_apply_to_plain_text() {
        let manager = manager();
        let title = format!("{} & {}", "a".repeat(48), "b".repeat(49));
        let course = manager.create_course(&fields(&title)).await.unwrap();
        assert_eq!(course.title, title.replace('&', "&amp;"));

        manager.create_course(&fields("Rust & Go")).await.unwrap();
        let err = manager
            .create_course(&fields("rust &amp; go"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_simulate_progress_clamps() {
        let manager = manager();
        let course = manager.create_course(&fields("Rust 101")).await.unwrap();
        manager.update_course_progress(&course.id, 99.0).await.unwrap();
        let mut inactive = manager.create_course(&fields("Go 101")).await.unwrap();
        inactive = manager.deactivate_course(&inactive.id).await.unwrap();

        let report = manager.simulate_progress().await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(manager.get_course(&course.id).await.unwrap().progress, 100.0);
        assert_eq!(manager.get_course(&inactive.id).await.unwrap().progress, 0.0);
    }

    #[tokio::test]
    async fn test_search_and_statistics() {
        let manager = manager();
        manager.create_course(&fields("Rust 101")).await.unwrap();
        manager.create_course(&fields("Go 101")).await.unwrap();

        assert_eq!(manager.search("rust").await.len(), 1);
        let stats = manager.statistics().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.average_duration, 10.0);
    }
}
