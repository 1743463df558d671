use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{SimulationReport, StudentListOptions, StudentStatistics, STUDENT_PROGRESS_STEP};
use crate::cache::QueryCache;
use crate::error::{DataError, DataResult};
use crate::events::{EventBus, Observer, StudentEvent, SubscriptionId};
use crate::models::{Course, Query, Student, StudentFields, PROGRESS_MAX};
use crate::service::DataService;
use crate::utils::{random_increment, round2};
use crate::validation::{sanitize_input, ValidationMode, ValidationService};

pub struct StudentManager {
    service: Arc<DataService>,
    validation: Arc<ValidationService>,
    cache: QueryCache<Vec<Student>>,
    events: EventBus<StudentEvent>,
}

impl StudentManager {
    pub fn new(service: Arc<DataService>, validation: Arc<ValidationService>) -> Self {
        Self {
            service,
            validation,
            cache: QueryCache::new("students"),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<StudentEvent>>) -> SubscriptionId {
        self.events.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    pub async fn get_students(
        &self,
        options: &StudentListOptions,
        use_cache: bool,
    ) -> Vec<Student> {
        self.events.emit(&StudentEvent::Loading);

        let key = options.cache_key();
        let revision = self.service.revision();
        let cached = if use_cache {
            self.cache.get(&key, revision)
        } else {
            None
        };

        let students = match cached {
            Some(students) => students,
            None => {
                let students = self.service.get_students(&options.to_query()).await;
                if use_cache {
                    self.cache.insert(key, students.clone(), revision);
                }
                students
            }
        };

        self.events.emit(&StudentEvent::Loaded(students.clone()));
        students
    }

    pub async fn get_student(&self, id: &str) -> Option<Student> {
        self.service.get_student(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Option<Student> {
        self.service.find_student_by_email(email).await
    }

    /// Case-insensitive match on name or email
    pub async fn search(&self, term: &str) -> Vec<Student> {
        let mut options = StudentListOptions::default();
        options.filter.search = Some(term.to_string());
        self.get_students(&options, true).await
    }

    /// Students currently enrolled in `course_id`
    pub async fn students_in_course(&self, course_id: &str) -> Vec<Student> {
        let mut options = StudentListOptions::default();
        options.filter.course_id = Some(course_id.to_string());
        self.get_students(&options, true).await
    }

    /// A present `course_id` enrolls the student as part of creation
    pub async fn create_student(&self, fields: &StudentFields) -> DataResult<Student> {
        let fields = sanitize_input(fields);
        let result = match self.validation.validate_student(&fields, ValidationMode::Create) {
            Ok(()) => self.service.create_student(&fields).await,
            Err(errors) => Err(errors.into()),
        };

        let student = self.settle(result)?;
        info!(student_id = %student.id, course_id = ?student.course_id, "Student created");
        self.events.emit(&StudentEvent::Created(student.clone()));
        Ok(student)
    }

    pub async fn update_student(&self, id: &str, fields: &StudentFields) -> DataResult<Student> {
        let fields = sanitize_input(fields);
        let result = match self.validation.validate_student(&fields, ValidationMode::Update) {
            Ok(()) => self.service.update_student(id, &fields).await,
            Err(errors) => Err(errors.into()),
        };

        let student = self.settle(result)?;
        self.events.emit(&StudentEvent::Updated(student.clone()));
        Ok(student)
    }

    pub async fn delete_student(&self, id: &str) -> DataResult<()> {
        let result = self.service.delete_student(id).await;
        self.settle(result)?;
        info!(student_id = %id, "Student deleted");
        self.events.emit(&StudentEvent::Deleted(id.to_string()));
        Ok(())
    }

    pub async fn update_student_progress(&self, id: &str, progress: f64) -> DataResult<Student> {
        let result = match self.validation.validate_progress(progress) {
            Ok(()) => self.service.update_student_progress(id, progress).await,
            Err(errors) => Err(errors.into()),
        };

        let student = self.settle(result)?;
        self.events.emit(&StudentEvent::Updated(student.clone()));
        Ok(student)
    }

    /// Fails when either side is missing or the student is already enrolled
    pub async fn enroll_student(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> DataResult<(Student, Course)> {
        let result = self.service.enroll_student(student_id, course_id).await;
        let (student, course) = self.settle(result)?;
        info!(student_id = %student_id, course_id = %course_id, "Student enrolled");
        self.events.emit(&StudentEvent::Updated(student.clone()));
        Ok((student, course))
    }

    pub async fn unenroll_student(&self, student_id: &str) -> DataResult<Student> {
        let result = self.service.unenroll_student(student_id).await;
        let (student, _) = self.settle(result)?;
        info!(student_id = %student_id, "Student unenrolled");
        self.events.emit(&StudentEvent::Updated(student.clone()));
        Ok(student)
    }

    pub async fn complete_lesson(&self, student_id: &str, lesson_id: &str) -> DataResult<Student> {
        let result = self.service.complete_lesson(student_id, lesson_id).await;
        let student = self.settle(result)?;
        self.events.emit(&StudentEvent::Updated(student.clone()));
        Ok(student)
    }

    pub async fn record_login(&self, student_id: &str) -> DataResult<Student> {
        let result = self.service.record_login(student_id).await;
        let student = self.settle(result)?;
        self.events.emit(&StudentEvent::Updated(student.clone()));
        Ok(student)
    }

    /// Advance every enrolled student below 100% by a random step, in
    /// collection order. A failure is logged and the batch moves on.
    pub async fn simulate_progress(&self) -> SimulationReport {
        let students = self
            .service
            .get_students(&Query::filtered(|s: &Student| s.is_enrolled() && s.progress < PROGRESS_MAX))
            .await;

        let mut report = SimulationReport::default();
        for student in students {
            report.attempted += 1;
            let step = random_increment(STUDENT_PROGRESS_STEP) as f64;
            let next = round2((student.progress + step).min(PROGRESS_MAX));
            match self.update_student_progress(&student.id, next).await {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(student_id = %student.id, error = %e, "Progress simulation step failed");
                    report.failed += 1;
                }
            }
        }
        debug!(?report, "Student progress simulated");
        report
    }

    pub async fn statistics(&self) -> StudentStatistics {
        let students = self.service.get_students(&Query::all()).await;
        StudentStatistics::from_students(&students)
    }

    /// Clear the cache after a mutation attempt and report any failure once
    fn settle<T>(&self, result: DataResult<T>) -> DataResult<T> {
        self.cache.clear();
        result.map_err(|err| {
            let event = match &err {
                DataError::Validation(errors) => StudentEvent::ValidationError(errors.clone()),
                other => StudentEvent::Error(other.clone()),
            };
            self.events.emit(&event);
            err
        })
    }
}
