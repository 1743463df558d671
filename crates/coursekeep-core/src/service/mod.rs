//! The repository: authoritative Course and Student collections.
//!
//! `DataService` owns both collections inside one `Dataset` behind a single
//! async mutex. Each mutation, its enrollment-count adjustment and the
//! persistence write happen while that lock is held, so no caller can observe
//! a count that disagrees with the student references. Reads return copies.
//!
//! Every call first waits out the configured latency to simulate a remote
//! store. The blob itself lives in a `KeyValueStore` under one key.

pub mod dataset;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{DataError, DataResult, PersistenceError};
use crate::models::student::normalize_email;
use crate::models::{check_progress, Course, CourseFields, Query, Student, StudentFields};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::utils::{decode_html, delay, RetryPolicy};

pub use dataset::{DataExport, Dataset, IntegrityReport, Metadata, DATA_VERSION};

/// Default key the dataset blob is stored under
pub const DEFAULT_STORAGE_KEY: &str = "coursekeep-data";

/// Default simulated round-trip latency
pub const DEFAULT_LATENCY_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct DataServiceOptions {
    pub storage_key: String,
    pub latency: Duration,
    /// Applied to the initial store read only
    pub load_retry: RetryPolicy,
}

impl Default for DataServiceOptions {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            latency: Duration::from_millis(DEFAULT_LATENCY_MS),
            load_retry: RetryPolicy::exponential(2, Duration::from_millis(50)),
        }
    }
}

impl DataServiceOptions {
    /// No latency and no retries, for tests
    pub fn immediate() -> Self {
        Self {
            latency: Duration::ZERO,
            load_retry: RetryPolicy::none(),
            ..Self::default()
        }
    }
}

pub struct DataService {
    store: Arc<dyn KeyValueStore>,
    options: DataServiceOptions,
    state: Mutex<Dataset>,
    initialized: AtomicBool,
    revision: AtomicU64,
}

impl DataService {
    pub fn new(store: Arc<dyn KeyValueStore>, options: DataServiceOptions) -> Self {
        Self {
            store,
            options,
            state: Mutex::new(Dataset::empty()),
            initialized: AtomicBool::new(false),
            revision: AtomicU64::new(0),
        }
    }

    /// Memory-backed service with no latency
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DataServiceOptions::immediate())
    }

    pub fn options(&self) -> &DataServiceOptions {
        &self.options
    }

    /// Counter bumped on every committed mutation
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Load the persisted blob, or seed and persist an empty dataset.
    /// Safe to call repeatedly; only the first successful call does any work.
    pub async fn initialize(&self) -> DataResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        delay(self.options.latency).await;
        let mut data = self.state.lock().await;
        self.initialize_locked(&mut data).await;
        Ok(())
    }

    /// Callers have already paid the simulated latency
    async fn initialize_locked(&self, data: &mut Dataset) {
        if self.is_initialized() {
            return;
        }

        let key = self.options.storage_key.as_str();
        let raw = self
            .options
            .load_retry
            .run(move |_| async move { self.store.get(key) })
            .await;

        let loaded = match raw {
            Ok(Some(blob)) => match Dataset::from_blob(&blob) {
                Ok(loaded) => Some(loaded),
                Err(e) => {
                    error!(key = key, error = %e, "Stored data unusable, starting from an empty dataset");
                    None
                }
            },
            Ok(None) => {
                info!(key = key, "No stored data, seeding an empty dataset");
                None
            }
            Err(e) => {
                error!(key = key, error = %e, "Failed to read stored data, starting from an empty dataset");
                None
            }
        };

        match loaded {
            Some(loaded) => {
                info!(
                    courses = loaded.courses.len(),
                    students = loaded.students.len(),
                    version = %loaded.metadata.version,
                    "Loaded dataset"
                );
                *data = loaded;
            }
            None => {
                *data = Dataset::empty();
                if let Err(e) = self.persist(data) {
                    error!(error = %e, "Failed to persist the empty dataset; continuing in memory");
                }
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Wait out the latency, then lock the dataset, initializing on first use
    async fn ready(&self) -> MutexGuard<'_, Dataset> {
        delay(self.options.latency).await;
        let mut data = self.state.lock().await;
        if !self.is_initialized() {
            self.initialize_locked(&mut data).await;
        }
        data
    }

    fn persist(&self, data: &Dataset) -> Result<(), PersistenceError> {
        let blob = data.to_blob()?;
        self.store.set(&self.options.storage_key, &blob)?;
        debug!(key = %self.options.storage_key, bytes = blob.len(), "Persisted dataset");
        Ok(())
    }

    /// Finish a mutation: stamp, bump the revision, write through.
    /// On a write failure the in-memory change stands.
    fn commit(&self, data: &mut Dataset) -> DataResult<()> {
        data.metadata.last_updated = Utc::now();
        self.revision.fetch_add(1, Ordering::SeqCst);
        self.persist(data).map_err(|e| {
            warn!(error = %e, "Persist failed; in-memory state remains authoritative");
            DataError::from(e)
        })
    }

    // ===== Reads =====

    pub async fn get_courses(&self, query: &Query<Course>) -> Vec<Course> {
        let data = self.ready().await;
        query.apply(&data.courses)
    }

    pub async fn get_students(&self, query: &Query<Student>) -> Vec<Student> {
        let data = self.ready().await;
        query.apply(&data.students)
    }

    /// `None` when the id is unknown
    pub async fn get_course(&self, id: &str) -> Option<Course> {
        let data = self.ready().await;
        data.courses.iter().find(|c| c.id == id).cloned()
    }

    /// `None` when the id is unknown
    pub async fn get_student(&self, id: &str) -> Option<Student> {
        let data = self.ready().await;
        data.students.iter().find(|s| s.id == id).cloned()
    }

    pub async fn find_student_by_email(&self, email: &str) -> Option<Student> {
        let email = normalize_email(email);
        let data = self.ready().await;
        data.students.iter().find(|s| s.email == email).cloned()
    }

    // ===== Courses =====

    pub async fn create_course(&self, fields: &CourseFields) -> DataResult<Course> {
        let mut data = self.ready().await;
        let course = Course::new(fields)?;

        if title_taken(&data, &course.title, None) {
            return Err(DataError::conflict(format!(
                "A course titled '{}' already exists",
                course.title
            )));
        }

        data.courses.push(course.clone());
        self.commit(&mut data)?;
        debug!(course_id = %course.id, title = %course.title, "Created course");
        Ok(course)
    }

    pub async fn update_course(&self, id: &str, fields: &CourseFields) -> DataResult<Course> {
        let mut data = self.ready().await;
        let idx = data
            .course_index(id)
            .ok_or_else(|| DataError::not_found("Course", id))?;

        if let Some(title) = &fields.title {
            if title_taken(&data, title.trim(), Some(id)) {
                return Err(DataError::conflict(format!(
                    "A course titled '{}' already exists",
                    title.trim()
                )));
            }
        }

        data.courses[idx].apply(fields)?;
        let course = data.courses[idx].clone();
        self.commit(&mut data)?;
        Ok(course)
    }

    pub async fn update_course_progress(&self, id: &str, progress: f64) -> DataResult<Course> {
        let progress = check_progress(progress)?;
        let mut data = self.ready().await;
        let idx = data
            .course_index(id)
            .ok_or_else(|| DataError::not_found("Course", id))?;

        data.courses[idx].update_progress(progress)?;
        let course = data.courses[idx].clone();
        self.commit(&mut data)?;
        Ok(course)
    }

    /// Blocked while any student references the course
    pub async fn delete_course(&self, id: &str) -> DataResult<Course> {
        let mut data = self.ready().await;
        let idx = data
            .course_index(id)
            .ok_or_else(|| DataError::not_found("Course", id))?;

        let enrolled = data
            .students
            .iter()
            .filter(|s| s.course_id.as_deref() == Some(id))
            .count();
        if enrolled > 0 {
            return Err(DataError::conflict(format!(
                "Cannot delete course with {} enrolled student(s)",
                enrolled
            )));
        }

        let course = data.courses.remove(idx);
        self.commit(&mut data)?;
        debug!(course_id = %course.id, "Deleted course");
        Ok(course)
    }

    // ===== Students =====

    /// Creating with a `course_id` enrolls the student in the same step
    pub async fn create_student(&self, fields: &StudentFields) -> DataResult<Student> {
        let mut data = self.ready().await;
        let student = Student::new(fields)?;

        if email_taken(&data, &student.email, None) {
            return Err(DataError::conflict(format!(
                "A student with email '{}' already exists",
                student.email
            )));
        }

        let course_idx = match student.course_id.as_deref() {
            Some(course_id) => Some(
                data.course_index(course_id)
                    .ok_or_else(|| DataError::not_found("Course", course_id))?,
            ),
            None => None,
        };

        if let Some(idx) = course_idx {
            data.courses[idx].increment_enrollment();
        }
        data.students.push(student.clone());
        self.commit(&mut data)?;
        debug!(student_id = %student.id, course_id = ?student.course_id, "Created student");
        Ok(student)
    }

    /// Merge profile fields. Enrollment is changed only through enroll/unenroll.
    pub async fn update_student(&self, id: &str, fields: &StudentFields) -> DataResult<Student> {
        let mut data = self.ready().await;
        let idx = data
            .student_index(id)
            .ok_or_else(|| DataError::not_found("Student", id))?;

        if let Some(email) = &fields.email {
            let email = normalize_email(email);
            if email_taken(&data, &email, Some(id)) {
                return Err(DataError::conflict(format!(
                    "A student with email '{}' already exists",
                    email
                )));
            }
        }
        if fields.course_id.is_some() {
            debug!(student_id = %id, "Ignoring course_id on update; use enroll/unenroll");
        }

        data.students[idx].apply(fields)?;
        let student = data.students[idx].clone();
        self.commit(&mut data)?;
        Ok(student)
    }

    pub async fn update_student_progress(&self, id: &str, progress: f64) -> DataResult<Student> {
        let progress = check_progress(progress)?;
        let mut data = self.ready().await;
        let idx = data
            .student_index(id)
            .ok_or_else(|| DataError::not_found("Student", id))?;

        data.students[idx].update_progress(progress)?;
        let student = data.students[idx].clone();
        self.commit(&mut data)?;
        Ok(student)
    }

    pub async fn complete_lesson(&self, id: &str, lesson_id: &str) -> DataResult<Student> {
        let mut data = self.ready().await;
        let idx = data
            .student_index(id)
            .ok_or_else(|| DataError::not_found("Student", id))?;

        if data.students[idx].complete_lesson(lesson_id)? {
            self.commit(&mut data)?;
        }
        Ok(data.students[idx].clone())
    }

    pub async fn record_login(&self, id: &str) -> DataResult<Student> {
        let mut data = self.ready().await;
        let idx = data
            .student_index(id)
            .ok_or_else(|| DataError::not_found("Student", id))?;

        data.students[idx].record_login();
        let student = data.students[idx].clone();
        self.commit(&mut data)?;
        Ok(student)
    }

    /// Removing an enrolled student releases their seat in the course
    pub async fn delete_student(&self, id: &str) -> DataResult<Student> {
        let mut data = self.ready().await;
        let idx = data
            .student_index(id)
            .ok_or_else(|| DataError::not_found("Student", id))?;

        if let Some(course_id) = data.students[idx].course_id.clone() {
            match data.course_index(&course_id) {
                Some(c) => data.courses[c].decrement_enrollment()?,
                None => warn!(student_id = %id, course_id = %course_id, "Deleted student referenced a missing course"),
            }
        }

        let student = data.students.remove(idx);
        self.commit(&mut data)?;
        debug!(student_id = %student.id, "Deleted student");
        Ok(student)
    }

    // ===== Enrollment =====

    /// Enroll a student who is not enrolled anywhere. The student and the
    /// course count change together.
    pub async fn enroll_student(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> DataResult<(Student, Course)> {
        let mut data = self.ready().await;
        let c = data
            .course_index(course_id)
            .ok_or_else(|| DataError::not_found("Course", course_id))?;
        let s = data
            .student_index(student_id)
            .ok_or_else(|| DataError::not_found("Student", student_id))?;

        data.students[s]
            .enroll(course_id)
            .map_err(DataError::Conflict)?;
        data.courses[c].increment_enrollment();

        let pair = (data.students[s].clone(), data.courses[c].clone());
        self.commit(&mut data)?;
        debug!(student_id = %student_id, course_id = %course_id, "Enrolled student");
        Ok(pair)
    }

    /// Inverse of `enroll_student`. Returns the course left, if it still exists.
    pub async fn unenroll_student(&self, student_id: &str) -> DataResult<(Student, Option<Course>)> {
        let mut data = self.ready().await;
        let s = data
            .student_index(student_id)
            .ok_or_else(|| DataError::not_found("Student", student_id))?;

        let course_id = data.students[s]
            .course_id
            .clone()
            .ok_or_else(|| {
                DataError::conflict(format!(
                    "Student {} is not enrolled in any course",
                    student_id
                ))
            })?;
        let c = data.course_index(&course_id);
        if let Some(c) = c {
            data.courses[c].decrement_enrollment()?;
        }
        data.students[s].unenroll().map_err(DataError::Conflict)?;

        let student = data.students[s].clone();
        let course = c.map(|c| data.courses[c].clone());
        self.commit(&mut data)?;
        debug!(student_id = %student_id, course_id = %course_id, "Unenrolled student");
        Ok((student, course))
    }

    // ===== Dataset-wide =====

    pub async fn export_data(&self) -> DataExport {
        let data = self.ready().await;
        DataExport {
            courses: data.courses.clone(),
            students: data.students.clone(),
            settings: data.settings.clone(),
            metadata: data.metadata.clone(),
            exported_at: Utc::now(),
        }
    }

    pub async fn settings(&self) -> std::collections::BTreeMap<String, Value> {
        self.ready().await.settings.clone()
    }

    pub async fn update_setting(&self, key: &str, value: Value) -> DataResult<()> {
        let mut data = self.ready().await;
        data.settings.insert(key.to_string(), value);
        self.commit(&mut data)
    }

    /// Drop every record and persist the empty dataset
    pub async fn clear_all_data(&self) -> DataResult<()> {
        let mut data = self.ready().await;
        *data = Dataset::empty();
        info!("Cleared all data");
        self.commit(&mut data)
    }

    pub async fn verify_integrity(&self) -> IntegrityReport {
        self.ready().await.integrity()
    }
}

/// Titles compare case-insensitively on their decoded text
fn title_taken(data: &Dataset, title: &str, except: Option<&str>) -> bool {
    let title = decode_html(title.trim()).to_lowercase();
    data.courses.iter().any(|c| {
        Some(c.id.as_str()) != except && decode_html(c.title.trim()).to_lowercase() == title
    })
}

fn email_taken(data: &Dataset, email: &str, except: Option<&str>) -> bool {
    data.students
        .iter()
        .any(|s| Some(s.id.as_str()) != except && s.email == email)
}
