//! Core library for coursekeep.
//!
//! A course and student record keeper: a repository that keeps enrollment
//! counts consistent across both collections, managers that add caching,
//! validation and observer events on top, and an in-process test harness.
//!
//! Frontends build one [`AppContext`] and drive it; nothing here is global.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod harness;
pub mod managers;
pub mod models;
pub mod service;
pub mod storage;
pub mod utils;
pub mod validation;

pub use config::{Config, StorageKind};
pub use context::{AppContext, SeedReport};
pub use error::{DataError, DataResult, PersistenceError, ValidationErrors};
pub use events::{CourseEvent, EventName, Observer, StudentEvent, SubscriptionId};
pub use harness::{builtin_suite, Selection, TestCategory, TestHarness, TestOptions, TestReport, TestStatus};
pub use managers::{
    CourseFilter, CourseListOptions, CourseManager, CourseStatistics, SimulationReport,
    StudentFilter, StudentListOptions, StudentManager, StudentStatistics,
};
pub use models::{
    Course, CourseFields, Difficulty, Query, SortOrder, SortSpec, Student, StudentFields,
    StudentStatus,
};
pub use service::{DataExport, DataService, DataServiceOptions, IntegrityReport};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use validation::{sanitize_input, ValidationMode, ValidationService};
