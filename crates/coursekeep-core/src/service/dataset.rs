use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::models::{Course, Student};

/// Version stamped into every persisted blob
pub const DATA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// The single persisted record: both collections, settings and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    pub metadata: Metadata,
}

impl Dataset {
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            courses: Vec::new(),
            students: Vec::new(),
            settings: BTreeMap::new(),
            metadata: Metadata {
                version: DATA_VERSION.to_string(),
                created_at: now,
                last_updated: now,
            },
        }
    }

    /// Parse a stored blob and rehydrate it into validated entities.
    /// Any invalid record or broken reference marks the blob corrupt.
    pub fn from_blob(raw: &str) -> Result<Self, PersistenceError> {
        let data: Dataset = serde_json::from_str(raw)
            .map_err(|e| PersistenceError::Corrupt(format!("unreadable blob: {}", e)))?;

        for course in &data.courses {
            course.check().map_err(|e| {
                PersistenceError::Corrupt(format!("invalid course {}: {}", course.id, e))
            })?;
        }
        for student in &data.students {
            student.check().map_err(|e| {
                PersistenceError::Corrupt(format!("invalid student {}: {}", student.id, e))
            })?;
        }

        let mut emails = HashSet::new();
        for student in &data.students {
            if !emails.insert(student.email.to_lowercase()) {
                return Err(PersistenceError::Corrupt(format!(
                    "duplicate student email {}",
                    student.email
                )));
            }
        }

        let report = data.integrity();
        if !report.is_consistent() {
            return Err(PersistenceError::Corrupt(format!(
                "{} count mismatches, {} dangling references",
                report.count_mismatches.len(),
                report.dangling_references.len()
            )));
        }

        Ok(data)
    }

    pub fn to_blob(&self) -> Result<String, PersistenceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn course_index(&self, id: &str) -> Option<usize> {
        self.courses.iter().position(|c| c.id == id)
    }

    pub fn student_index(&self, id: &str) -> Option<usize> {
        self.students.iter().position(|s| s.id == id)
    }

    /// Scan both collections and compare against the stored counts.
    /// Verification only; counts are never repaired from this.
    pub fn integrity(&self) -> IntegrityReport {
        let mut actual: HashMap<&str, u32> = HashMap::new();
        let mut dangling_references = Vec::new();

        for student in &self.students {
            if let Some(course_id) = student.course_id.as_deref() {
                if self.course_index(course_id).is_some() {
                    *actual.entry(course_id).or_default() += 1;
                } else {
                    dangling_references.push(DanglingReference {
                        student_id: student.id.clone(),
                        course_id: course_id.to_string(),
                    });
                }
            }
        }

        let count_mismatches = self
            .courses
            .iter()
            .filter_map(|course| {
                let counted = actual.get(course.id.as_str()).copied().unwrap_or(0);
                (counted != course.enrollment_count).then(|| CountMismatch {
                    course_id: course.id.clone(),
                    stored: course.enrollment_count,
                    actual: counted,
                })
            })
            .collect();

        IntegrityReport {
            count_mismatches,
            dangling_references,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountMismatch {
    pub course_id: String,
    pub stored: u32,
    pub actual: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DanglingReference {
    pub student_id: String,
    pub course_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub count_mismatches: Vec<CountMismatch>,
    pub dangling_references: Vec<DanglingReference>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.count_mismatches.is_empty() && self.dangling_references.is_empty()
    }
}

/// Full dataset snapshot for external JSON/CSV producers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataExport {
    pub courses: Vec<Course>,
    pub students: Vec<Student>,
    pub settings: BTreeMap<String, Value>,
    pub metadata: Metadata,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseFields, StudentFields};

    fn sample() -> Dataset {
        let mut data = Dataset::empty();
        let mut course = Course::new(&CourseFields::new(
            "Intro to Rust",
            "Ownership, borrowing and lifetimes",
            10.0,
            "Ferris Crab",
            "beginner",
        ))
        .unwrap();
        let mut student =
            Student::new(&StudentFields::new("Ada Lovelace", "ada@example.com")).unwrap();
        student.enroll(&course.id).unwrap();
        course.increment_enrollment();
        data.courses.push(course);
        data.students.push(student);
        data
    }

    #[test]
    fn test_blob_roundtrip_keeps_layout() {
        let data = sample();
        let blob = data.to_blob().unwrap();
        let json: Value = serde_json::from_str(&blob).unwrap();
        assert!(json["courses"].is_array());
        assert!(json["students"].is_array());
        assert!(json["settings"].is_object());
        assert_eq!(json["metadata"]["version"], DATA_VERSION);
        assert!(json["metadata"]["lastUpdated"].is_string());

        let back = Dataset::from_blob(&blob).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_from_blob_rejects_garbage() {
        assert!(matches!(
            Dataset::from_blob("{not json"),
            Err(PersistenceError::Corrupt(_))
        ));
    }

    #[test]
    fn test_from_blob_rejects_count_mismatch() {
        let mut data = sample();
        data.courses[0].enrollment_count = 3;
        let blob = data.to_blob().unwrap();
        assert!(matches!(
            Dataset::from_blob(&blob),
            Err(PersistenceError::Corrupt(_))
        ));
    }

    #[test]
    fn test_integrity_reports_dangling_reference() {
        let mut data = sample();
        data.courses.clear();
        let report = data.integrity();
        assert_eq!(report.dangling_references.len(), 1);
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_integrity_consistent_sample() {
        assert!(sample().integrity().is_consistent());
    }
}
