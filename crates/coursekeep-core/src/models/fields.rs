use serde::{Deserialize, Serialize};

/// Raw course input. On create the required fields must be present;
/// on update only the present fields are validated and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseFields {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl CourseFields {
    pub fn new(
        title: &str,
        description: &str,
        duration: f64,
        instructor: &str,
        difficulty: &str,
    ) -> Self {
        Self {
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            duration: Some(duration),
            instructor: Some(instructor.to_string()),
            difficulty: Some(difficulty.to_string()),
            is_active: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Raw student input. `course_id` is honored on create only; enrollment
/// changes after creation go through enroll/unenroll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// `Some("")` clears the phone number on update
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl StudentFields {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_course(mut self, course_id: &str) -> Self {
        self.course_id = Some(course_id.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
