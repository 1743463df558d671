//! Input validation ahead of the repository.
//!
//! `ValidationService` holds a registry of named field validators. The
//! entity-level checks (`validate_course`, `validate_student`) run every rule
//! for their entity and report all violated fields together.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::error::ValidationErrors;
use crate::models::course::{DESCRIPTION_LEN, DURATION_HOURS, INSTRUCTOR_LEN, TITLE_LEN};
use crate::models::student::NAME_LEN;
use crate::models::{CourseFields, Difficulty, StudentFields, PROGRESS_MAX, PROGRESS_MIN};
use crate::utils::{decode_html, encode_html, is_valid_email, is_valid_name, is_valid_phone};

#[derive(Error, Debug, PartialEq)]
pub enum ValidatorError {
    #[error("No validator registered under '{0}'")]
    Unknown(String),
}

/// Pass/fail with a readable message
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub message: String,
}

impl ValidationOutcome {
    pub fn pass() -> Self {
        Self {
            valid: true,
            message: String::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Parameters for a validator call
#[derive(Debug, Clone, Default)]
pub struct RuleOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Human-readable name used in messages; defaults to "Value"
    pub label: Option<String>,
}

impl RuleOptions {
    pub fn label(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            ..Default::default()
        }
    }

    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("Value")
    }
}

pub type Validator = Arc<dyn Fn(&Value, &RuleOptions) -> ValidationOutcome + Send + Sync>;

/// Whether required fields must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

pub struct ValidationService {
    validators: RwLock<HashMap<String, Validator>>,
}

impl Default for ValidationService {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationService {
    /// A service with the built-in validators registered
    pub fn new() -> Self {
        let service = Self {
            validators: RwLock::new(HashMap::new()),
        };
        service.register("required", required);
        service.register("length", length);
        service.register("range", range);
        service.register("email", email);
        service.register("phone", phone);
        service.register("name", name);
        service.register("difficulty", difficulty);
        service.register("progress", progress);
        service
    }

    /// Add or replace a validator
    pub fn register<F>(&self, name: &str, validator: F)
    where
        F: Fn(&Value, &RuleOptions) -> ValidationOutcome + Send + Sync + 'static,
    {
        let mut validators = self.validators.write().unwrap_or_else(|e| e.into_inner());
        validators.insert(name.to_string(), Arc::new(validator));
    }

    pub fn has(&self, name: &str) -> bool {
        let validators = self.validators.read().unwrap_or_else(|e| e.into_inner());
        validators.contains_key(name)
    }

    pub fn validate_field(
        &self,
        name: &str,
        value: &Value,
        options: &RuleOptions,
    ) -> Result<ValidationOutcome, ValidatorError> {
        let validator = {
            let validators = self.validators.read().unwrap_or_else(|e| e.into_inner());
            validators
                .get(name)
                .cloned()
                .ok_or_else(|| ValidatorError::Unknown(name.to_string()))?
        };
        Ok(validator(value, options))
    }

    /// Check every course rule. In update mode absent fields are skipped.
    pub fn validate_course(
        &self,
        fields: &CourseFields,
        mode: ValidationMode,
    ) -> Result<(), ValidationErrors> {
        let mut checker = Checker::new(self, mode);

        checker.text("title", "Title", &fields.title, &[("length", len_bounds(&TITLE_LEN))]);
        checker.text(
            "description",
            "Description",
            &fields.description,
            &[("length", len_bounds(&DESCRIPTION_LEN))],
        );
        checker.text(
            "instructor",
            "Instructor",
            &fields.instructor,
            &[("length", len_bounds(&INSTRUCTOR_LEN)), ("name", None)],
        );
        checker.field(
            "duration",
            "Duration",
            fields.duration.map(Value::from),
            &[(
                "range",
                Some((*DURATION_HOURS.start() as f64, *DURATION_HOURS.end() as f64)),
            )],
        );
        if let Some(d) = fields.duration {
            if d.is_finite() && d.fract() != 0.0 {
                checker.errors.add("duration", "Duration must be a whole number of hours");
            }
        }
        checker.text("difficulty", "Difficulty", &fields.difficulty, &[("difficulty", None)]);

        checker.finish()
    }

    /// Check every student rule. `course_id` is never required.
    pub fn validate_student(
        &self,
        fields: &StudentFields,
        mode: ValidationMode,
    ) -> Result<(), ValidationErrors> {
        let mut checker = Checker::new(self, mode);

        checker.text(
            "name",
            "Name",
            &fields.name,
            &[("length", len_bounds(&NAME_LEN)), ("name", None)],
        );
        checker.text("email", "Email", &fields.email, &[("email", None)]);
        if let Some(phone_value) = fields.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            checker.run("phone", "Phone", &Value::from(phone_value), "phone", None);
        }

        checker.finish()
    }

    /// Validate a progress value on its own
    pub fn validate_progress(&self, value: f64) -> Result<(), ValidationErrors> {
        let mut checker = Checker::new(self, ValidationMode::Create);
        checker.run("progress", "Progress", &Value::from(value), "progress", None);
        checker.finish()
    }
}

static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern compiles"))
}

/// Remove complete `<...>` spans, then trim. A `<` with no closing `>` is kept.
pub fn strip_tags(input: &str) -> String {
    tag_re().replace_all(input, "").trim().to_string()
}

/// Strip markup tags and encode HTML-significant characters.
/// Entities already present are decoded first, so the result is stable
/// when a stored value is sanitized again.
pub fn sanitize_str(input: &str) -> String {
    encode_html(&strip_tags(&decode_html(input)))
}

/// Inputs whose string fields can be neutralized before storage.
/// Free text is encoded; shape-checked fields are only tag-stripped.
pub trait Sanitize {
    fn sanitized(&self) -> Self;
}

impl Sanitize for CourseFields {
    fn sanitized(&self) -> Self {
        Self {
            title: self.title.as_deref().map(sanitize_str),
            description: self.description.as_deref().map(sanitize_str),
            instructor: self.instructor.as_deref().map(strip_tags),
            difficulty: self.difficulty.as_deref().map(strip_tags),
            ..self.clone()
        }
    }
}

impl Sanitize for StudentFields {
    fn sanitized(&self) -> Self {
        Self {
            name: self.name.as_deref().map(strip_tags),
            email: self.email.as_deref().map(strip_tags),
            phone: self.phone.as_deref().map(strip_tags),
            course_id: self.course_id.as_deref().map(strip_tags),
            ..self.clone()
        }
    }
}

pub fn sanitize_input<T: Sanitize>(input: &T) -> T {
    input.sanitized()
}

fn len_bounds(bounds: &std::ops::RangeInclusive<usize>) -> Option<(f64, f64)> {
    Some((*bounds.start() as f64, *bounds.end() as f64))
}

/// Runs registry validators and collects failures per field
struct Checker<'a> {
    service: &'a ValidationService,
    mode: ValidationMode,
    errors: ValidationErrors,
}

impl<'a> Checker<'a> {
    fn new(service: &'a ValidationService, mode: ValidationMode) -> Self {
        Self {
            service,
            mode,
            errors: ValidationErrors::new(),
        }
    }

    fn text(
        &mut self,
        field: &str,
        label: &str,
        value: &Option<String>,
        rules: &[(&str, Option<(f64, f64)>)],
    ) {
        self.field(field, label, value.as_deref().map(Value::from), rules);
    }

    fn field(
        &mut self,
        field: &str,
        label: &str,
        value: Option<Value>,
        rules: &[(&str, Option<(f64, f64)>)],
    ) {
        let value = match (value, self.mode) {
            (Some(v), _) => v,
            (None, ValidationMode::Update) => return,
            (None, ValidationMode::Create) => Value::Null,
        };
        if !self.run(field, label, &value, "required", None) {
            return;
        }
        for (rule, bounds) in rules {
            if !self.run(field, label, &value, rule, *bounds) {
                return;
            }
        }
    }

    fn run(
        &mut self,
        field: &str,
        label: &str,
        value: &Value,
        rule: &str,
        bounds: Option<(f64, f64)>,
    ) -> bool {
        let mut options = RuleOptions::label(label);
        if let Some((min, max)) = bounds {
            options = options.bounds(min, max);
        }
        match self.service.validate_field(rule, value, &options) {
            Ok(outcome) if outcome.valid => true,
            Ok(outcome) => {
                self.errors.add(field, outcome.message);
                false
            }
            Err(e) => {
                self.errors.add(field, e.to_string());
                false
            }
        }
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        self.errors.into_result()
    }
}

// ===== Built-in validators =====

fn required(value: &Value, opts: &RuleOptions) -> ValidationOutcome {
    let present = match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    };
    if present {
        ValidationOutcome::pass()
    } else {
        ValidationOutcome::fail(format!("{} is required", opts.name()))
    }
}

fn length(value: &Value, opts: &RuleOptions) -> ValidationOutcome {
    let Some(s) = value.as_str() else {
        return ValidationOutcome::fail(format!("{} must be text", opts.name()));
    };
    // encoded entities count as the character they stand for
    let len = decode_html(s.trim()).chars().count() as f64;
    if let Some(min) = opts.min {
        if len < min {
            return ValidationOutcome::fail(format!(
                "{} must be at least {} characters",
                opts.name(),
                min
            ));
        }
    }
    if let Some(max) = opts.max {
        if len > max {
            return ValidationOutcome::fail(format!(
                "{} must be at most {} characters",
                opts.name(),
                max
            ));
        }
    }
    ValidationOutcome::pass()
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn range(value: &Value, opts: &RuleOptions) -> ValidationOutcome {
    let Some(n) = as_number(value) else {
        return ValidationOutcome::fail(format!("{} must be a number", opts.name()));
    };
    if let Some(min) = opts.min {
        if n < min {
            return ValidationOutcome::fail(format!("{} must be at least {}", opts.name(), min));
        }
    }
    if let Some(max) = opts.max {
        if n > max {
            return ValidationOutcome::fail(format!("{} must be at most {}", opts.name(), max));
        }
    }
    ValidationOutcome::pass()
}

fn email(value: &Value, _opts: &RuleOptions) -> ValidationOutcome {
    match value.as_str() {
        Some(s) if is_valid_email(s) => ValidationOutcome::pass(),
        _ => ValidationOutcome::fail("Please enter a valid email address"),
    }
}

fn phone(value: &Value, _opts: &RuleOptions) -> ValidationOutcome {
    match value.as_str() {
        Some(s) if is_valid_phone(s) => ValidationOutcome::pass(),
        _ => ValidationOutcome::fail("Please enter a valid phone number"),
    }
}

fn name(value: &Value, opts: &RuleOptions) -> ValidationOutcome {
    match value.as_str() {
        Some(s) if is_valid_name(s) => ValidationOutcome::pass(),
        _ => ValidationOutcome::fail(format!(
            "{} may only contain letters, spaces, apostrophes, periods and hyphens",
            opts.name()
        )),
    }
}

fn difficulty(value: &Value, _opts: &RuleOptions) -> ValidationOutcome {
    match value.as_str().map(|s| s.parse::<Difficulty>()) {
        Some(Ok(_)) => ValidationOutcome::pass(),
        _ => ValidationOutcome::fail("Difficulty must be beginner, intermediate, or advanced"),
    }
}

fn progress(value: &Value, _opts: &RuleOptions) -> ValidationOutcome {
    match as_number(value) {
        Some(n) if (PROGRESS_MIN..=PROGRESS_MAX).contains(&n) => ValidationOutcome::pass(),
        Some(_) => ValidationOutcome::fail("Progress must be between 0 and 100"),
        None => ValidationOutcome::fail("Progress must be a number"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course_fields() -> CourseFields {
        CourseFields::new(
            "Intro to Rust",
            "Ownership, borrowing and lifetimes",
            10.0,
            "Ferris Crab",
            "beginner",
        )
    }

    #[test]
    fn test_validate_field_builtins() {
        let svc = ValidationService::new();
        let opts = RuleOptions::label("Title");
        assert!(!svc.validate_field("required", &json!(""), &opts).unwrap().valid);
        assert!(svc.validate_field("required", &json!("x"), &opts).unwrap().valid);

        let bounded = RuleOptions::label("Title").bounds(3.0, 5.0);
        assert!(!svc.validate_field("length", &json!("ab"), &bounded).unwrap().valid);
        assert!(svc.validate_field("length", &json!("abcd"), &bounded).unwrap().valid);
        assert!(!svc.validate_field("range", &json!(6), &bounded).unwrap().valid);
        assert!(svc.validate_field("range", &json!("4"), &bounded).unwrap().valid);

        let none = RuleOptions::default();
        assert!(svc.validate_field("progress", &json!(100), &none).unwrap().valid);
        assert!(!svc.validate_field("progress", &json!(100.5), &none).unwrap().valid);
        assert!(!svc.validate_field("difficulty", &json!("expert"), &none).unwrap().valid);
    }

    #[test]
    fn test_failure_message_is_readable() {
        let svc = ValidationService::new();
        let outcome = svc
            .validate_field("required", &Value::Null, &RuleOptions::label("Email"))
            .unwrap();
        assert_eq!(outcome.message, "Email is required");
    }

    #[test]
    fn test_unknown_validator_fails_loudly() {
        let svc = ValidationService::new();
        let err = svc
            .validate_field("isbn", &json!("x"), &RuleOptions::default())
            .unwrap_err();
        assert_eq!(err, ValidatorError::Unknown("isbn".to_string()));
    }

    #[test]
    fn test_register_custom_validator() {
        let svc = ValidationService::new();
        svc.register("even", |v, _| match v.as_i64() {
            Some(n) if n % 2 == 0 => ValidationOutcome::pass(),
            _ => ValidationOutcome::fail("must be even"),
        });
        assert!(svc.has("even"));
        let opts = RuleOptions::default();
        assert!(svc.validate_field("even", &json!(4), &opts).unwrap().valid);
        assert!(!svc.validate_field("even", &json!(3), &opts).unwrap().valid);
    }

    #[test]
    fn test_validate_course_aggregates_all_fields() {
        let svc = ValidationService::new();
        let fields = CourseFields {
            title: Some("Go".to_string()),
            description: None,
            duration: Some(0.0),
            instructor: Some("Ferris".to_string()),
            difficulty: Some("expert".to_string()),
            is_active: None,
        };
        let errors = svc
            .validate_course(&fields, ValidationMode::Create)
            .unwrap_err();
        assert!(errors.contains("title"));
        assert!(errors.contains("description"));
        assert!(errors.contains("duration"));
        assert!(errors.contains("difficulty"));
        assert!(!errors.contains("instructor"));
    }

    #[test]
    fn test_validate_course_update_mode_skips_absent() {
        let svc = ValidationService::new();
        let patch = CourseFields {
            title: Some("Rust in Depth".to_string()),
            ..Default::default()
        };
        assert!(svc.validate_course(&patch, ValidationMode::Update).is_ok());
        assert!(svc.validate_course(&patch, ValidationMode::Create).is_err());
        assert!(svc
            .validate_course(&course_fields(), ValidationMode::Create)
            .is_ok());
    }

    #[test]
    fn test_validate_course_rejects_fractional_duration() {
        let svc = ValidationService::new();
        let mut fields = course_fields();
        fields.duration = Some(2.5);
        let errors = svc
            .validate_course(&fields, ValidationMode::Create)
            .unwrap_err();
        assert!(errors.contains("duration"));
    }

    #[test]
    fn test_validate_student_never_requires_course() {
        let svc = ValidationService::new();
        let fields = StudentFields::new("Ada Lovelace", "ada@example.com");
        assert!(svc.validate_student(&fields, ValidationMode::Create).is_ok());

        let bad = StudentFields {
            name: Some("A".to_string()),
            email: Some("nope".to_string()),
            phone: Some("abc".to_string()),
            ..Default::default()
        };
        let errors = svc.validate_student(&bad, ValidationMode::Update).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_validate_progress() {
        let svc = ValidationService::new();
        assert!(svc.validate_progress(50.0).is_ok());
        assert!(svc.validate_progress(-5.0).is_err());
        assert!(svc.validate_progress(f64::NAN).is_err());
    }

    #[test]
    fn test_sanitize_str() {
        assert_eq!(sanitize_str("<b>Rust</b> & more"), "Rust &amp; more");
        assert_eq!(
            sanitize_str("<script>alert('x')</script>Intro"),
            "alert(&#x27;x&#x27;)Intro"
        );
        assert_eq!(sanitize_str("  plain  "), "plain");
        assert_eq!(sanitize_str("a > b"), "a &gt; b");
    }

    #[test]
    fn test_lone_angle_bracket_keeps_text() {
        assert_eq!(strip_tags("a < b and more"), "a < b and more");
        assert_eq!(sanitize_str("a < b and more"), "a &lt; b and more");
        assert_eq!(strip_tags("x < y <i>and</i> more"), "x < y and more");
        assert_eq!(strip_tags("<<b>b>"), "b>");
    }

    #[test]
    fn test_sanitize_str_is_stable_on_stored_values() {
        let once = sanitize_str("Rust & <b>Friends</b> \"quoted\" it's x < y");
        assert_eq!(
            once,
            "Rust &amp; Friends &quot;quoted&quot; it&#x27;s x &lt; y"
        );
        let mut again = once.clone();
        for _ in 0..3 {
            again = sanitize_str(&again);
        }
        assert_eq!(again, once);
    }

    #[test]
    fn test_length_counts_decoded_characters() {
        let svc = ValidationService::new();
        let title = format!("{} & {}", "a".repeat(48), "b".repeat(49));
        assert_eq!(title.chars().count(), 100);
        let stored = sanitize_str(&title);
        assert!(stored.chars().count() > 100);
        let fields = CourseFields {
            title: Some(stored),
            ..Default::default()
        };
        assert!(svc.validate_course(&fields, ValidationMode::Update).is_ok());
    }

    #[test]
    fn test_sanitize_input_fields() {
        let fields = CourseFields {
            title: Some("<i>Intro</i>".to_string()),
            duration: Some(5.0),
            ..Default::default()
        };
        let clean = sanitize_input(&fields);
        assert_eq!(clean.title.as_deref(), Some("Intro"));
        assert_eq!(clean.duration, Some(5.0));
    }

    #[test]
    fn test_sanitize_keeps_apostrophes_in_names() {
        let fields = StudentFields::new("<b>Seán O'Brien</b>", "sean@example.com");
        let clean = sanitize_input(&fields);
        assert_eq!(clean.name.as_deref(), Some("Seán O'Brien"));
        let service = ValidationService::new();
        assert!(service.validate_student(&clean, ValidationMode::Create).is_ok());
    }
}
