//! Built-in checks run by `coursekeep test`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};

use super::{TestCategory, TestHarness, TestOptions};
use crate::context::AppContext;
use crate::managers::CourseListOptions;
use crate::models::{Course, CourseFields, Difficulty, StudentFields};
use crate::validation::{sanitize_str, ValidationMode};

/// A harness with every built-in test registered against `context`
pub fn builtin_suite(context: Arc<AppContext>) -> TestHarness {
    use TestCategory::*;

    let mut h = TestHarness::new(context);
    let default = TestOptions::default();

    h.register("estimated time follows difficulty", Unit, default, estimated_time);
    h.register("progress bounds and rounding", Unit, default, progress_bounds);
    h.register("validation reports every field", Unit, default, validation_aggregates);
    h.register("sanitize neutralizes markup", Unit, default, sanitize_markup);

    h.register("enrollment count matches references", Integration, default, enrollment_counts);
    h.register("course with students cannot be deleted", Integration, default, delete_blocked);
    h.register("duplicate email is a conflict", Integration, default, duplicate_email);
    h.register("read after write bypasses stale cache", Integration, default, read_after_write);
    h.register("re-enrollment resets progress", Integration, default, reenrollment);

    h.register("cached listing skips the repository", Performance, default, cached_listing);
    h.register(
        "bulk course creation",
        Performance,
        TestOptions::timeout(Duration::from_secs(10)),
        bulk_creation,
    );

    h
}

// ===== Unit =====

async fn estimated_time(_: Arc<AppContext>) -> Result<()> {
    let mut fields = course_fields("Estimate");
    let course = Course::new(&fields)?;
    ensure!(course.estimated_completion_time() == 10, "beginner estimate");

    fields.difficulty = Some(Difficulty::Advanced.to_string());
    let course = Course::new(&fields)?;
    ensure!(course.estimated_completion_time() == 16, "advanced estimate");
    Ok(())
}

async fn progress_bounds(_: Arc<AppContext>) -> Result<()> {
    let mut course = Course::new(&course_fields("Bounds"))?;
    for bad in [-1.0, 100.5, f64::NAN] {
        ensure!(course.update_progress(bad).is_err(), "accepted {}", bad);
        ensure!(course.progress == 0.0, "progress changed after rejecting {}", bad);
    }
    course.update_progress(33.333)?;
    ensure!(course.progress == 33.33, "expected 33.33, got {}", course.progress);
    Ok(())
}

async fn validation_aggregates(ctx: Arc<AppContext>) -> Result<()> {
    let bad = CourseFields {
        title: Some("X".to_string()),
        duration: Some(0.0),
        ..Default::default()
    };
    let errors = ctx
        .validation
        .validate_course(&bad, ValidationMode::Create)
        .err()
        .context("invalid course passed validation")?;
    for field in ["title", "description", "duration", "instructor", "difficulty"] {
        ensure!(errors.contains(field), "no error for {}", field);
    }
    Ok(())
}

async fn sanitize_markup(_: Arc<AppContext>) -> Result<()> {
    let clean = sanitize_str("<script>x</script><b>Hi</b> & bye");
    ensure!(clean == "xHi &amp; bye", "got {}", clean);
    Ok(())
}

// ===== Integration =====

async fn enrollment_counts(ctx: Arc<AppContext>) -> Result<()> {
    let course = ctx.courses.create_course(&course_fields(&unique("Counts"))).await?;
    let a = ctx
        .students
        .create_student(&student_fields("Count A").with_course(&course.id))
        .await?;
    let b = ctx.students.create_student(&student_fields("Count B")).await?;
    ctx.students.enroll_student(&b.id, &course.id).await?;
    ensure_count(&ctx, &course.id).await?;

    ctx.students.unenroll_student(&b.id).await?;
    ensure_count(&ctx, &course.id).await?;
    ctx.students.delete_student(&a.id).await?;
    ensure_count(&ctx, &course.id).await?;
    ensure!(ctx.service.verify_integrity().await.is_consistent(), "integrity report");
    Ok(())
}

async fn delete_blocked(ctx: Arc<AppContext>) -> Result<()> {
    let course = ctx.courses.create_course(&course_fields(&unique("Delete"))).await?;
    ctx.students
        .create_student(&student_fields("Delete A").with_course(&course.id))
        .await?;
    let before = ctx.service.export_data().await;

    let err = ctx
        .courses
        .delete_course(&course.id)
        .await
        .err()
        .context("delete succeeded")?;
    ensure!(err.is_conflict(), "expected conflict, got {}", err);

    let after = ctx.service.export_data().await;
    ensure!(after.courses == before.courses, "courses changed");
    ensure!(after.students == before.students, "students changed");
    Ok(())
}

async fn duplicate_email(ctx: Arc<AppContext>) -> Result<()> {
    let course = ctx.courses.create_course(&course_fields(&unique("Dup"))).await?;
    let first = ctx.students.create_student(&student_fields("Dup A")).await?;

    let dup = StudentFields::new("Dup B", &first.email.to_uppercase()).with_course(&course.id);
    let err = ctx
        .students
        .create_student(&dup)
        .await
        .err()
        .context("duplicate created")?;
    ensure!(err.is_conflict(), "expected conflict, got {}", err);

    let course = ctx.courses.get_course(&course.id).await.context("course vanished")?;
    ensure!(course.enrollment_count == 0, "count moved to {}", course.enrollment_count);
    Ok(())
}

async fn read_after_write(ctx: Arc<AppContext>) -> Result<()> {
    let options = CourseListOptions::default();
    ctx.courses.get_courses(&options, true).await;
    let title = unique("Intro to X");
    ctx.courses.create_course(&course_fields(&title)).await?;

    let courses = ctx.courses.get_courses(&options, true).await;
    ensure!(courses.iter().any(|c| c.title == title), "new course missing from listing");
    Ok(())
}

async fn reenrollment(ctx: Arc<AppContext>) -> Result<()> {
    let course = ctx.courses.create_course(&course_fields(&unique("Cycle"))).await?;
    let student = ctx.students.create_student(&student_fields("Cycle A")).await?;

    for _ in 0..2 {
        ctx.students.enroll_student(&student.id, &course.id).await?;
        ctx.students.update_student_progress(&student.id, 42.0).await?;
        ctx.students.unenroll_student(&student.id).await?;
    }
    let (student, course) = ctx.students.enroll_student(&student.id, &course.id).await?;
    ensure!(course.enrollment_count == 1, "count is {}", course.enrollment_count);
    ensure!(student.progress == 0.0, "progress is {}", student.progress);
    Ok(())
}

// ===== Performance =====

async fn cached_listing(ctx: Arc<AppContext>) -> Result<()> {
    let options = CourseListOptions::default();
    ctx.courses.get_courses(&options, true).await;

    let started = Instant::now();
    ctx.courses.get_courses(&options, true).await;
    let elapsed = started.elapsed();
    ensure!(elapsed < Duration::from_millis(50), "cached read took {:?}", elapsed);
    Ok(())
}

async fn bulk_creation(ctx: Arc<AppContext>) -> Result<()> {
    let prefix = unique("Bulk");
    for i in 0..10 {
        ctx.courses
            .create_course(&course_fields(&format!("{} {}", prefix, i)))
            .await?;
    }
    let listed = ctx.courses.search(&prefix).await;
    ensure!(listed.len() == 10, "listed {} of 10", listed.len());
    Ok(())
}

// ===== Fixtures =====

fn unique(prefix: &str) -> String {
    format!("{} {}", prefix, &crate::utils::generate_id()[..8])
}

fn course_fields(title: &str) -> CourseFields {
    CourseFields::new(
        title,
        "Harness fixture course with a long enough description",
        10.0,
        "Harness Runner",
        "beginner",
    )
}

fn student_fields(name: &str) -> StudentFields {
    let email = format!("{}@example.com", unique("student").replace(' ', "."));
    StudentFields::new(name, &email)
}

async fn ensure_count(ctx: &AppContext, course_id: &str) -> Result<()> {
    let course = ctx.courses.get_course(course_id).await.context("course vanished")?;
    let referencing = ctx.students.students_in_course(course_id).await.len();
    ensure!(
        course.enrollment_count as usize == referencing,
        "count {} but {} students reference the course",
        course.enrollment_count,
        referencing
    );
    Ok(())
}
