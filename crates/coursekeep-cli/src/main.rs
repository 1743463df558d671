//! coursekeep - command-line driver for the course and student record keeper.
//!
//! Builds one application context from the config file and environment,
//! then runs a single command against it.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use coursekeep_core::utils::{decode_html, format_hours, format_progress, truncate_string};
use coursekeep_core::{builtin_suite, AppContext, Config, Selection, TestStatus};

// ============================================================================
// Constants
// ============================================================================

const USAGE: &str = "\
Usage: coursekeep <command>

Commands:
  test [all|unit|integration|performance]   Run the built-in test suite
  stats                                     Print course and student statistics
  export                                    Print the full dataset as JSON
  simulate [rounds]                         Advance progress at random (default 1 round)
  seed                                      Add demo courses and students
  verify                                    Check enrollment counts against references
  config [save]                             Print the effective config, or write it to the config file";

/// Widest title shown in the stats listing
const TITLE_WIDTH: usize = 40;

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so the file writer flushes.
fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir.unwrap_or(std::path::Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?.with_env_overrides()?;
    let _guard = init_tracing(&config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");
    let arg = args.get(1).map(String::as_str);
    info!(command = command, storage = ?config.storage, "Starting coursekeep");

    match command {
        "test" => run_tests(&config, arg).await,
        "stats" => print_stats(&context(&config)?).await,
        "export" => export(&context(&config)?).await,
        "simulate" => simulate(&context(&config)?, arg).await,
        "seed" => seed(&context(&config)?).await,
        "verify" => verify(&context(&config)?).await,
        "config" => show_config(&config, arg),
        "help" | "-h" | "--help" => {
            println!("{}", USAGE);
            Ok(ExitCode::SUCCESS)
        }
        other => {
            eprintln!("Unknown command '{}'\n\n{}", other, USAGE);
            Ok(ExitCode::from(2))
        }
    }
}

fn context(config: &Config) -> Result<AppContext> {
    AppContext::from_config(config).context("Could not open the data store")
}

// ============================================================================
// Commands
// ============================================================================

/// The suite mutates data, so it runs on a scratch store with the configured latency
async fn run_tests(config: &Config, selection: Option<&str>) -> Result<ExitCode> {
    let selection: Selection = match selection {
        Some(s) => s.parse().map_err(anyhow::Error::msg)?,
        None => Selection::All,
    };

    let harness = builtin_suite(Arc::new(AppContext::scratch(config)));
    let report = harness.run(selection).await;

    for result in &report.results {
        let marker = match result.status {
            TestStatus::Pass => "ok",
            TestStatus::Fail => "FAIL",
            TestStatus::Skip => "skip",
        };
        println!(
            "{:<5} [{}] {} ({} ms)",
            marker,
            result.category,
            result.name,
            result.duration.as_millis()
        );
        if let Some(error) = &result.error {
            println!("      {}", error);
        }
    }

    let s = &report.summary;
    println!(
        "\n{} tests: {} passed, {} failed, {} skipped in {} ms (avg {} ms)",
        s.total,
        s.passed,
        s.failed,
        s.skipped,
        s.total_duration.as_millis(),
        s.average_duration.as_millis()
    );

    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_stats(ctx: &AppContext) -> Result<ExitCode> {
    let courses = ctx.courses.statistics().await;
    let students = ctx.students.statistics().await;

    println!("Courses: {} ({} active, {} inactive)", courses.total, courses.active, courses.inactive);
    println!("  Enrollments:       {}", courses.total_enrollments);
    println!("  Average progress:  {}", format_progress(courses.average_progress));
    println!("  Average duration:  {:.1} hours", courses.average_duration);
    for (difficulty, count) in &courses.by_difficulty {
        println!("  {:<18} {}", format!("{}:", difficulty), count);
    }
    if let Some(popular) = &courses.most_popular {
        println!(
            "  Most popular:      {} ({} enrolled)",
            truncate_string(&decode_html(&popular.title), TITLE_WIDTH),
            popular.enrollment_count
        );
    }

    println!("\nStudents: {} ({} active)", students.total, students.active);
    println!(
        "  Enrolled:          {} ({})",
        students.enrolled,
        format_progress(students.enrollment_rate)
    );
    println!("  Not enrolled:      {}", students.unenrolled);
    println!("  Average progress:  {}", format_progress(students.average_progress));
    println!(
        "  Completed:         {} ({})",
        students.completed,
        format_progress(students.completion_rate)
    );

    let listing = ctx.courses.get_courses(&Default::default(), true).await;
    if !listing.is_empty() {
        println!("\nCatalog:");
        for course in listing {
            println!(
                "  {:<width$} {:>12} {:>5}  {} enrolled",
                truncate_string(&decode_html(&course.title), TITLE_WIDTH),
                format_hours(course.estimated_completion_time()),
                format_progress(course.progress),
                course.enrollment_count,
                width = TITLE_WIDTH
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn export(ctx: &AppContext) -> Result<ExitCode> {
    let data = ctx.service.export_data().await;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(ExitCode::SUCCESS)
}

async fn simulate(ctx: &AppContext, rounds: Option<&str>) -> Result<ExitCode> {
    let rounds: u32 = match rounds {
        Some(r) => r
            .parse()
            .with_context(|| format!("Invalid round count '{}'", r))?,
        None => 1,
    };
    if rounds == 0 {
        bail!("Round count must be at least 1");
    }

    let mut failed = 0;
    for round in 1..=rounds {
        let students = ctx.students.simulate_progress().await;
        let courses = ctx.courses.simulate_progress().await;
        failed += students.failed + courses.failed;
        println!(
            "Round {}: {} students advanced, {} courses advanced, {} failures",
            round,
            students.updated,
            courses.updated,
            students.failed + courses.failed
        );
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn show_config(config: &Config, action: Option<&str>) -> Result<ExitCode> {
    match action {
        None => println!("{}", serde_json::to_string_pretty(config)?),
        Some("save") => {
            let path = config.save()?;
            println!("Wrote {}", path.display());
        }
        Some(other) => bail!("Unknown config action '{}' (expected save)", other),
    }
    Ok(ExitCode::SUCCESS)
}

async fn seed(ctx: &AppContext) -> Result<ExitCode> {
    let report = ctx.seed_demo_data().await?;
    println!(
        "Seeded {} courses and {} students ({} already present)",
        report.courses, report.students, report.skipped
    );
    Ok(ExitCode::SUCCESS)
}

async fn verify(ctx: &AppContext) -> Result<ExitCode> {
    let report = ctx.service.verify_integrity().await;
    if report.is_consistent() {
        println!("Enrollment counts are consistent");
        return Ok(ExitCode::SUCCESS);
    }

    for m in &report.count_mismatches {
        println!(
            "Course {}: stored count {}, {} students reference it",
            m.course_id, m.stored, m.actual
        );
    }
    for d in &report.dangling_references {
        println!("Student {} references missing course {}", d.student_id, d.course_id);
    }
    Ok(ExitCode::FAILURE)
}
