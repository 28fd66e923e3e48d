//! Generate a demo grade database with a built search index.
//!
//! Writes the demo catalog, optionally padded with randomly generated courses
//! for load testing, then computes summaries and rebuilds the FTS5 tables.
//!
//! Usage:
//!     cargo run --release --bin generate-demo-db -- [--extra-courses N] [output_path]
//!
//! Default output: ./grades-demo.sqlite

use anyhow::Context;
use clap::Parser;
use gradesearch::database::Database;
use gradesearch::demo::{demo_grades, seed_demo_catalog, DEMO_DEPARTMENTS, DEMO_TERMS};
use gradesearch::indexer::rebuild_search_index;
use gradesearch::models::term_to_name;
use rand::Rng;
use std::path::PathBuf;

/// Title words for generated filler courses
const TOPICS: &[&str] = &[
    "Advanced", "Applied", "Computational", "Experimental", "Foundations of", "Principles of",
    "Special Topics in", "Survey of", "Theory of", "Introduction to",
];

const SUBJECTS: &[&str] = &[
    "Thermodynamics", "Robotics", "Optimization", "Genetics", "Networks", "Signal Processing",
    "Materials", "Ethics", "Cryptography", "Fluid Mechanics", "Econometrics", "Databases",
];

const FIRST_NAMES: &[&str] = &["Alex", "Priya", "Jordan", "Mei", "Omar", "Sofia", "Tomas", "Yuki"];
const LAST_NAMES: &[&str] = &["Adams", "Baker", "Costa", "Dubois", "Eriksen", "Fischer", "Gupta", "Haddad"];

#[derive(Parser, Debug)]
#[command(name = "generate-demo-db", about = "Write a demo grade database with a search index")]
struct Args {
    /// Output database path (overwritten)
    #[arg(default_value = "grades-demo.sqlite")]
    output: PathBuf,

    /// Randomly generated courses added on top of the demo catalog
    #[arg(long, default_value_t = 0)]
    extra_courses: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.output.exists() {
        std::fs::remove_file(&args.output)
            .with_context(|| format!("failed to remove {}", args.output.display()))?;
    }
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create output directory")?;
    }

    println!("Generating demo grade database...");
    println!("Output: {}", args.output.display());

    let db = Database::open(&args.output).context("failed to create database")?;
    seed_demo_catalog(&db).context("failed to seed demo catalog")?;

    let mut rng = rand::thread_rng();
    let mut extra_students = 0i64;
    for i in 0..args.extra_courses {
        let (dept_abbr, _) = DEMO_DEPARTMENTS[rng.gen_range(0..DEMO_DEPARTMENTS.len())];
        let course_num = format!("{}", rng.gen_range(1000..9000));
        let class_desc = format!(
            "{} {}",
            TOPICS[rng.gen_range(0..TOPICS.len())],
            SUBJECTS[rng.gen_range(0..SUBJECTS.len())]
        );
        let class_id = db.insert_course(dept_abbr, &course_num, &class_desc)?;

        let name = format!(
            "{}, {}",
            LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())],
            FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())]
        );
        let rmp_score = rng.gen_bool(0.7).then(|| (rng.gen_range(10..=50) as f64) / 10.0);
        let professor_id = db.insert_professor(&name, rmp_score)?;

        for term in DEMO_TERMS {
            let students = rng.gen_range(15..400);
            extra_students += students;
            db.record_term(class_id, Some(professor_id), term, &demo_grades(students, i))?;
        }

        if (i + 1) % 250 == 0 {
            println!("  Generated {}/{} extra courses...", i + 1, args.extra_courses);
        }
    }

    if args.extra_courses > 0 {
        db.refresh_summaries().context("failed to refresh summaries")?;
    }
    let stats = rebuild_search_index(&db).context("failed to build search index")?;

    let terms: Vec<String> = DEMO_TERMS.iter().filter_map(|t| term_to_name(*t)).collect();

    println!();
    println!("Database created: {}", args.output.display());
    println!("  Terms: {}", terms.join(", "));
    println!("  Departments indexed: {}", stats.departments);
    println!("  Courses indexed: {}", stats.courses);
    println!("  Professors indexed: {}", stats.professors);
    if args.extra_courses > 0 {
        println!("  Extra students generated: {}", extra_students);
    }
    Ok(())
}
