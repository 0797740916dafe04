//! Benchmark suite for the import pipeline stages
//!
//! Measures CSV parsing, validation and complete import runs against an
//! in-memory store using the divan benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//! ```
//!
//! # Inputs
//!
//! Course CSVs are generated in memory at 100 and 1,000 rows. Every fifth row
//! carries an invalid price, so validation and failure reporting are exercised
//! alongside the happy path.

use bulk_import::core::validator::validate_all;
use bulk_import::core::{MemoryAuditSink, MemoryStore};
use bulk_import::io::parse_csv;
use bulk_import::pipeline::{Caller, ImportPipeline, ImportRequest};
use bulk_import::types::{DuplicateMode, EntityType, ImportPolicy};
use divan::Bencher;
use std::sync::Arc;

const SIZES: [usize; 2] = [100, 1_000];

fn main() {
    divan::main();
}

fn course_csv(rows: usize) -> String {
    let mut csv = String::from(
        "title,description,audiences,mode,duration,price,level,\
         start_date,features,keywords,category\n",
    );
    for i in 0..rows {
        let price = if i % 5 == 4 { "cheap".to_string() } else { format!("${}", 10 + i) };
        csv.push_str(&format!(
            "Course {i},Description of course {i},Professional;Student,online,6 weeks,\
             {price},Beginner,2025-06-01,Live sessions;Projects,Rust;Systems,Technology\n"
        ));
    }
    csv
}

/// Parse a course CSV into candidate records
#[divan::bench(args = SIZES)]
fn parse_courses(bencher: Bencher, rows: usize) {
    let input = course_csv(rows);
    bencher.bench(|| parse_csv(&input, EntityType::Course).expect("Parsing failed"));
}

/// Validate pre-parsed course records
#[divan::bench(args = SIZES)]
fn validate_courses(bencher: Bencher, rows: usize) {
    let records = parse_csv(&course_csv(rows), EntityType::Course).expect("Parsing failed");
    bencher.bench(|| validate_all(&records));
}

/// Plan and execute a fresh import into an empty store
#[divan::bench(args = SIZES)]
fn import_courses(bencher: Bencher, rows: usize) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let input = course_csv(rows);
    let caller = Caller::new("bench", "admin");

    bencher.bench(|| {
        runtime.block_on(async {
            let pipeline = ImportPipeline::new(
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryAuditSink::new()),
                ImportPolicy::default(),
            );
            let request =
                ImportRequest::from_csv(&input, EntityType::Course).expect("Parsing failed");
            pipeline.run(Some(&caller), request).await.expect("Import failed")
        })
    });
}

/// Re-import the same rows under skip_duplicates, so every valid row is matched
#[divan::bench(args = SIZES)]
fn reimport_courses_skip_duplicates(bencher: Bencher, rows: usize) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let input = course_csv(rows);
    let caller = Caller::new("bench", "admin");
    let store = Arc::new(MemoryStore::new());

    runtime.block_on(async {
        let request = ImportRequest::from_csv(&input, EntityType::Course).expect("Parsing failed");
        let audit = Arc::new(MemoryAuditSink::new());
        ImportPipeline::new(store.clone(), audit, ImportPolicy::default())
            .run(Some(&caller), request)
            .await
            .expect("Seeding import failed");
    });

    let pipeline = ImportPipeline::new(
        store,
        Arc::new(MemoryAuditSink::new()),
        ImportPolicy {
            mode: DuplicateMode::SkipDuplicates,
            ..ImportPolicy::default()
        },
    );

    bencher.bench(|| {
        runtime.block_on(async {
            let request =
                ImportRequest::from_csv(&input, EntityType::Course).expect("Parsing failed");
            pipeline.run(Some(&caller), request).await.expect("Import failed")
        })
    });
}
