//! Applies the embedded schema migrations for kickoff-api.
//!
//! Usage:
//!   cargo run -p kickoff-api --bin kickoff-migrate
//!   cargo run -p kickoff-api --bin kickoff-migrate -- --test
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::path::Path;

use kickoff_api::db::migrations::{run_pending, with_test_db_suffix};

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let mut database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--test") {
        database_url = with_test_db_suffix(&database_url);
    }

    println!("Running pending migrations...");
    let applied = run_pending(&database_url).expect("migration failed");

    if applied.is_empty() {
        println!("No pending migrations.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }
}
