//! Writes the OpenAPI document for the HTTP surface.
//!
//! Usage: `cargo run -p kickoff-api --bin generate-openapi [-- <out.json>]`

use std::path::PathBuf;

use utoipa::OpenApi;

fn main() {
    let spec = kickoff_api::routes::ApiDoc::openapi()
        .to_pretty_json()
        .expect("failed to serialize OpenAPI document");

    let out = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../specs/kickoff-api.json")
    });
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).expect("failed to create output directory");
    }
    std::fs::write(&out, spec).expect("failed to write OpenAPI document");
    println!("Wrote {}", out.display());
}
