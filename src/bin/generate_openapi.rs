//! Writes the operator API's OpenAPI document.
//!
//! Usage:
//!   cargo run --bin generate_openapi > openapi.json
//!   cargo run --bin generate_openapi -- --output openapi.json

use std::{env, fs, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use sensor_collector::api::handlers::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<()> {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialise OpenAPI document")?;

    let output_path = env::args()
        .collect::<Vec<_>>()
        .windows(2)
        .find(|w| w[0] == "--output")
        .map(|w| PathBuf::from(&w[1]));

    match output_path {
        Some(path) => {
            fs::write(&path, &json).with_context(|| format!("Error writing to {}", path.display()))?;
            eprintln!("OpenAPI document written to {}", path.display());
        }
        None => {
            std::io::stdout()
                .write_all(json.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}
