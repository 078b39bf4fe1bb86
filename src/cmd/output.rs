//! Shared printing helpers.

use anyhow::{Context, Result};
use serde::Serialize;

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

/// Human acknowledgement for a mutation; `--json` callers print the changed record instead.
pub fn print_ok() {
    println!("ok");
}

/// `-` for absent values in human output.
pub fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
