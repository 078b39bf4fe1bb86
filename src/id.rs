//! Random hexadecimal identifiers for reviewers, sessions and lock owners.
//!
//! Identifiers are correlation tokens, not secrets: a userspace CSPRNG is seeded once per
//! thread from the OS and then used for every call, so generating many ids never drains or
//! blocks on the system entropy source.

use std::cell::RefCell;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::errors::CoordError;

/// Byte length of the default identifier (8 hex characters).
pub const ID8_BYTES: usize = 4;

/// Longest identifier accepted from callers.
pub const MAX_ID_LEN: usize = 64;

thread_local! {
    static RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// Generate `2 * bytes` lowercase hex characters.
///
/// Fails only if the OS random source cannot seed the generator; there is no weaker fallback.
pub fn random_hex(bytes: usize) -> Result<String, CoordError> {
    let mut raw = vec![0_u8; bytes];
    RNG.with(|cell| -> Result<(), CoordError> {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            let seeded = StdRng::from_rng(OsRng).map_err(|e| {
                CoordError::Other(anyhow::anyhow!("seed identifier generator from OS: {e}"))
            })?;
            *slot = Some(seeded);
        }
        if let Some(rng) = slot.as_mut() {
            rng.fill_bytes(&mut raw);
        }
        Ok(())
    })?;
    Ok(hex::encode(raw))
}

/// Generate an 8-character id.
pub fn random_id8() -> Result<String, CoordError> {
    random_hex(ID8_BYTES)
}

/// Check a caller-supplied identifier.
///
/// Identifiers end up in file names (reports, temp files), so only ASCII alphanumerics,
/// `-` and `_` are allowed.
pub fn validate(label: &str, value: &str) -> Result<(), CoordError> {
    let reason = if value.is_empty() {
        Some("must not be empty".to_string())
    } else if value.len() > MAX_ID_LEN {
        Some(format!("must be at most {MAX_ID_LEN} characters"))
    } else if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Some("only ASCII letters, digits, '-' and '_' are allowed".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CoordError::InvalidIdentifier {
            label: label.to_string(),
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
