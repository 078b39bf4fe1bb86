//! Identifier generation - `revsync id`.

use anyhow::{Result, bail};

use revsync::id;

use super::output::print_json;
use crate::IdCommands;

/// Upper bound for `id hex --bytes`.
const MAX_HEX_BYTES: usize = 1024;

pub fn cmd_id(command: IdCommands, json: bool) -> Result<()> {
    let value = match command {
        IdCommands::Id8 => id::random_id8()?,
        IdCommands::Hex { bytes } => {
            if bytes == 0 || bytes > MAX_HEX_BYTES {
                bail!("--bytes must be between 1 and {}", MAX_HEX_BYTES);
            }
            id::random_hex(bytes)?
        }
    };
    if json {
        print_json(&serde_json::json!({ "id": value }))
    } else {
        println!("{}", value);
        Ok(())
    }
}
