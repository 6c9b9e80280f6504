//! Output renderers for CLI commands.

use anyhow::anyhow;
use serde::Serialize;

use crate::error::{CliError, CliResult};

pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn render_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = to_pretty_json(value)?;
    println!("{text}");
    Ok(())
}
