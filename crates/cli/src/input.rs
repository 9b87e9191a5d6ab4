//! Request loading from a file or stdin.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use confmacro_resolver::MacroInputs;

pub fn read_inputs(source: &str) -> Result<MacroInputs> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("failed to read request file {source}"))?
    };
    parse_inputs(&raw)
}

pub fn parse_inputs(raw: &str) -> Result<MacroInputs> {
    serde_json::from_str(raw).context("request is not a valid texts/triggers/graphs/items/functions document")
}
