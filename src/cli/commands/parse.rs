use anyhow::{Context, Result};

use crate::dwdparse::build_args_map;

use super::print_json;

pub fn parse(directive: &str) -> Result<()> {
    let args = build_args_map(directive)
        .with_context(|| format!("Could not parse directive '{directive}'"))?;
    print_json(&args)
}
