// crates/bactrace-cli/src/colony.rs

//! Initial colony files: one `name,x,y,width,length,rotation` row per
//! cell, with an optional header line.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use bactrace_core::Bacillus;

pub fn load_colony(path: &Path) -> Result<Vec<Bacillus>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read colony file {}", path.display()))?;
    parse_colony(&text).with_context(|| format!("parse colony file {}", path.display()))
}

fn parse_colony(text: &str) -> Result<Vec<Bacillus>> {
    let mut cells = Vec::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        // A header identifies itself by a non-numeric second field.
        if line_no == 0 && fields.get(1).is_some_and(|f| f.parse::<f64>().is_err()) {
            continue;
        }
        if fields.len() != 6 {
            bail!(
                "line {}: expected 6 fields (name,x,y,width,length,rotation), got {}",
                line_no + 1,
                fields.len()
            );
        }
        let number = |index: usize, what: &str| -> Result<f64> {
            fields[index].parse().with_context(|| {
                format!("line {}: bad {what} \"{}\"", line_no + 1, fields[index])
            })
        };
        cells.push(Bacillus::new(
            fields[0],
            number(1, "x")?,
            number(2, "y")?,
            number(3, "width")?,
            number(4, "length")?,
            number(5, "rotation")?,
        ));
    }
    if cells.is_empty() {
        bail!("no cells found");
    }
    Ok(cells)
}
