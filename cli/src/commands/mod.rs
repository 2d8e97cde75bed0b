use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
};

use serde_json::Value;

pub mod compile;
pub mod write;

/// Parses newline delimited JSON, skipping blank lines.
pub fn parse_items(reader: impl BufRead) -> Result<Vec<Value>, String> {
    let mut items = vec![];

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Could not read line {}: {}", index + 1, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let item = serde_json::from_str(line)
            .map_err(|e| format!("Line {} is not valid JSON: {}", index + 1, e))?;
        items.push(item);
    }

    Ok(items)
}

pub fn read_items(input: &Option<PathBuf>) -> Result<Vec<Value>, String> {
    match input {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| format!("Could not open input {}: {}", path.display(), e))?;
            parse_items(BufReader::new(file))
        }
        None => parse_items(io::stdin().lock()),
    }
}
