use anyhow::{Context, Result};
use std::path::Path;

/// Parse a plain-text sample listing.
///
/// Values may be separated by newlines, commas or whitespace. Blank lines and
/// lines starting with `#` are skipped.
pub fn parse_samples(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for token in trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let val: f64 = token
                .parse()
                .with_context(|| format!("line {}: '{}' is not a number", idx + 1, token))?;
            out.push(val);
        }
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

pub fn read_samples(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_samples(&text)
}
