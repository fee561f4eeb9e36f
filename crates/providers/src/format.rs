//! Output formatting.
//!
//! Post-processes generated content according to the requested format.
//! Backends are asked for the right shape up front; this pass normalizes
//! what actually came back.

use kiln_core::OutputFormat;

/// Normalize generated content for the requested output format.
///
/// - `raw` passes through untouched
/// - `json` strips a Markdown code fence wrapped around the payload
///   (models often fence JSON despite instructions)
/// - `markdown` trims trailing whitespace
pub fn format_output(content: &str, output_format: OutputFormat) -> String {
    match output_format {
        OutputFormat::Raw => content.to_string(),
        OutputFormat::Markdown => content.trim_end().to_string(),
        OutputFormat::Json => strip_fence(content.trim()).to_string(),
    }
}

/// Strip a ```json ... ``` (or bare ```) fence if the whole payload is
/// wrapped in one.
fn strip_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return content;
    };
    // drop an optional language tag on the opening fence line
    match inner.split_once('\n') {
        Some((first_line, body)) if first_line.trim() == "json" || first_line.trim().is_empty() => {
            body.trim()
        }
        _ => inner.trim(),
    }
}
