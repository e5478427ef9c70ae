// src/extract/mod.rs
// Pulls the candidate source file out of free-form model output

use crate::error::DebloatError;

/// Extract the candidate source text from a raw model response.
///
/// Models wrap code in fenced blocks, surround it with prose, or
/// occasionally return it bare. The first fenced block wins; later blocks
/// are assumed to be explanation rather than the rewritten file. With no
/// fence at all, the whole trimmed response is the candidate.
pub fn extract_candidate(raw: &str) -> Result<String, DebloatError> {
    let candidate = match first_fenced_block(raw) {
        Some(block) => block,
        None => raw.trim().to_string(),
    };

    if candidate.trim().is_empty() {
        return Err(DebloatError::EmptyCandidate);
    }
    Ok(candidate)
}

/// Content of the first ``` fence, if any. The language tag on the opening
/// line is discarded. An opening fence with no closing fence takes
/// everything after the opening line, so truncated responses still yield
/// the rewrite instead of the surrounding prose.
fn first_fenced_block(raw: &str) -> Option<String> {
    let start = raw.find("```")?;
    let after_fence = &raw[start + 3..];

    // Skip the rest of the opening line (language tag, if present)
    let body = match after_fence.find('\n') {
        Some(newline) => &after_fence[newline + 1..],
        None => return None,
    };

    let content = match body.find("\n```") {
        Some(end) => &body[..end],
        None => match body.strip_prefix("```") {
            // Opening fence immediately closed: empty block
            Some(_) => "",
            None => body,
        },
    };

    Some(content.trim_end_matches('\n').to_string())
}
