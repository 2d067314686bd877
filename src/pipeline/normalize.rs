//! Line normalisation: raw OCR text → bounded list of candidate lines.

/// Most lines ever sent to the categorizer. Bounds request size and cost.
pub const MAX_CANDIDATE_LINES: usize = 50;

/// Split on line boundaries, trim, drop blanks, keep the first
/// [`MAX_CANDIDATE_LINES`] in their original order.
///
/// Total: empty input yields an empty list.
pub fn normalize(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(MAX_CANDIDATE_LINES)
        .map(str::to_string)
        .collect()
}
