//! Ingredient label analysis parser
//!
//! Projects the free-text response of a label scan into a structured
//! [`IngredientAnalysis`]. The raw text stays the source of truth in the chat
//! log; this parser is deterministic and side-effect free, so re-deriving the
//! record from stored text always matches the original derivation.

use crate::types::IngredientAnalysis;

/// Labels that introduce the allergen list line
const ALLERGEN_LABELS: &[&str] = &["allergens", "contains", "may contain"];

/// Parse a raw analysis response into a structured record.
///
/// Returns `None` when the text carries none of the structural markers, which
/// is how ordinary conversational replies are told apart from scan results.
/// Fields whose marker is absent are left unset, never defaulted.
pub fn parse(raw: &str) -> Option<IngredientAnalysis> {
    let mut analysis = IngredientAnalysis::default();
    let mut found_marker = false;

    for line in raw.lines() {
        let line = strip_decoration(line);
        if line.is_empty() {
            continue;
        }

        if let Some(value) = match_label(line, "product name") {
            analysis.product_name = non_empty(value);
            found_marker = true;
        } else if let Some(value) = match_label(line, "safety rating") {
            analysis.safety_rating = non_empty(value);
            found_marker = true;
        } else if let Some(value) = match_label(line, "gluten status") {
            analysis.gluten_status = non_empty(value);
            found_marker = true;
        } else if let Some(value) = match_label(line, "dairy status") {
            analysis.dairy_status = non_empty(value);
            found_marker = true;
        } else if let Some(value) = match_label(line, "vegan status") {
            analysis.vegan_status = non_empty(value);
            found_marker = true;
        } else if let Some(value) = match_label(line, "product category") {
            analysis.product_category = non_empty(value);
            found_marker = true;
        } else if let Some(value) = ALLERGEN_LABELS
            .iter()
            .find_map(|label| match_label(line, label))
        {
            analysis.allergen_warnings = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            found_marker = true;
        }
    }

    if found_marker {
        Some(analysis)
    } else {
        None
    }
}

/// Strip leading bullet characters and surrounding whitespace from a line.
/// Markdown emphasis markers around labels are treated the same way.
fn strip_decoration(line: &str) -> &str {
    line.trim()
        .trim_start_matches(['-', '*', '\u{2022}', '\u{2013}', ' ', '\t'])
        .trim()
}

/// Case-insensitive label match at the start of a line.
///
/// The label must be followed by a colon (possibly wrapped in leftover
/// emphasis markers); the returned value is the remainder of the line.
fn match_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }

    let rest = &line[label.len()..];
    let rest = rest.trim_start_matches(['*', ' ']);
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim_start_matches(['*', ' ', '\t']).trim())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
