//! Prompts for the categorization call.
//!
//! Every prompt lives here so prompt changes never touch parsing or
//! orchestration code, and unit tests can inspect them directly.
//!
//! Callers can override the system prompt via
//! [`crate::config::IngestConfig::system_prompt`]; the user prompt always
//! comes from [`categorize_prompt`] because the response validator depends on
//! the output shape it asks for.

use crate::output::FoodCategory;

/// Default system prompt for the categorizer.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You categorize food items from grocery receipts. Respond with a JSON array only.";

/// Build the user prompt for a batch of cleaned OCR lines.
///
/// The instructions pin the answer to a JSON array of `{name, category}`
/// objects whose category is one of the two labels in [`FoodCategory`].
pub fn categorize_prompt(lines: &[String]) -> String {
    let fresh = FoodCategory::Fresh.label();
    let processed = FoodCategory::Processed.label();
    format!(
        r#"The lines below were read by OCR from a grocery receipt. Most of them are not food: prices, store details, dates, totals and non-food products must be ignored.

OCR lines:
{lines}

Rules:
- Extract ONLY items that are clearly food, drinks or grocery products
- Correct obvious OCR misspellings (e.g. "BANAN4S" becomes "Bananas")
- Write names in Title Case
- Give each item EXACTLY one category: "{fresh}" or "{processed}"
- "{fresh}": fruit, vegetables, raw meat, fresh fish, dairy, bread, eggs
- "{processed}": canned goods, snacks, ready meals, packaged items, frozen food, cereals
- Leave out anything you are not sure is food
- If there are no food items, return []

Only these two category strings are valid: "{fresh}", "{processed}".

Return a JSON array and nothing else, e.g. [{{"name": "Item Name", "category": "{processed}"}}]"#,
        lines = lines.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_lines_in_order() {
        let lines = vec!["BANAN4S 1.20".to_string(), "COLA 0.99".to_string()];
        let prompt = categorize_prompt(&lines);
        let a = prompt.find("BANAN4S 1.20").unwrap();
        let b = prompt.find("COLA 0.99").unwrap();
        assert!(a < b);
    }

    #[test]
    fn prompt_names_both_labels() {
        let prompt = categorize_prompt(&[]);
        assert!(prompt.contains("\"fresh food\""));
        assert!(prompt.contains("\"processed food\""));
        assert!(prompt.contains(r#"[{"name": "Item Name""#));
    }
}
