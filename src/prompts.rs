//! Instruction text sent alongside each page image.
//!
//! Every prompt the library can send lives here, so prompt regressions show
//! up in unit tests without a model in the loop. Callers can replace the
//! default through [`crate::config::ExtractionConfig::default_instruction`]
//! or per request; the mapping directive is appended in every case.

/// Built-in extraction instruction, used when the caller supplies none.
pub const DEFAULT_INSTRUCTION: &str = r#"You are an expert data extraction agent. The image is one page of a business document (invoice, purchase order, contract, form, table, or similar).

Extract every piece of text, every table and every labelled value on the page. Do not skip content and do not infer values that are not printed on the page; when a label has no readable value, say "no data found" for it.

Return ONLY a single well-formed JSON object with this structure:
{
  "records": [
    {
      "fields": { "<label>": "<value>" },
      "source_labels": { "<label>": "<label exactly as printed>" },
      "validation_score": 0.0
    }
  ],
  "tables": [
    {
      "headers": ["<header>"],
      "rows": [ { "cells": ["<value>"], "validation_score": 0.0 } ],
      "validation_score": 0.0
    }
  ],
  "currency": { "code": "<ISO 4217 code or null>", "symbol": "<symbol or null>" },
  "detected_languages": ["en"],
  "classification": "invoice | purchase_order | resume | contract | form | contacts | table | other",
  "notes": []
}

Rules:
- "validation_score" is a number between 0 and 1 expressing your confidence that the value was read correctly, e.g. 0.95.
- When unsure about a value, keep your best reading and add up to three alternatives with their own validation_score under "alternatives".
- Write dates as yyyy-mm-dd.
- For monetary values, keep the amount and the detected currency.
- Check that extracted totals match the sums printed in the document and mention mismatches in "notes".
- Put any commentary in "notes", never outside the JSON object.
- Do not wrap the JSON in markdown fences."#;

/// Label that introduces a caller-supplied mapping hint.
pub const MAPPING_DIRECTIVE: &str =
    "Use the following mapping to map labels from the document to standard labels:";

/// Build the instruction for one page using the built-in default.
///
/// See [`compose_with_default`] for the composition rules.
pub fn compose(explicit_prompt: Option<&str>, mapping_hint: Option<&str>) -> String {
    compose_with_default(DEFAULT_INSTRUCTION, explicit_prompt, mapping_hint)
}

/// Build the instruction for one page.
///
/// - A non-blank `explicit_prompt` is the base; otherwise `default` is.
/// - A non-blank `mapping_hint` is appended after the base under
///   [`MAPPING_DIRECTIVE`], whichever base was chosen.
///
/// Caller-supplied text is trusted and passed through verbatim. The result
/// is never empty as long as `default` is not; a blank `default` falls back
/// to [`DEFAULT_INSTRUCTION`].
pub fn compose_with_default(
    default: &str,
    explicit_prompt: Option<&str>,
    mapping_hint: Option<&str>,
) -> String {
    let base = match explicit_prompt {
        Some(p) if !p.trim().is_empty() => p,
        _ if !default.trim().is_empty() => default,
        _ => DEFAULT_INSTRUCTION,
    };

    let mut instruction = String::from(base);
    if let Some(mapping) = mapping_hint.filter(|m| !m.trim().is_empty()) {
        instruction.push_str("\n\n");
        instruction.push_str(MAPPING_DIRECTIVE);
        instruction.push('\n');
        instruction.push_str(mapping);
    }
    instruction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_inputs_yield_default() {
        let text = compose(None, None);
        assert_eq!(text, DEFAULT_INSTRUCTION);
        assert!(!text.trim().is_empty());
    }

    #[test]
    fn explicit_prompt_replaces_default() {
        assert_eq!(compose(Some("P"), None), "P");
    }

    #[test]
    fn blank_prompt_falls_back_to_default() {
        assert_eq!(compose(Some("   \n"), None), DEFAULT_INSTRUCTION);
        assert_eq!(compose(Some(""), None), DEFAULT_INSTRUCTION);
    }

    #[test]
    fn mapping_is_appended_after_prompt() {
        let text = compose(Some("P"), Some("M"));
        let p = text.find('P').expect("prompt present");
        let m = text.rfind('M').expect("mapping present");
        assert!(m > p, "mapping must follow the prompt: {text:?}");
        assert!(text.contains(MAPPING_DIRECTIVE));
        assert!(text.ends_with(":\nM"));
    }

    #[test]
    fn mapping_is_appended_to_default_too() {
        let mapping = "<map><from>Inv No</from><to>invoice_number</to></map>";
        let text = compose(None, Some(mapping));
        assert!(text.starts_with(DEFAULT_INSTRUCTION));
        assert!(text.ends_with(mapping));
    }

    #[test]
    fn blank_mapping_is_ignored() {
        assert_eq!(compose(Some("P"), Some("  ")), "P");
    }

    #[test]
    fn configured_default_is_used() {
        assert_eq!(compose_with_default("Extract totals.", None, None), "Extract totals.");
        assert_eq!(compose_with_default("", None, None), DEFAULT_INSTRUCTION);
    }

    #[test]
    fn default_prompt_asks_for_json_only() {
        assert!(DEFAULT_INSTRUCTION.contains("ONLY a single well-formed JSON object"));
        assert!(DEFAULT_INSTRUCTION.contains("validation_score"));
    }
}
