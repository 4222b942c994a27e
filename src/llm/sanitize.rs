//! SQL sanitization for generated text.
//!
//! Models wrap generated code in markdown fences; execution needs the bare
//! statement. `sanitize` is total over any input string and idempotent: it
//! strips surrounding whitespace and code-fence markers and nothing else.
//! It performs no SQL validation; execution is the authority on validity.

/// Extracts an executable SQL statement from raw model output.
///
/// Handles, in order: a complete fenced block (with or without a language
/// tag) anywhere in the text, an unclosed opening fence, and plain text.
/// The worst case returns the trimmed, unmodified input.
pub fn sanitize(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(block) = extract_fenced_block(trimmed) {
        return block.trim().to_string();
    }

    // Unclosed opening fence: drop the fence line and any dangling close.
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = match rest.find('\n') {
            Some(i) => &rest[i + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
        let rest = rest.trim();
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        return rest.trim().to_string();
    }

    trimmed.to_string()
}

/// Returns the content of the first complete ``` fenced block, if any.
fn extract_fenced_block(text: &str) -> Option<&str> {
    let start_idx = text.find("```")?;
    let after_fence = &text[start_idx + 3..];

    // The opening fence line may carry a language tag; content starts on
    // the next line.
    let content_offset = after_fence.find('\n')? + 1;
    let content = &after_fence[content_offset..];

    let end_idx = content.find("```")?;
    Some(&content[..end_idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_sql_fence() {
        assert_eq!(sanitize("```sql\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_strips_bare_fence() {
        assert_eq!(sanitize("```\nSELECT COUNT(*) FROM patients\n```"), "SELECT COUNT(*) FROM patients");
    }

    #[test]
    fn test_trims_plain_text() {
        assert_eq!(sanitize("  SELECT 1  \n"), "SELECT 1");
    }

    #[test]
    fn test_extracts_block_from_prose() {
        let raw = "Here is the query:\n\n```sql\nSELECT * FROM patients\n```\n\nThis returns all patients.";
        assert_eq!(sanitize(raw), "SELECT * FROM patients");
    }

    #[test]
    fn test_multiline_statement_preserved() {
        let raw = "```sql\nSELECT p.first_name,\n       COUNT(a.appointment_id) AS visits\nFROM patients p\nLEFT JOIN appointments a ON a.patient_id = p.patient_id\nGROUP BY p.first_name\n```";
        let sql = sanitize(raw);
        assert!(sql.starts_with("SELECT p.first_name,"));
        assert!(sql.ends_with("GROUP BY p.first_name"));
        assert!(!sql.contains("```"));
    }

    #[test]
    fn test_unclosed_fence() {
        assert_eq!(sanitize("```sql\nSELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_first_block_wins() {
        let raw = "```sql\nSELECT 1\n```\nor maybe\n```sql\nSELECT 2\n```";
        assert_eq!(sanitize(raw), "SELECT 1");
    }

    #[test]
    fn test_total_over_odd_inputs() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   \n\t  "), "");
        assert_eq!(sanitize("```"), "");
        assert_eq!(sanitize("``````"), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```sql\nSELECT 1\n```",
            "```\nSELECT 2\n```",
            "plain SELECT 3",
            "  spaced  ",
            "Here you go:\n```sql\nSELECT 4\n```\nEnjoy.",
            "```sql\nSELECT 5",
            "",
            "```",
        ];
        for input in inputs {
            let once = sanitize(input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "sanitize not idempotent for {input:?}");
        }
    }
}
