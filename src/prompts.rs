//! System prompt for the AI repair oracle.
//!
//! Kept in one place so the wording can be tuned without touching the
//! request plumbing in [`crate::pipeline::repair`], and so tests can check
//! the reply contract the prompt promises.

/// Instruction sent as the system message on every repair request.
///
/// The SVG itself goes in the user message. The reply is requested as a JSON
/// object whose keys match [`crate::pipeline::repair::RepairVerdict`].
pub const REPAIR_SYSTEM_PROMPT: &str = r#"You validate and repair SVG documents. The user message contains the full SVG source.

1. Inspect the SVG for problems such as:
   - unclosed or mismatched tags
   - invalid or unquoted attribute values
   - missing width, height or viewBox on the root element
   - malformed path data
   - invalid colour values
   - missing or wrong xmlns namespace declarations
   - a broken XML declaration

2. If you repaired anything:
   - set "fixed" to true
   - put the complete corrected SVG in "content"
   - list every problem you repaired in "issues_found"

3. If the SVG needs no repair:
   - set "fixed" to false
   - put the original SVG, unchanged, in "content"
   - leave "issues_found" empty

4. Put remaining concerns or suggestions that you did not act on in "warnings".

5. Any SVG you return must be well-formed XML that renders on its own.

Reply with one JSON object and nothing else:

{
  "fixed": true or false,
  "content": "the SVG source",
  "issues_found": ["..."],
  "warnings": ["..."]
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_reply_field() {
        for key in ["\"fixed\"", "\"content\"", "\"issues_found\"", "\"warnings\""] {
            assert!(REPAIR_SYSTEM_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn prompt_asks_to_preserve_valid_content() {
        assert!(REPAIR_SYSTEM_PROMPT.contains("unchanged"));
    }
}
