//! Helpers for digging structured data out of free-form LLM output.

/// Extract the outermost JSON object from free-form text.
///
/// Models wrap JSON in prose and code fences more often than not; taking
/// the span from the first `{` to the last `}` recovers the object in
/// the common cases and lets serde reject the rest.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
