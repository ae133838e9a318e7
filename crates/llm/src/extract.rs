//! Response Extraction
//!
//! Models wrap their answers in markdown fences, prose, or both. Everything
//! that has to guess where the payload starts lives here so the adapters and
//! services can stay strict.

/// Pull a JSON object out of model output.
///
/// Tries a ```json fence, then any fence whose body starts with `{`, then the
/// outermost `{...}` span of the raw text.
pub fn extract_json_object(text: &str) -> Option<String> {
    if let Some(start) = text.find("```json") {
        let after_fence = &text[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim().to_string());
        }
    }
    if let Some(body) = first_fenced_block(text) {
        if body.starts_with('{') {
            return Some(body.to_string());
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(text[start..=end].to_string())
    } else {
        None
    }
}

/// Pull application code out of model output.
///
/// Prefers a fenced block (```html or unlabelled); otherwise starts at the
/// first `<!DOCTYPE` or `<html` marker. Falls back to the trimmed text.
pub fn extract_code(text: &str) -> String {
    if let Some(start) = text.find("```html") {
        let after_fence = &text[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim().to_string();
        }
    }
    if let Some(body) = first_fenced_block(text) {
        if !body.is_empty() {
            return body.to_string();
        }
    }
    let lower = text.to_ascii_lowercase();
    let marker = lower.find("<!doctype").or_else(|| lower.find("<html"));
    if let Some(start) = marker {
        let end = lower
            .rfind("</html>")
            .map(|i| i + "</html>".len())
            .filter(|end| *end > start)
            .unwrap_or(text.len());
        return text[start..end].trim().to_string();
    }
    text.trim().to_string()
}

/// Body of the first ``` fence, with its optional language line skipped
fn first_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let after_lang = match after_fence.find('\n') {
        Some(nl) => &after_fence[nl + 1..],
        None => after_fence,
    };
    let end = after_lang.find("```")?;
    Some(after_lang[..end].trim())
}
