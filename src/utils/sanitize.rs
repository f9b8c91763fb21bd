//! Prompt input sanitization.

/// Sanitize user-controlled text before it enters an analyst prompt.
///
/// Control characters other than newline, tab and carriage return are
/// stripped; leading and trailing whitespace is trimmed. The result is
/// framed as inert data by the guard prompt, never concatenated into the
/// system prompt.
pub fn sanitize_prompt_text(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_control_chars() {
        let dirty = "  Projekt\u{0000}beschreibung\u{001b}[31m\nmit Umbruch\t ";
        assert_eq!(sanitize_prompt_text(dirty), "Projektbeschreibung[31m\nmit Umbruch");
    }

    #[test]
    fn test_sanitize_keeps_plain_text() {
        assert_eq!(sanitize_prompt_text("F&E-Projekt in Wien"), "F&E-Projekt in Wien");
        assert_eq!(sanitize_prompt_text("   "), "");
    }
}
