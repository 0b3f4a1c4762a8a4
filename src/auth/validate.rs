pub const MAX_COMMENT_LEN: usize = 4000;
pub const MAX_ID_LEN: usize = 128;

/// Validate a comment body: required, at most `MAX_COMMENT_LEN` characters after trimming.
pub fn validate_comment_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some("Comment text is required".to_string());
    }
    if trimmed.chars().count() > MAX_COMMENT_LEN {
        return Some(format!("Comment text must be at most {MAX_COMMENT_LEN} characters"));
    }
    None
}

/// Validate an opaque identifier (actor or resource id): non-empty, no whitespace.
pub fn validate_identifier(value: &str, field_name: &str) -> Option<String> {
    if value.is_empty() {
        return Some(format!("{field_name} is required"));
    }
    if value.len() > MAX_ID_LEN {
        return Some(format!("{field_name} must be at most {MAX_ID_LEN} characters"));
    }
    if value.chars().any(char::is_whitespace) {
        return Some(format!("{field_name} may not contain whitespace"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_text_rules() {
        assert!(validate_comment_text("   ").is_some());
        assert!(validate_comment_text("Props trunk is in bay 3").is_none());
        assert!(validate_comment_text(&"x".repeat(MAX_COMMENT_LEN + 1)).is_some());
    }

    #[test]
    fn identifier_rules() {
        assert!(validate_identifier("", "Actor id").is_some());
        assert!(validate_identifier("user 1", "Actor id").is_some());
        assert!(validate_identifier("uid_9f2c", "Actor id").is_none());
    }
}
