//! Identifier validation shared by registration paths.

/// Maximum length of a server id.
pub const SERVER_ID_MAX: usize = 64;

/// Maximum length of a display name.
pub const DISPLAY_NAME_MAX: usize = 255;

/// Check a server id: `[A-Za-z0-9_-]+`, 1–64 chars.
pub fn is_valid_server_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= SERVER_ID_MAX
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Strip characters that are not valid in a player identifier.
///
/// Returns `None` when nothing survives, so callers can reject the
/// operation instead of enqueueing a no-op.
pub fn sanitize_player_target(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_id_rules() {
        assert!(is_valid_server_id("survival"));
        assert!(is_valid_server_id("lobby-01_A"));
        assert!(!is_valid_server_id(""));
        assert!(!is_valid_server_id("has space"));
        assert!(!is_valid_server_id(&"x".repeat(65)));
    }

    #[test]
    fn sanitize_strips_and_rejects() {
        assert_eq!(sanitize_player_target(" Alice "), Some("Alice".into()));
        assert_eq!(sanitize_player_target("Bob!@#"), Some("Bob".into()));
        assert_eq!(sanitize_player_target("!!!"), None);
        assert_eq!(sanitize_player_target(""), None);
    }
}
