//! Text preparation for embedding generation.
//!
//! 1. Trim whitespace
//! 2. Skip if empty
//! 3. Truncate to the configured number of characters

use crate::memory::truncate_chars;

/// Prepare `text` for the embedding model.
///
/// Returns `None` when nothing but whitespace is left.
pub fn prepare_input(text: &str, max_chars: usize) -> Option<&str> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(truncate_chars(text, max_chars).trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content_returns_none() {
        assert!(prepare_input("", 10).is_none());
        assert!(prepare_input("   ", 10).is_none());
        assert!(prepare_input("\n\t  \r\n", 10).is_none());
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(prepare_input("  Title  ", 100), Some("Title"));
    }

    #[test]
    fn test_truncation() {
        let long_content = "x".repeat(600);
        let prepared = prepare_input(&long_content, 512).unwrap();
        assert_eq!(prepared.chars().count(), 512);
    }

    #[test]
    fn test_truncation_is_char_safe() {
        let prepared = prepare_input("日本語タイトル", 3).unwrap();
        assert_eq!(prepared, "日本語");
    }

    #[test]
    fn test_truncation_does_not_leave_trailing_space() {
        assert_eq!(prepare_input("ab cd", 3), Some("ab"));
    }
}
