//! URL-safe slugs for tag names.

/// Returned when nothing of the input survives slugification.
pub const FALLBACK_SLUG: &str = "untitled";

/// Lowercase ASCII letters and digits joined by single hyphens. Spaces become hyphens; every
/// other character (punctuation, tabs, newlines, non-ASCII) is dropped.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        let c = match c {
            ' ' | '-' => '-',
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            _ => continue,
        };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(c);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Tag name a title is known by, or `None` when the title has no ASCII letter or digit to
/// build one from.
pub fn tag_slug(title: &str) -> Option<String> {
    title
        .chars()
        .any(|c| c.is_ascii_alphanumeric())
        .then(|| generate_slug(title))
}

pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_generate_slug() {
        let cases = [
            ("Hello World", "hello-world"),
            ("Chapter 42", "chapter-42"),
            ("already-valid-slug", "already-valid-slug"),
            ("Name & Title", "name-title"),
            ("C++ Programming", "c-programming"),
            ("It's a Test", "its-a-test"),
            ("Title (Subtitle)", "title-subtitle"),
            ("   Hello    World   ", "hello-world"),
            ("---hello-----world---", "hello-world"),
            ("Hello\tWorld\nTest", "helloworldtest"),
            ("Café", "caf"),
            ("Hello 😀 World", "hello-world"),
        ];
        for (input, expected) in cases {
            assert_eq!(generate_slug(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_fallback() {
        for input in ["", "   ", "!@#$%^&*()", "-----", "你好世界"] {
            assert_eq!(generate_slug(input), FALLBACK_SLUG);
        }
    }

    #[test]
    fn test_tag_slug_needs_a_letter_or_digit() {
        assert_eq!(tag_slug("Waterdeep Harbor").as_deref(), Some("waterdeep-harbor"));
        assert_eq!(tag_slug("Café"), Some("caf".to_string()));
        assert_eq!(tag_slug("!!!"), None);
        assert_eq!(tag_slug("你好世界"), None);
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("with-numbers-123"));
        assert!(is_valid_slug("multiple--hyphens"));
        assert!(!is_valid_slug("Hello World"));
        assert!(!is_valid_slug("test_case"));
        assert!(!is_valid_slug(""));
    }
}
