//! Filesystem-adjacent helpers used by the renderer and story directory setup.

/// Strips characters invalid on common filesystems and collapses whitespace
/// into single hyphens, so a book/story title is safe to use as a filename.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_invalid_characters() {
        assert_eq!(sanitize_filename("Chapter 1: The End?"), "chapter-1--the-end-");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize_filename("A   Long    Title"), "a-long-title");
    }
}
