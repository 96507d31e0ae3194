//! Small text-formatting helpers shared by the outline pipeline and renderer.

/// `core_story_foundation` -> `Core Story Foundation`.
pub fn title_case(s: &str) -> String {
    s.split(['_', ' '])
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips a leading "Chapter N:" prefix and surrounding quotes/whitespace from
/// a chapter title pulled out of a rendered SUMMARY.md entry.
pub fn clean_chapter_title(title: &str) -> String {
    let mut t = title.trim().trim_matches('"').trim();
    if let Some(rest) = t.strip_prefix("Chapter") {
        let rest = rest.trim_start();
        if let Some(colon) = rest.find(':') {
            let (num, after) = rest.split_at(colon);
            if num.trim().chars().all(|c| c.is_ascii_digit()) {
                t = after[1..].trim();
            }
        }
    }
    t.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_snake_case() {
        assert_eq!(title_case("plot_structure"), "Plot Structure");
    }

    #[test]
    fn strips_chapter_prefix() {
        assert_eq!(clean_chapter_title("Chapter 3: The Descent"), "The Descent");
        assert_eq!(clean_chapter_title("The Descent"), "The Descent");
    }
}
