//! A single scene within a chapter.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Scene {
    pub number: usize,
    pub title: String,
    pub description: String,
    pub content: String,
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "## {}\n\n{}", self.title, self.content)
    }
}

/// The `{title, description}` shape parsed out of a chapter's disambiguated
/// outline. Falls back to a single scene wrapping the whole outline when the
/// model's JSON can't be parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDefinition {
    pub title: String,
    pub description: String,
}

pub fn parse_scene_definitions(raw: &str, outline: &str) -> Vec<SceneDefinition> {
    if let Ok(value) = crate::llm::parse_json_lenient(raw) {
        if let Some(arr) = value.as_array() {
            let defs: Vec<SceneDefinition> = arr
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect();
            if !defs.is_empty() {
                return defs;
            }
        }
    }
    vec![SceneDefinition {
        title: "Scene 1".to_string(),
        description: outline.to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scene_array() {
        let raw = r#"[{"title": "A", "description": "first"}, {"title": "B", "description": "second"}]"#;
        let defs = parse_scene_definitions(raw, "fallback outline");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].title, "A");
    }

    #[test]
    fn falls_back_to_single_scene_on_parse_failure() {
        let defs = parse_scene_definitions("not json at all", "the whole outline");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].description, "the whole outline");
    }
}
