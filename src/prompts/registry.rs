use crate::error::{BookGeneratorError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Loads text templates from a directory tree keyed by dotted path
/// (e.g. `chapters.outline_core` -> `<root>/chapters/outline_core.md`),
/// with `{name}` placeholder substitution. Templates are immutable assets
/// external to the pipeline logic itself.
pub struct PromptRegistry {
    root: PathBuf,
}

impl PromptRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, prompt_id: &str) -> PathBuf {
        let mut path = self.root.clone();
        let mut parts: Vec<&str> = prompt_id.split('.').collect();
        let last = parts.pop().unwrap_or_default();
        for part in parts {
            path.push(part);
        }
        path.push(format!("{last}.md"));
        path
    }

    pub fn load(&self, prompt_id: &str, variables: &HashMap<String, String>) -> Result<String> {
        let path = self.path_for(prompt_id);
        let template = std::fs::read_to_string(&path)
            .map_err(|_| BookGeneratorError::PromptNotFound(prompt_id.to_string()))?;
        substitute(&template, prompt_id, variables)
    }

    /// Writes the built-in default template set if not already present under `root`.
    /// Ported from the string templates this crate's ancestor kept in-code.
    pub fn ensure_builtin_defaults(&self) -> Result<()> {
        for (id, text) in builtin_templates() {
            let path = self.path_for(id);
            if path.is_file() {
                continue;
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, text)?;
        }
        Ok(())
    }
}

fn substitute(
    template: &str,
    prompt_id: &str,
    variables: &HashMap<String, String>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let name = &template[i + 1..i + 1 + end];
                if name.chars().all(|c| c.is_alphanumeric() || c == '_') && !name.is_empty() {
                    let value = variables.get(name).ok_or_else(|| {
                        BookGeneratorError::TemplateVariableMissing {
                            prompt_id: prompt_id.to_string(),
                            variable: name.to_string(),
                        }
                    })?;
                    out.push_str(value);
                    i += end + 2;
                    continue;
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    let _ = &mut chars;
    Ok(out)
}

fn builtin_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        ("book.braindump", "Generate a braindump for a novel titled '{title}', include key ideas, themes, and potential plot points.\n\nBraindump:"),
        ("book.genre", "Given the following context, suggest an appropriate genre for the book. Provide the genre name followed by a colon and a brief description of why this genre fits the book.\n\nTitle: {title}\nBraindump: {braindump}\n\nGenre:"),
        ("book.style", "Based on the following context, suggest a writing style for the novel. Describe the narrative perspective, tense, and any notable stylistic elements.\n\nTitle: {title}\nBraindump: {braindump}\nGenre: {genre}\n\nStyle:"),
        ("outline.understand_prompt", "Read the following story prompt carefully and restate your understanding of its premise, tone, and what a reader would expect from it.\n\nPrompt: {prompt}\n\nUnderstanding:"),
        ("outline.core_story_foundation", "Given everything discussed so far, describe the core story foundation: premise, central conflict, and stakes.\n\nCore story foundation:"),
        ("outline.character_foundation", "Given everything discussed so far, describe the character foundation: who the story follows and why they matter.\n\nCharacter foundation:"),
        ("outline.setting_foundation", "Given everything discussed so far, describe the setting foundation: where and when the story takes place.\n\nSetting foundation:"),
        ("outline.plot_structure", "Given everything discussed so far, describe the plot structure: major beats from inciting incident to resolution.\n\nPlot structure:"),
        ("outline.theme_message", "Given everything discussed so far, describe the theme and message of the story.\n\nTheme and message:"),
        ("outline.tone_style", "Given everything discussed so far, describe the tone and style the prose should adopt.\n\nTone and style:"),
        ("outline.conflict_stakes", "Given everything discussed so far, describe the central conflicts and what is at stake.\n\nConflict and stakes:"),
        ("outline.world_rules_logic", "Given everything discussed so far, describe the rules that govern this story's world.\n\nWorld rules and logic:"),
        ("outline.story_start_date", "From the core story foundation below, extract a single in-world starting date for the story. If none is implied, invent a plausible one.\n\nCore story foundation: {core_story_foundation}\n\nStory start date:"),
        ("outline.base_context", "Summarize the core story foundation below into a short base context paragraph usable as shared context for every later generation step.\n\nCore story foundation: {core_story_foundation}\n\nBase context:"),
        ("entity.extract_names", "From the story elements below, list up to 10 distinct {kind} names that appear or are implied. Respond as a JSON array of strings.\n\nStory elements: {story_elements}\n\nNames (JSON array):"),
        ("entity.sheet", "Write a complete {kind} sheet for '{name}' consistent with the story elements below.\n\nStory elements: {story_elements}\n\n{kind} sheet for {name}:"),
        ("entity.chunk", "Based on the {kind} sheet for '{name}' above, write a focused passage covering only: {chunk_type}.\n\n{chunk_type} for {name}:"),
        ("entity.update_sheet", "Here is the existing sheet for '{name}':\n\n{existing_sheet}\n\nHere is a new chapter in which {name} appears:\n\n{chapter_content}\n\nProduce an updated sheet for '{name}' reflecting anything new or changed.\n\nUpdated sheet:"),
        ("entity.summary", "Summarize '{name}' in two or three sentences using their personality, motivations, and current state below.\n\nPersonality: {personality}\nMotivations: {motivations}\nCurrent state: {current_state}\n\nSummary:"),
        ("chapter.ensure_synopsis", "Write a synopsis for chapter {chapter_number} of this story, continuing naturally from the previous chapter's synopsis.\n\nStoryline understanding: {understanding}\nBase context: {base_context}\nCombined outline: {combined_outline}\nCharacters: {characters}\nSettings: {settings}\nPrevious chapter synopsis: {previous_synopsis}\n\nChapter {chapter_number} synopsis:"),
        ("chapter.core_outline", "Write a detailed outline for chapter {chapter_number} given the synopsis, character sheets, setting sheets, and recap below.\n\nSynopsis: {synopsis}\nCharacters: {characters}\nSettings: {settings}\nPrevious recap: {previous_recap}\nNext chapter synopsis: {next_synopsis}\n\nChapter {chapter_number} outline:"),
        ("chapter.validate_outline", "Review the chapter outline below for continuity problems, contradictions, or missing setups. If there are issues, respond starting with 'ISSUES:' followed by a bulleted list. If there are none, respond with 'OK'.\n\nOutline: {outline}\n\nReview:"),
        ("chapter.improve_outline", "Revise the chapter outline below to address the listed issues.\n\nOutline: {outline}\n\nIssues: {issues}\n\nRevised outline:"),
        ("chapter.disambiguate_outline", "Rewrite the chapter outline below so every character and setting reference is unambiguous (use full names, not pronouns, on first mention within each scene).\n\nOutline: {outline}\n\nDisambiguated outline:"),
        ("chapter.cleanup_outline", "Clean up the chapter outline below: remove meta-commentary, fix formatting, keep only the outline content itself.\n\nOutline: {outline}\n\nCleaned outline:"),
        ("chapter.scene_definitions", "From the chapter outline below, extract the scene list as a JSON array of objects with 'title' and 'description' fields.\n\nOutline: {outline}\n\nScenes (JSON array):"),
        ("chapter.scene_content", "Write scene {scene_number}, titled '{scene_title}', in full prose (at least 500 words), continuing naturally from the previous scene.\n\nScene description: {scene_description}\nChapter outline: {chapter_outline}\nPrevious scene content: {previous_scene}\n\nScene prose:"),
        ("chapter.scene_title", "Propose a short, evocative title for this scene.\n\nScene content: {scene_content}\n\nTitle:"),
        ("chapter.title", "Propose a short, evocative title for this chapter.\n\nChapter content: {chapter_content}\nChapter outline: {chapter_outline}\n\nTitle:"),
        ("recap.extract_events", "List the significant events that occur in the chapter content below, as prose, one event per line.\n\nChapter content: {chapter_content}\n\nEvents:"),
        ("recap.assign_timing", "Given the story start date and the previous chapter's recap, annotate each event below with a date or date range.\n\nStory start date: {story_start_date}\nPrevious recap: {previous_recap}\nEvents: {events}\n\nTimed events:"),
        ("recap.enrich_details", "Enrich each event below with the characters involved, the location, any recurring motifs, and an importance rating (low, medium, or high).\n\nTimed events: {timed_events}\n\nEnriched events:"),
        ("recap.format_json", "Convert the enriched events below into the canonical JSON structure: {{\"meta\": {{\"latest_event_date\": ..., \"total_events\": ...}}, \"events_by_timeline\": {{\"current\": {{\"events\": [...]}}, \"recent_events\": {{\"events\": [...]}}, \"historical\": {{\"events\": [...]}}}}}}.\n\nEnriched events: {enriched_events}\n\nJSON:"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables() {
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), "Nocturne".to_string());
        let out = substitute("Title: {title}.", "test.id", &vars).unwrap();
        assert_eq!(out, "Title: Nocturne.");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let vars = HashMap::new();
        let err = substitute("Title: {title}.", "test.id", &vars).unwrap_err();
        assert!(matches!(
            err,
            BookGeneratorError::TemplateVariableMissing { .. }
        ));
    }

    #[test]
    fn load_missing_prompt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PromptRegistry::new(dir.path());
        let err = registry.load("nope.here", &HashMap::new()).unwrap_err();
        assert!(matches!(err, BookGeneratorError::PromptNotFound(_)));
    }

    #[test]
    fn ensure_builtin_defaults_writes_files_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PromptRegistry::new(dir.path());
        registry.ensure_builtin_defaults().unwrap();

        let mut vars = HashMap::new();
        vars.insert("title".to_string(), "X".to_string());
        let text = registry.load("book.braindump", &vars).unwrap();
        assert!(text.contains('X'));
    }
}
