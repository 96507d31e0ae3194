//! Content-addressed, resumable artifact storage per story (C1).

use crate::error::{BookGeneratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A scalar recoverable from the typed `**Value:** / **Type:** ` body header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::String(v) => write!(f, "{v}"),
            ScalarValue::Null => write!(f, "null"),
        }
    }
}

/// The value the store accepts/returns: a plain scalar, or an arbitrary
/// structured (mapping/sequence) JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavepointValue {
    Scalar(ScalarValue),
    Structured(JsonValue),
}

impl SavepointValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SavepointValue::Scalar(ScalarValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            SavepointValue::Scalar(s) => s.to_string(),
            SavepointValue::Structured(v) => v.to_string(),
        }
    }
}

impl From<&str> for SavepointValue {
    fn from(s: &str) -> Self {
        SavepointValue::Scalar(ScalarValue::String(s.to_string()))
    }
}

impl From<String> for SavepointValue {
    fn from(s: String) -> Self {
        SavepointValue::Scalar(ScalarValue::String(s))
    }
}

impl From<JsonValue> for SavepointValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Object(_) | JsonValue::Array(_) => SavepointValue::Structured(v),
            JsonValue::String(s) => SavepointValue::Scalar(ScalarValue::String(s)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SavepointValue::Scalar(ScalarValue::Int(i))
                } else {
                    SavepointValue::Scalar(ScalarValue::Float(n.as_f64().unwrap_or_default()))
                }
            }
            JsonValue::Bool(b) => SavepointValue::Scalar(ScalarValue::Bool(b)),
            JsonValue::Null => SavepointValue::Scalar(ScalarValue::Null),
        }
    }
}

/// `{_frontmatter, _body}` view of a savepoint, or `{legacy_data: true}` when
/// the file predates the frontmatter convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavepointMetadata {
    pub frontmatter: BTreeMap<String, JsonValue>,
    pub body: String,
    pub legacy_data: bool,
}

pub struct SavepointStore {
    root: PathBuf,
    story_dir: Option<PathBuf>,
}

impl SavepointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            story_dir: None,
        }
    }

    pub fn set_story(&mut self, story_name: &str) -> Result<()> {
        let dir = self.root.join(story_name);
        std::fs::create_dir_all(&dir)?;
        self.story_dir = Some(dir);
        Ok(())
    }

    pub fn story_dir(&self) -> Result<&Path> {
        self.story_dir
            .as_deref()
            .ok_or(BookGeneratorError::SavepointNotBound)
    }

    fn path_for(&self, step_id: &str) -> Result<PathBuf> {
        let dir = self.story_dir()?;
        Ok(dir.join(format!("{step_id}.md")))
    }

    /// Write is atomic: full content goes to a temp file, then renamed into place.
    pub fn save(&self, step_id: &str, value: impl Into<SavepointValue>) -> Result<()> {
        let value = value.into();
        let path = self.path_for(step_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = render(&value)?;
        let tmp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn has(&self, step_id: &str) -> Result<bool> {
        Ok(self.path_for(step_id)?.is_file())
    }

    pub fn delete(&self, step_id: &str) -> Result<()> {
        let path = self.path_for(step_id)?;
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn load(&self, step_id: &str) -> Result<Option<SavepointValue>> {
        let path = self.path_for(step_id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        parse(&raw, step_id).map(Some)
    }

    pub fn load_with_metadata(&self, step_id: &str) -> Result<Option<SavepointMetadata>> {
        let path = self.path_for(step_id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(parse_metadata(&raw)))
    }

    /// Recursive enumeration of every savepoint under the current story.
    /// Corrupted entries are skipped rather than failing the whole listing.
    pub fn list_all(&self) -> Result<Vec<(String, SavepointValue)>> {
        let dir = self.story_dir()?.to_path_buf();
        let mut out = Vec::new();
        walk(&dir, &dir, &mut out);
        Ok(out)
    }
}

fn walk(base: &Path, dir: &Path, out: &mut Vec<(String, SavepointValue)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(base, &path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let step_id = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .with_extension("")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            if let Ok(value) = parse(&raw, &step_id) {
                out.push((step_id, value));
            }
        }
    }
}

const SCALAR_HEADER: &str = "**Value:**";
const TYPE_HEADER: &str = "**Type:**";
const FRONTMATTER_DELIM: &str = "---\n";

fn render(value: &SavepointValue) -> Result<String> {
    match value {
        SavepointValue::Scalar(s) => {
            let type_tag = match s {
                ScalarValue::Int(_) => "int",
                ScalarValue::Float(_) => "float",
                ScalarValue::Bool(_) => "bool",
                ScalarValue::String(_) => "string",
                ScalarValue::Null => "null",
            };
            // The value goes on its own line(s) after the headers so that a
            // multi-paragraph string (most of what this store persists) keeps
            // its embedded newlines instead of being truncated by them.
            Ok(format!(
                "{TYPE_HEADER} {type_tag}\n{SCALAR_HEADER}\n{s}\n"
            ))
        }
        SavepointValue::Structured(v) => {
            let mut frontmatter = BTreeMap::new();
            frontmatter.insert("_frontmatter".to_string(), serde_json::json!(true));
            frontmatter.insert("_body".to_string(), v.clone());
            let yaml = serde_yaml::to_string(&frontmatter)
                .map_err(|e| BookGeneratorError::SerializationError(e.to_string()))?;
            Ok(format!("{FRONTMATTER_DELIM}{yaml}{FRONTMATTER_DELIM}\n"))
        }
    }
}

fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix(FRONTMATTER_DELIM)?;
    let end = rest.find(FRONTMATTER_DELIM)?;
    Some((&rest[..end], &rest[end + FRONTMATTER_DELIM.len()..]))
}

fn parse(raw: &str, step_id: &str) -> Result<SavepointValue> {
    if let Some((yaml, body)) = split_frontmatter(raw) {
        let doc: BTreeMap<String, JsonValue> =
            serde_yaml::from_str(yaml).map_err(|e| BookGeneratorError::SavepointCorrupt {
                step_id: step_id.to_string(),
                source: e,
            })?;
        if let Some(body_value) = doc.get("_body") {
            return Ok(SavepointValue::Structured(body_value.clone()));
        }
        // Legacy structured file: the whole doc minus bookkeeping keys is the value.
        let _ = body;
        return Ok(SavepointValue::Structured(serde_json::to_value(&doc)?));
    }

    // Current format: a `**Type:**` line, then a bare `**Value:**` marker line,
    // then the value verbatim (including embedded newlines) to the end of the
    // file (minus the single trailing newline `render` adds).
    let value_marker = format!("{SCALAR_HEADER}\n");
    if let Some(marker_start) = raw.find(&value_marker) {
        let mut type_tag = "string";
        for t in raw[..marker_start].lines() {
            if let Some(t) = t.strip_prefix(TYPE_HEADER) {
                type_tag = t.trim();
            }
        }
        let mut body = &raw[marker_start + value_marker.len()..];
        body = body.strip_suffix('\n').unwrap_or(body);
        let scalar = match type_tag {
            "int" => ScalarValue::Int(body.trim().parse().unwrap_or_default()),
            "float" => ScalarValue::Float(body.trim().parse().unwrap_or_default()),
            "bool" => ScalarValue::Bool(body.trim().parse().unwrap_or_default()),
            "null" => ScalarValue::Null,
            _ => ScalarValue::String(body.to_string()),
        };
        return Ok(SavepointValue::Scalar(scalar));
    }

    // Older single-line format: `**Value:** <v>` sharing a line with the value,
    // with `**Type:**` elsewhere in the file. Only correct for single-line values,
    // kept only so pre-existing files of this shape still load.
    for line in raw.lines() {
        if let Some(v) = line.strip_prefix(SCALAR_HEADER) {
            let v = v.trim();
            let mut type_tag = "string";
            for t in raw.lines() {
                if let Some(t) = t.strip_prefix(TYPE_HEADER) {
                    type_tag = t.trim();
                }
            }
            let scalar = match type_tag {
                "int" => ScalarValue::Int(v.parse().unwrap_or_default()),
                "float" => ScalarValue::Float(v.parse().unwrap_or_default()),
                "bool" => ScalarValue::Bool(v.parse().unwrap_or_default()),
                "null" => ScalarValue::Null,
                _ => ScalarValue::String(v.to_string()),
            };
            return Ok(SavepointValue::Scalar(scalar));
        }
    }

    // No recognized header at all: treat the raw body as a legacy string savepoint.
    Ok(SavepointValue::Scalar(ScalarValue::String(
        raw.trim().to_string(),
    )))
}

fn parse_metadata(raw: &str) -> SavepointMetadata {
    if let Some((yaml, body)) = split_frontmatter(raw) {
        if let Ok(doc) = serde_yaml::from_str::<BTreeMap<String, JsonValue>>(yaml) {
            return SavepointMetadata {
                frontmatter: doc,
                body: body.to_string(),
                legacy_data: false,
            };
        }
    }
    let mut frontmatter = BTreeMap::new();
    frontmatter.insert("legacy_data".to_string(), serde_json::json!(true));
    SavepointMetadata {
        frontmatter,
        body: raw.to_string(),
        legacy_data: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SavepointStore::new(dir.path());
        store.set_story("story-a").unwrap();

        store.save("x", SavepointValue::Scalar(ScalarValue::Int(42))).unwrap();
        assert!(store.has("x").unwrap());
        match store.load("x").unwrap().unwrap() {
            SavepointValue::Scalar(ScalarValue::Int(v)) => assert_eq!(v, 42),
            other => panic!("unexpected value: {other:?}"),
        }
        store.delete("x").unwrap();
        assert!(!store.has("x").unwrap());
    }

    #[test]
    fn multi_paragraph_string_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SavepointStore::new(dir.path());
        store.set_story("story-a").unwrap();

        let content = "Scene one opens on a quiet street.\n\nScene two, paragraph two.\n\nScene three ends it.";
        store.save("chapter_1/content", content).unwrap();
        match store.load("chapter_1/content").unwrap().unwrap() {
            SavepointValue::Scalar(ScalarValue::String(v)) => assert_eq!(v, content),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn load_absent_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SavepointStore::new(dir.path());
        store.set_story("story-a").unwrap();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn structured_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SavepointStore::new(dir.path());
        store.set_story("story-a").unwrap();

        let value: JsonValue = serde_json::json!({"events": [1, 2, 3]});
        store.save("chapter_1/recap", SavepointValue::from(value.clone())).unwrap();

        match store.load("chapter_1/recap").unwrap().unwrap() {
            SavepointValue::Structured(v) => assert_eq!(v, value),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn without_story_bound_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SavepointStore::new(dir.path());
        let err = store.save("x", "y").unwrap_err();
        assert!(matches!(err, BookGeneratorError::SavepointNotBound));
    }

    #[test]
    fn write_is_atomic_no_partial_file_visible() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SavepointStore::new(dir.path());
        store.set_story("story-a").unwrap();
        store.save("x", "hello").unwrap();
        // No stray temp files should remain after a successful save.
        let story_dir = store.story_dir().unwrap();
        let leftover: Vec<_> = std::fs::read_dir(story_dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftover.is_empty());
    }

    #[test]
    fn list_all_skips_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SavepointStore::new(dir.path());
        store.set_story("story-a").unwrap();
        store.save("good", "value").unwrap();

        let corrupt_path = store.story_dir().unwrap().join("bad.md");
        std::fs::write(&corrupt_path, "---\nnot: [valid yaml\n---\n").unwrap();

        let all = store.list_all().unwrap();
        assert!(all.iter().any(|(id, _)| id == "good"));
        assert!(!all.iter().any(|(id, _)| id == "bad"));
    }
}
