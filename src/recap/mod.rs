//! Event extraction, temporal classification, and aging/filtering (C11).

use crate::error::Result;
use crate::executor::{ExecInput, ExecRequest, PromptExecutor};
use crate::llm::{GenerateOptions, ModelConfig};
use chrono::NaiveDate;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

/// Runs the four-stage recap pipeline, each stage a savepoint-backed
/// executor call, then applies the programmatic aging/importance filter.
/// Falls back to the existing recap (or an empty string) if any stage fails.
pub async fn generate_recap(
    executor: &PromptExecutor<'_>,
    chapter_number: usize,
    chapter_content: &str,
    previous_recap: &str,
    story_start_date: &str,
    model: &ModelConfig,
    max_event_age_days: i64,
) -> String {
    match try_generate_recap(
        executor,
        chapter_number,
        chapter_content,
        previous_recap,
        story_start_date,
        model,
        max_event_age_days,
    )
    .await
    {
        Ok(recap) => recap,
        Err(_) => executor
            .savepoints
            .load(&format!("chapter_{chapter_number}/recap"))
            .ok()
            .flatten()
            .map(|v| v.into_string())
            .unwrap_or_default(),
    }
}

async fn try_generate_recap(
    executor: &PromptExecutor<'_>,
    chapter_number: usize,
    chapter_content: &str,
    previous_recap: &str,
    story_start_date: &str,
    model: &ModelConfig,
    max_event_age_days: i64,
) -> Result<String> {
    let opts = GenerateOptions::default();

    // Stage 1: extract events.
    let mut vars = HashMap::new();
    vars.insert("chapter_content".to_string(), chapter_content.to_string());
    let events = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "recap.extract_events",
                variables: vars,
            },
            savepoint_id: Some(&format!("chapter_{chapter_number}/recap_events")),
            system_message: None,
            model_config: model,
            options: opts.clone(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    // Stage 2: assign timing.
    let mut vars = HashMap::new();
    vars.insert("story_start_date".to_string(), story_start_date.to_string());
    vars.insert("previous_recap".to_string(), previous_recap.to_string());
    vars.insert("events".to_string(), events);
    let timed_events = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "recap.assign_timing",
                variables: vars,
            },
            savepoint_id: Some(&format!("chapter_{chapter_number}/recap_timed")),
            system_message: None,
            model_config: model,
            options: opts.clone(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    // Stage 3: enrich details.
    let mut vars = HashMap::new();
    vars.insert("timed_events".to_string(), timed_events);
    let enriched_events = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "recap.enrich_details",
                variables: vars,
            },
            savepoint_id: Some(&format!("chapter_{chapter_number}/recap_enriched")),
            system_message: None,
            model_config: model,
            options: opts.clone(),
            expect_json: false,
            required_attrs: Vec::new(),
        })
        .await?
        .content;

    // Stage 4: format as canonical JSON.
    let mut vars = HashMap::new();
    vars.insert("enriched_events".to_string(), enriched_events);
    let formatted = executor
        .execute(ExecRequest {
            input: ExecInput::Prompt {
                prompt_id: "recap.format_json",
                variables: vars,
            },
            savepoint_id: None,
            system_message: None,
            model_config: model,
            options: opts,
            expect_json: true,
            required_attrs: Vec::new(),
        })
        .await?;

    let recap_json: JsonValue = serde_json::from_str(&formatted.content).unwrap_or(JsonValue::Null);

    // Stage 5: programmatic aging/importance filter.
    let filtered = filter_aged_events(&recap_json, story_start_date, max_event_age_days);
    let rendered = serde_json::to_string_pretty(&filtered)?;

    executor
        .savepoints
        .save(&format!("chapter_{chapter_number}/recap"), crate::savepoint::SavepointValue::from(filtered))?;

    Ok(rendered)
}

fn all_events(recap: &JsonValue) -> Vec<JsonValue> {
    let mut events = Vec::new();
    if let Some(timeline) = recap.get("events_by_timeline").and_then(|v| v.as_object()) {
        for section in timeline.values() {
            if let Some(arr) = section.get("events").and_then(|v| v.as_array()) {
                events.extend(arr.iter().cloned());
            }
        }
    } else if let Some(arr) = recap.get("events").and_then(|v| v.as_array()) {
        events.extend(arr.iter().cloned());
    }
    events
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Drops every event whose importance isn't `high`, and every `high` event
/// older than `max_event_age_days` relative to the max `date_start` seen
/// (falling back to `story_start_date` when no event carries a date).
/// Strips `date_start`, `date_end`, `symbols_motifs`, `importance`, and
/// `chapter_context` from surviving events, then rewrites `meta`.
pub fn filter_aged_events(recap: &JsonValue, story_start_date: &str, max_event_age_days: i64) -> JsonValue {
    let events = all_events(recap);

    let current_date = events
        .iter()
        .filter_map(|e| e.get("date_start").and_then(|v| v.as_str()).and_then(parse_date))
        .max()
        .or_else(|| parse_date(story_start_date));

    let mut kept = Vec::new();
    for event in events {
        let importance = event.get("importance").and_then(|v| v.as_str()).unwrap_or("");
        if importance != "high" {
            continue;
        }
        if let (Some(current), Some(event_date)) = (
            current_date,
            event.get("date_start").and_then(|v| v.as_str()).and_then(parse_date),
        ) {
            let age_days = (current - event_date).num_days();
            if age_days > max_event_age_days {
                continue;
            }
        }

        let mut trimmed = match event.as_object() {
            Some(obj) => obj.clone(),
            None => Map::new(),
        };
        for key in ["date_start", "date_end", "symbols_motifs", "importance", "chapter_context"] {
            trimmed.remove(key);
        }
        kept.push(JsonValue::Object(trimmed));
    }

    let latest_event_date = current_date.map(|d| d.format("%Y-%m-%d").to_string());
    serde_json::json!({
        "meta": {
            "latest_event_date": latest_event_date,
            "total_events": kept.len(),
        },
        "events_by_timeline": {
            "current": { "events": kept }
        }
    })
}

/// Optional multi-stage sanitizer: classifies each (already-filtered) event
/// as `current` (same day or future relative to the max date), `recent`
/// (<=7 days old), or `historical` (>7 days), enabled by config flag.
pub fn classify_timeline(filtered: &JsonValue) -> JsonValue {
    let events = all_events(filtered);
    let current_date = filtered
        .get("meta")
        .and_then(|m| m.get("latest_event_date"))
        .and_then(|v| v.as_str())
        .and_then(parse_date);

    let mut current = Vec::new();
    let mut recent = Vec::new();
    let mut historical = Vec::new();

    for event in events {
        let bucket = match (
            current_date,
            event.get("date_start").and_then(|v| v.as_str()).and_then(parse_date),
        ) {
            (Some(cur), Some(d)) if d >= cur => &mut current,
            (Some(cur), Some(d)) if (cur - d).num_days() <= 7 => &mut recent,
            (Some(_), Some(_)) => &mut historical,
            _ => &mut current,
        };
        bucket.push(event);
    }

    serde_json::json!({
        "meta": filtered.get("meta").cloned().unwrap_or(JsonValue::Null),
        "events_by_timeline": {
            "current": { "events": current },
            "recent_events": { "events": recent },
            "historical": { "events": historical },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(desc: &str, date: &str, importance: &str) -> JsonValue {
        serde_json::json!({
            "description": desc,
            "date_start": date,
            "importance": importance,
            "characters": [],
        })
    }

    #[test]
    fn recap_filtering_keeps_only_high_within_age_window() {
        // Scenario 5: 5 events {high, high, medium, low, high} dated
        // {T, T-3d, T-1d, T-2d, T-40d}, max_event_age_days=30 -> 2 remain.
        let recap = serde_json::json!({
            "events_by_timeline": {
                "current": { "events": [
                    event("a", "2024-06-30", "high"),
                    event("b", "2024-06-27", "high"),
                    event("c", "2024-06-29", "medium"),
                    event("d", "2024-06-28", "low"),
                    event("e", "2024-05-21", "high"),
                ]}
            }
        });

        let filtered = filter_aged_events(&recap, "2024-01-01", 30);
        let events = all_events(&filtered);
        assert_eq!(events.len(), 2);
        for e in &events {
            assert!(e.get("importance").is_none());
            assert!(e.get("date_start").is_none());
        }
        let total_events = filtered["meta"]["total_events"].as_u64().unwrap();
        assert_eq!(total_events, 2);
    }

    #[test]
    fn falls_back_to_story_start_date_when_no_event_dates() {
        let recap = serde_json::json!({
            "events_by_timeline": { "current": { "events": [
                serde_json::json!({"description": "x", "importance": "high"}),
            ]}}
        });
        let filtered = filter_aged_events(&recap, "2024-01-01", 30);
        assert_eq!(filtered["meta"]["total_events"], 1);
    }

    #[test]
    fn classify_timeline_buckets_by_age() {
        let recap = serde_json::json!({
            "meta": {"latest_event_date": "2024-06-30"},
            "events_by_timeline": {"current": {"events": [
                event("today", "2024-06-30", "high"),
                event("recent", "2024-06-25", "high"),
                event("old", "2024-05-01", "high"),
            ]}}
        });
        let classified = classify_timeline(&recap);
        assert_eq!(classified["events_by_timeline"]["current"]["events"].as_array().unwrap().len(), 1);
        assert_eq!(classified["events_by_timeline"]["recent_events"]["events"].as_array().unwrap().len(), 1);
        assert_eq!(classified["events_by_timeline"]["historical"]["events"].as_array().unwrap().len(), 1);
    }
}
