//! Post-conversation reflection: how one participant now sees the other.

use super::generator::{StructuredTask, TextGenerator};
use super::prompts::REFLECTION_SYSTEM_PROMPT;
use tracing::{debug, warn};

/// Feeling change used when the reflection call itself fails.
pub const DEFAULT_REFLECTION_DELTA: f32 = 0.05;
pub const DEFAULT_REFLECTION_SUMMARY: &str = "Had a conversation";

/// Per-reflection cap on the feeling change.
const MAX_REFLECTION_DELTA: f32 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub summary: String,
    pub feeling_delta: f32,
    pub observation: Option<String>,
}

impl Reflection {
    /// The fallback used when no reflection could be generated.
    pub fn fallback() -> Self {
        Self {
            summary: DEFAULT_REFLECTION_SUMMARY.to_string(),
            feeling_delta: DEFAULT_REFLECTION_DELTA,
            observation: None,
        }
    }
}

/// Read the `SUMMARY:` / `FEELING:` / `OBSERVATION:` line format.
///
/// Missing lines fall back to a generic summary and no feeling change.
pub fn parse_reflection(text: &str) -> Reflection {
    let mut reflection = Reflection {
        summary: DEFAULT_REFLECTION_SUMMARY.to_string(),
        feeling_delta: 0.0,
        observation: None,
    };

    for line in text.lines().map(str::trim) {
        if let Some(rest) = strip_label(line, "SUMMARY:") {
            if !rest.is_empty() {
                reflection.summary = rest.to_string();
            }
        } else if let Some(rest) = strip_label(line, "FEELING:") {
            match rest.trim_start_matches('+').parse::<f32>() {
                Ok(value) if value.is_finite() => {
                    reflection.feeling_delta = value.clamp(-MAX_REFLECTION_DELTA, MAX_REFLECTION_DELTA)
                }
                _ => debug!(value = rest, "unreadable reflection feeling"),
            }
        } else if let Some(rest) = strip_label(line, "OBSERVATION:") {
            let lower = rest.to_lowercase();
            let empty = rest.is_empty()
                || lower.starts_with("nothing notable")
                || lower == "none"
                || lower == "n/a";
            if !empty {
                reflection.observation = Some(rest.to_string());
            }
        }
    }
    reflection
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        Some(line[label.len()..].trim())
    } else {
        None
    }
}

/// Ask the generator for a reflection. Failures yield [`Reflection::fallback`].
pub async fn reflect(generator: &dyn TextGenerator, prompt: &str) -> Reflection {
    match generator
        .generate_structured(StructuredTask::Reflection, REFLECTION_SYSTEM_PROMPT, prompt)
        .await
    {
        Ok(text) => parse_reflection(&text),
        Err(e) => {
            warn!(error = %e, "reflection call failed, using fallback");
            Reflection::fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[test]
    fn test_parse_full_reflection() {
        let reflection = parse_reflection(
            "SUMMARY: Bought bread from Grace\nFEELING: +0.2\nOBSERVATION: Grace haggles hard",
        );
        assert_eq!(reflection.summary, "Bought bread from Grace");
        assert_eq!(reflection.feeling_delta, 0.2);
        assert_eq!(reflection.observation.as_deref(), Some("Grace haggles hard"));
    }

    #[test]
    fn test_feeling_is_clamped() {
        assert_eq!(parse_reflection("FEELING: 0.9").feeling_delta, 0.3);
        assert_eq!(parse_reflection("FEELING: -2").feeling_delta, -0.3);
    }

    #[test]
    fn test_missing_lines_use_defaults() {
        let reflection = parse_reflection("They were nice enough.");
        assert_eq!(reflection.summary, DEFAULT_REFLECTION_SUMMARY);
        assert_eq!(reflection.feeling_delta, 0.0);
        assert!(reflection.observation.is_none());
    }

    #[test]
    fn test_empty_observations_dropped() {
        for text in ["OBSERVATION: nothing notable", "OBSERVATION: None", "observation: N/A"] {
            assert!(parse_reflection(text).observation.is_none(), "{text}");
        }
    }

    #[tokio::test]
    async fn test_failed_call_uses_fallback() {
        let generator = ScriptedGenerator::new().failing_structured(StructuredTask::Reflection);
        let reflection = reflect(&generator, "prompt").await;
        assert_eq!(reflection, Reflection::fallback());
        assert_eq!(reflection.feeling_delta, DEFAULT_REFLECTION_DELTA);
        assert_eq!(reflection.summary, "Had a conversation");
    }
}
