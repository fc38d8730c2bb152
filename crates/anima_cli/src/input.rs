//! One stdin line, parsed into something to do.
//!
//! Plain text is a request. A JSON object either carries a request
//! (`{"text": ..., "attributes": {...}}`) or an influence event
//! (`{"influence": {"deltas": {"fear": 0.4}, "intensity": 0.8, "duration_secs": 30}}`).

use anima_core::{InfluenceEvent, RequestContext};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug)]
pub enum Command {
    Request(RequestContext),
    Influence(InfluenceEvent),
    Snapshot,
    Quit,
    Empty,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonLine {
    text: Option<String>,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    influence: Option<InfluenceLine>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InfluenceLine {
    #[serde(default = "default_source")]
    source: String,
    deltas: BTreeMap<String, f32>,
    intensity: f32,
    duration_secs: f64,
    decay_override: Option<f32>,
}

fn default_source() -> String {
    "user".to_string()
}

pub fn parse_line(line: &str) -> Result<Command> {
    let trimmed = line.trim();
    match trimmed {
        "" => return Ok(Command::Empty),
        "quit" | "exit" => return Ok(Command::Quit),
        "snapshot" => return Ok(Command::Snapshot),
        _ => {}
    }
    if !trimmed.starts_with('{') {
        return Ok(Command::Request(RequestContext::new(trimmed)));
    }

    let parsed: JsonLine = serde_json::from_str(trimmed).context("Invalid JSON input line")?;
    match (parsed.text, parsed.influence) {
        (Some(text), None) => {
            let ctx = parsed
                .attributes
                .into_iter()
                .fold(RequestContext::new(text), |ctx, (k, v)| ctx.with_attribute(k, v));
            Ok(Command::Request(ctx))
        }
        (None, Some(influence)) => {
            let duration = Duration::try_from_secs_f64(influence.duration_secs)
                .context("duration_secs must be a non-negative number")?;
            let deltas: Vec<(&str, f32)> = influence
                .deltas
                .iter()
                .map(|(name, delta)| (name.as_str(), *delta))
                .collect();
            let mut event =
                InfluenceEvent::from_named(influence.source, &deltas, influence.intensity, duration)?;
            event.decay_override = influence.decay_override;
            Ok(Command::Influence(event))
        }
        (Some(_), Some(_)) => bail!("A line carries either `text` or `influence`, not both"),
        (None, None) => bail!("Expected `text` or `influence`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anima_core::Dimension;

    #[test]
    fn test_plain_text_is_request() {
        match parse_line("  how are you?  ").unwrap() {
            Command::Request(ctx) => assert_eq!(ctx.text, "how are you?"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse_line("").unwrap(), Command::Empty));
        assert!(matches!(parse_line("quit").unwrap(), Command::Quit));
        assert!(matches!(parse_line("snapshot").unwrap(), Command::Snapshot));
    }

    #[test]
    fn test_json_request_with_attributes() {
        let cmd = parse_line(r#"{"text": "hi", "attributes": {"channel": "cli"}}"#).unwrap();
        match cmd {
            Command::Request(ctx) => {
                assert_eq!(ctx.text, "hi");
                assert_eq!(ctx.attributes["channel"], "cli");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_json_influence() {
        let cmd = parse_line(
            r#"{"influence": {"deltas": {"fear": 0.4, "curiosity": -0.2}, "intensity": 0.8, "duration_secs": 30}}"#,
        )
        .unwrap();
        match cmd {
            Command::Influence(event) => {
                assert_eq!(event.source, "user");
                assert_eq!(event.deltas[&Dimension::Fear], 0.4);
                assert_eq!(event.duration, Duration::from_secs(30));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(parse_line(r#"{"influence": {"deltas": {"nope": 0.4}, "intensity": 1, "duration_secs": 1}}"#).is_err());
        assert!(parse_line(r#"{"text": "a", "influence": {"deltas": {}, "intensity": 1, "duration_secs": 1}}"#).is_err());
        assert!(parse_line(r#"{"colour": "red"}"#).is_err());
        assert!(parse_line("{not json").is_err());
    }
}
