//! Validate-and-coerce boundary between decoded model JSON and [`EditSet`].
//!
//! Entry-level noise (a number inside `remove`, a replace rule without `to`)
//! is dropped silently. Container-level shape errors (`remove` being a string,
//! `conclusion` being a number) reject the whole payload: guessing the intended
//! structure could invent clinical content.

use serde_json::{Map, Value};

use super::types::{Conclusion, ConclusionBlock, ConfidenceScores, EditSet, ReplaceRule};
use super::EditSetError;

/// Parse an extracted JSON string into a validated edit set.
pub fn parse_edit_set(json_text: &str) -> Result<EditSet, EditSetError> {
    let value: Value =
        serde_json::from_str(json_text).map_err(|e| EditSetError::JsonDecode(e.to_string()))?;
    edit_set_from_value(&value)
}

/// Coerce an already-decoded JSON value into an edit set.
pub fn edit_set_from_value(value: &Value) -> Result<EditSet, EditSetError> {
    let obj = value.as_object().ok_or_else(|| {
        EditSetError::Malformed(format!("top level must be an object, got {}", type_name(value)))
    })?;

    Ok(EditSet {
        remove: string_list(obj, "remove")?,
        replace: replace_rules(obj)?,
        add_findings: string_list(obj, "add_findings")?,
        lesiometro_missing: string_list(obj, "lesiometro_missing")?,
        confidence_scores: confidence_scores(obj)?,
        conclusion: conclusion(obj)?,
    })
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>, EditSetError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(other) => Err(EditSetError::Malformed(format!(
            "`{key}` must be a list, got {}",
            type_name(other)
        ))),
    }
}

fn replace_rules(obj: &Map<String, Value>) -> Result<Vec<ReplaceRule>, EditSetError> {
    match obj.get("replace") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| {
                let rule = item.as_object()?;
                Some(ReplaceRule {
                    from: rule.get("from")?.as_str()?.to_string(),
                    to: rule.get("to")?.as_str()?.to_string(),
                })
            })
            .collect()),
        Some(other) => Err(EditSetError::Malformed(format!(
            "`replace` must be a list, got {}",
            type_name(other)
        ))),
    }
}

fn confidence_scores(obj: &Map<String, Value>) -> Result<ConfidenceScores, EditSetError> {
    let mut scores = ConfidenceScores::new();
    match obj.get("confidence_scores") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, value) in map {
                if let Some(score) = value.as_f64() {
                    scores.insert(key.clone(), (score as f32).clamp(0.0, 1.0));
                }
            }
        }
        Some(other) => {
            return Err(EditSetError::Malformed(format!(
                "`confidence_scores` must be an object, got {}",
                type_name(other)
            )))
        }
    }
    Ok(scores)
}

fn conclusion(obj: &Map<String, Value>) -> Result<Conclusion, EditSetError> {
    match obj.get("conclusion") {
        None | Some(Value::Null) => Ok(Conclusion::Absent),
        Some(Value::String(text)) => Ok(Conclusion::Text(text.clone())),
        Some(Value::Object(block)) => {
            let lesiometro_missing = match block.get("lesiometro_missing") {
                None | Some(Value::Null) => None,
                Some(_) => Some(string_list(block, "lesiometro_missing")?),
            };
            Ok(Conclusion::Structured(ConclusionBlock {
                positives: string_list(block, "positives")?,
                impression: string_list(block, "impression")?,
                ddx: string_list(block, "ddx")?,
                recommendations: string_list(block, "recommendations")?,
                lesiometro_missing,
            }))
        }
        Some(other) => Err(EditSetError::Malformed(format!(
            "`conclusion` must be absent, a string or an object, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
