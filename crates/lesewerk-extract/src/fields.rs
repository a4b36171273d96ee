// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Parsing of language model replies into extracted fields.

use lesewerk_core::ExtractedFields;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Turn a model reply into one entry per requested field, in request order.
///
/// A reply that is not a JSON object maps every field to `None`. List values
/// are normalized so each item is an object; bare items become
/// `{"value": item}`.
pub fn parse_fields(response: &str, fields: &[String]) -> ExtractedFields {
    let body = strip_code_fence(response);

    let object = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            warn!(kind = json_kind(&other), "Model reply is not a JSON object");
            return ExtractedFields::all_missing(fields);
        }
        Err(err) => {
            warn!(%err, preview = %preview(body), "Model reply is not valid JSON");
            return ExtractedFields::all_missing(fields);
        }
    };

    let mut extracted = ExtractedFields::new();
    for field in fields {
        extracted.insert(field.as_str(), normalize(object.get(field)));
    }
    debug!(
        requested = fields.len(),
        found = extracted.iter().filter(|(_, v)| v.is_some()).count(),
        "Fields parsed"
    );
    extracted
}

fn normalize(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(_) => item.clone(),
                    other => Value::Object(Map::from_iter([("value".to_string(), other.clone())])),
                })
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

/// Body of a ```` ```json ```` block, else of a bare ```` ``` ```` block, else
/// the trimmed reply.
fn strip_code_fence(response: &str) -> &str {
    fenced(response, "```json")
        .or_else(|| fenced(response, "```"))
        .unwrap_or_else(|| response.trim())
}

fn fenced<'a>(response: &'a str, marker: &str) -> Option<&'a str> {
    let (_, rest) = response.split_once(marker)?;
    Some(rest.split("```").next().unwrap_or(rest).trim())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(body: &str) -> String {
    body.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn plain_json_reply() {
        let parsed = parse_fields(
            r#"{"invoice": "INV-7", "total": 12.5, "extra": 1}"#,
            &fields(&["invoice", "total"]),
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("invoice"), Some(&json!("INV-7")));
        assert_eq!(parsed.get("total"), Some(&json!(12.5)));
        assert!(!parsed.contains("extra"));
    }

    #[test]
    fn fenced_json_reply() {
        let reply = "Here you go:\n```json\n{\"name\": \"Ada\"}\n```\nAnything else?";
        let parsed = parse_fields(reply, &fields(&["name"]));
        assert_eq!(parsed.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn bare_fence_reply() {
        let parsed = parse_fields("```\n{\"name\": \"Ada\"}\n```", &fields(&["name"]));
        assert_eq!(parsed.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn missing_and_null_fields_are_none() {
        let parsed = parse_fields(r#"{"a": null}"#, &fields(&["a", "b"]));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("a"), None);
        assert_eq!(parsed.get("b"), None);
        assert!(parsed.contains("b"));
        assert!(parsed.is_all_missing());
    }

    #[test]
    fn list_items_are_wrapped() {
        let reply = r#"{"owners": ["Ann", {"value": "Bob", "details": {"percentage": "40%"}}, 3]}"#;
        let parsed = parse_fields(reply, &fields(&["owners"]));
        assert_eq!(
            parsed.get("owners"),
            Some(&json!([
                {"value": "Ann"},
                {"value": "Bob", "details": {"percentage": "40%"}},
                {"value": 3}
            ]))
        );
    }

    #[test]
    fn unparseable_reply_maps_everything_to_none() {
        let names = fields(&["a", "b"]);
        assert!(parse_fields("I could not find anything.", &names).is_all_missing());
        assert!(parse_fields("[1, 2]", &names).is_all_missing());
        assert_eq!(parse_fields("```json\n{broken\n```", &names).len(), 2);
    }

    #[test]
    fn field_order_follows_request() {
        let parsed = parse_fields(r#"{"b": 1, "a": 2}"#, &fields(&["b", "a"]));
        let order: Vec<&str> = parsed.iter().map(|(name, _)| name).collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
