use serde_json::Value;

use crate::trace::Trace;

/// Resolve a dotted path (`metadata.cost_usd`, `steps.0.name`) against a
/// JSON value. Numeric segments index arrays. The empty path is the root.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// String projection of a trace's output used by content and embedding
/// assertions: a string output is taken verbatim, an object's `message`
/// field wins when it is a string, anything else is serialized to JSON.
pub fn output_text(trace: &Trace) -> String {
    match &trace.output {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            _ => serde_json::to_string(&trace.output).unwrap_or_default(),
        },
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_objects_and_arrays() {
        let value = json!({"metadata": {"cost_usd": 0.03}, "steps": [{"name": "search"}]});
        assert_eq!(
            resolve(&value, "metadata.cost_usd"),
            Some(&json!(0.03))
        );
        assert_eq!(resolve(&value, "steps.0.name"), Some(&json!("search")));
        assert!(resolve(&value, "metadata.missing").is_none());
        assert!(resolve(&value, "steps.7.name").is_none());
    }

    #[test]
    fn empty_path_is_the_root() {
        let value = json!({"a": 1});
        assert_eq!(resolve(&value, ""), Some(&value));
    }

    #[test]
    fn output_text_prefers_the_message_field() {
        let mut trace = Trace::new("t", "a");
        trace.output = json!({"message": "Refund RFD-999 approved", "code": 200});
        assert_eq!(output_text(&trace), "Refund RFD-999 approved");
    }

    #[test]
    fn output_text_serializes_objects_without_message() {
        let mut trace = Trace::new("t", "a");
        trace.output = json!({"status": "ok"});
        assert_eq!(output_text(&trace), r#"{"status":"ok"}"#);
    }

    #[test]
    fn output_text_takes_plain_strings_verbatim() {
        let mut trace = Trace::new("t", "a");
        trace.output = json!("all done");
        assert_eq!(output_text(&trace), "all done");
    }
}
