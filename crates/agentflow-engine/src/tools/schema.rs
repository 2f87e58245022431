use serde_json::Value;

use agentflow_core::error::ToolError;
use agentflow_core::types::{ToolDefinition, ToolSpec};

/// String formats the model API accepts as-is.
const SUPPORTED_FORMATS: &[&str] = &["enum", "date-time"];

/// Rewrite a JSON schema so the model API accepts it.
///
/// String properties with an unsupported `format` lose it and the format is
/// mentioned in the description instead. Applying this twice gives the same
/// result as applying it once.
pub fn sanitize_schema(schema: &Value) -> Value {
    let mut out = schema.clone();
    sanitize_in_place(&mut out);
    out
}

fn sanitize_in_place(schema: &mut Value) {
    let Value::Object(obj) = schema else {
        return;
    };

    if obj.get("type").and_then(Value::as_str) == Some("string") {
        let unsupported = obj
            .get("format")
            .and_then(Value::as_str)
            .filter(|f| !SUPPORTED_FORMATS.contains(f))
            .map(str::to_string);
        if let Some(format) = unsupported {
            obj.remove("format");
            let description = match obj.get("description").and_then(Value::as_str) {
                Some(d) if !d.is_empty() => format!("{} (format: {})", d, format),
                _ => format!("format: {}", format),
            };
            obj.insert("description".into(), Value::String(description));
        }
    }

    if let Some(Value::Object(props)) = obj.get_mut("properties") {
        for prop in props.values_mut() {
            sanitize_in_place(prop);
        }
    }

    match obj.get_mut("items") {
        Some(Value::Array(items)) => items.iter_mut().for_each(sanitize_in_place),
        Some(items) => sanitize_in_place(items),
        None => {}
    }

    for key in ["oneOf", "anyOf", "allOf"] {
        if let Some(Value::Array(variants)) = obj.get_mut(key) {
            variants.iter_mut().for_each(sanitize_in_place);
        }
    }
}

/// Validate definitions and map them to the model-facing function format.
pub fn prepare_tools(defs: &[ToolDefinition]) -> Result<Vec<ToolSpec>, ToolError> {
    defs.iter()
        .map(|def| {
            if def.name.trim().is_empty() {
                return Err(ToolError::InvalidTool("tool has an empty name".to_string()));
            }
            if !def.input_schema.is_object() {
                return Err(ToolError::InvalidTool(format!(
                    "{}: input schema must be a JSON object",
                    def.name
                )));
            }
            Ok(ToolSpec::function(
                &def.name,
                &def.description,
                sanitize_schema(&def.input_schema),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested() -> Value {
        json!({
            "type": "object",
            "properties": {
                "email": {"type": "string", "format": "email", "description": "Contact"},
                "when": {"type": "string", "format": "date-time"},
                "tags": {"type": "array", "items": {"type": "string", "format": "uri"}},
                "choice": {"anyOf": [
                    {"type": "string", "format": "uuid"},
                    {"type": "integer", "format": "int32"}
                ]}
            }
        })
    }

    #[test]
    fn unsupported_formats_move_into_description() {
        let out = sanitize_schema(&nested());
        let props = &out["properties"];
        assert!(props["email"].get("format").is_none());
        assert_eq!(props["email"]["description"], "Contact (format: email)");
        assert_eq!(props["when"]["format"], "date-time");
        assert_eq!(props["tags"]["items"]["description"], "format: uri");
        assert!(props["choice"]["anyOf"][0].get("format").is_none());
        // Only string schemas are touched.
        assert_eq!(props["choice"]["anyOf"][1]["format"], "int32");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_schema(&nested());
        let twice = sanitize_schema(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn prepare_rejects_bad_definitions() {
        let empty_name = ToolDefinition {
            name: " ".into(),
            description: String::new(),
            input_schema: json!({"type": "object"}),
        };
        assert_eq!(prepare_tools(&[empty_name]).unwrap_err().code(), "invalid_tool");

        let bad_schema = ToolDefinition {
            name: "x".into(),
            description: String::new(),
            input_schema: json!("object"),
        };
        assert!(prepare_tools(&[bad_schema]).is_err());
    }

    #[test]
    fn prepare_maps_to_function_specs() {
        let def = ToolDefinition {
            name: "_-_-_search_-_-_lookup".into(),
            description: "Find".into(),
            input_schema: nested(),
        };
        let specs = prepare_tools(&[def]).unwrap();
        assert_eq!(specs[0].kind, "function");
        assert_eq!(specs[0].name(), "_-_-_search_-_-_lookup");
        assert!(specs[0].function.parameters["properties"]["email"].get("format").is_none());
    }
}
