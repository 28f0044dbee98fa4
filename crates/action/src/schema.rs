use jsonschema::{Draft, JSONSchema};
use serde_json::Value as Json;

use crate::ActionError;

/// Check `instance` against a Draft 7 schema; every violation ends up in the error text.
pub fn validate_input(schema: &Json, instance: &Json) -> Result<(), ActionError> {
    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| ActionError::Schema(format!("compiling input schema: {}", e)))?;
    let result = compiled.validate(instance);
    if let Err(errors) = result {
        let issues: Vec<String> = errors
            .map(|err| {
                let path = err.instance_path.to_string();
                if path.is_empty() { err.to_string() } else { format!("{}: {}", path, err) }
            })
            .collect();
        return Err(ActionError::InvalidInput(issues.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Json {
        json!({
            "type": "object",
            "required": ["patchData"],
            "properties": { "patchData": { "description": "anything" } }
        })
    }

    #[test]
    fn accepts_any_patch_data_shape() {
        for v in [json!({}), json!([]), json!("x"), json!(1), Json::Null] {
            validate_input(&schema(), &json!({ "patchData": v })).expect("valid");
        }
    }

    #[test]
    fn reports_missing_required_property() {
        let err = validate_input(&schema(), &json!({ "other": 1 })).unwrap_err();
        match err {
            ActionError::InvalidInput(msg) => assert!(msg.contains("patchData"), "msg={}", msg),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_non_object_input() {
        assert!(matches!(validate_input(&schema(), &json!([1, 2])), Err(ActionError::InvalidInput(_))));
    }

    #[test]
    fn broken_schema_is_a_schema_error() {
        let bad = json!({ "type": 12 });
        assert!(matches!(validate_input(&bad, &json!({})), Err(ActionError::Schema(_))));
    }
}
