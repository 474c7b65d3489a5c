use serde_json::Value;

#[derive(Debug, Clone)]
pub struct StructuredOutputValidationResult {
    pub value: Option<Value>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

impl StructuredOutputValidationResult {
    pub fn is_valid(&self) -> bool {
        self.value.is_some() && self.error.is_none()
    }
}

/// Removes markdown code fences models wrap around JSON replies.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

pub fn parse_json_reply(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return None;
    }
    serde_json::from_str(&cleaned).ok()
}

pub fn validate_structured_output(value: Option<Value>, schema: &Value) -> StructuredOutputValidationResult {
    let Some(value) = value else {
        return StructuredOutputValidationResult {
            value: None,
            error: Some("Structured output is missing or invalid JSON.".to_string()),
            errors: vec![],
        };
    };

    let compiled = match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(error) => {
            return StructuredOutputValidationResult {
                value: Some(value),
                error: Some(format!("Failed to compile structured output schema: {}", error)),
                errors: vec![],
            }
        }
    };

    let errors: Vec<String> = compiled
        .validate(&value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let error = (!errors.is_empty()).then(|| "Structured output did not match schema.".to_string());
    StructuredOutputValidationResult {
        value: Some(value),
        error,
        errors,
    }
}
