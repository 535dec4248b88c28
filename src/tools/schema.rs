//! 参数 schema 校验与决策 JSON Schema 生成
//!
//! validate_arguments 支持工具用到的 JSON Schema 子集：type / properties / required /
//! additionalProperties / enum / pattern / minLength / items / minItems / maxItems /
//! minimum / maximum / anyOf。决策格式的 Schema 由 schemars 生成，拼入 system prompt。

use std::collections::HashMap;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde_json::{json, Map, Value};

use crate::analytics::{CUSTOM_WINDOW_PATTERN, WINDOW_KEYWORDS};

/// 决策格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
enum DecisionFormat {
    /// 调用一个已注册工具
    CallTool {
        /// 工具名，如 analyze_skill_demand、top_skills
        name: String,
        /// 工具参数，需满足该工具的参数 schema
        arguments: HashMap<String, Value>,
    },
    /// 结束循环并给出最终状态
    Finalize {
        /// completed / failed / input_required
        status: String,
        /// 最终响应草稿（reasoning、strengths、required_fields 等）
        payload: HashMap<String, Value>,
    },
}

/// 决策格式的 JSON Schema 字符串
pub fn decision_schema_json() -> String {
    let schema = schema_for!(DecisionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 时间窗口参数的 schema：关键字或 "YYYY-MM-DD to YYYY-MM-DD"
pub fn window_schema() -> Value {
    json!({
        "type": "string",
        "description": "Time window: one of all, 4w, 1m, 3m, 6m, 1y, or \"YYYY-MM-DD to YYYY-MM-DD\"",
        "anyOf": [
            {"enum": WINDOW_KEYWORDS},
            {"pattern": CUSTOM_WINDOW_PATTERN}
        ]
    })
}

/// 名称列表参数的 schema
pub fn names_schema(description: &str, max_items: usize) -> Value {
    json!({
        "type": "array",
        "description": description,
        "items": {"type": "string", "minLength": 1},
        "minItems": 1,
        "maxItems": max_items
    })
}

pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    validate_at("arguments", schema, args)
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn validate_at(path: &str, schema: &Value, value: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(format!("{path}: expected {expected}, got {value}"));
        }
    }

    if let Some(forms) = schema.get("anyOf").and_then(Value::as_array) {
        if !forms.iter().any(|form| validate_at(path, form, value).is_ok()) {
            return Err(format!("{path}: {value} does not match any allowed form"));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{path}: {value} is not one of {}", Value::Array(allowed.clone())));
        }
    }

    match value {
        Value::Object(map) => validate_object(path, schema, map),
        Value::Array(items) => {
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                if (items.len() as u64) < min {
                    return Err(format!("{path}: needs at least {min} item(s)"));
                }
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
                if items.len() as u64 > max {
                    return Err(format!("{path}: at most {max} item(s) allowed"));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_at(&format!("{path}[{i}]"), item_schema, item)?;
                }
            }
            Ok(())
        }
        Value::String(s) => {
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if (s.trim().chars().count() as u64) < min {
                    return Err(format!("{path}: must not be blank"));
                }
            }
            if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
                let re = Regex::new(pattern)
                    .map_err(|e| format!("{path}: invalid pattern in schema: {e}"))?;
                if !re.is_match(s) {
                    return Err(format!("{path}: \"{s}\" does not match {pattern}"));
                }
            }
            Ok(())
        }
        Value::Number(n) => {
            let Some(x) = n.as_f64() else {
                return Ok(());
            };
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if x < min {
                    return Err(format!("{path}: {x} is below minimum {min}"));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if x > max {
                    return Err(format!("{path}: {x} is above maximum {max}"));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_object(path: &str, schema: &Value, map: &Map<String, Value>) -> Result<(), String> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(field) {
                return Err(format!("{path}: missing required field \"{field}\""));
            }
        }
    }
    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (key, value) in map {
        match properties.and_then(|p| p.get(key)) {
            Some(prop_schema) => validate_at(&format!("{path}.{key}"), prop_schema, value)?,
            None if closed => return Err(format!("{path}: unexpected field \"{key}\"")),
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "skills": names_schema("Skill names", 3),
                "window": window_schema(),
                "limit": {"type": "integer", "minimum": 1, "maximum": 50},
                "render_chart": {"type": "boolean"}
            },
            "required": ["skills"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_accepts_keyword_and_custom_windows() {
        let s = schema();
        assert!(validate_arguments(&s, &json!({"skills": ["Python"], "window": "3m"})).is_ok());
        assert!(validate_arguments(
            &s,
            &json!({"skills": ["Python"], "window": "2024-01-01 to 2024-06-30"})
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_unknown_window_keyword() {
        let err = validate_arguments(&schema(), &json!({"skills": ["Python"], "window": "2w"}))
            .unwrap_err();
        assert!(err.contains("arguments.window"));
    }

    #[test]
    fn test_rejects_missing_and_extra_fields() {
        let s = schema();
        assert!(validate_arguments(&s, &json!({})).unwrap_err().contains("missing required"));
        assert!(validate_arguments(&s, &json!({"skills": ["a"], "sql": "DROP"}))
            .unwrap_err()
            .contains("unexpected field"));
    }

    #[test]
    fn test_array_and_number_bounds() {
        let s = schema();
        assert!(validate_arguments(&s, &json!({"skills": []})).is_err());
        assert!(validate_arguments(&s, &json!({"skills": ["a", "b", "c", "d"]})).is_err());
        assert!(validate_arguments(&s, &json!({"skills": ["  "]})).is_err());
        assert!(validate_arguments(&s, &json!({"skills": ["a"], "limit": 0})).is_err());
        assert!(validate_arguments(&s, &json!({"skills": ["a"], "limit": 2.5})).is_err());
        assert!(validate_arguments(&s, &json!({"skills": ["a"], "limit": 20})).is_ok());
    }

    #[test]
    fn test_decision_schema_mentions_both_actions() {
        let schema = decision_schema_json();
        assert!(schema.contains("call_tool"));
        assert!(schema.contains("finalize"));
    }
}
