//! Conversions between CEL values and JSON values

use cel_interpreter::Value as CelValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Convert a CEL Value to a JSON Value
pub fn cel_value_to_json(value: &CelValue) -> serde_json::Value {
    match value {
        CelValue::Int(i) => serde_json::json!(i),
        CelValue::UInt(u) => serde_json::json!(u),
        CelValue::Float(f) => serde_json::json!(f),
        CelValue::Bool(b) => serde_json::json!(b),
        CelValue::String(s) => serde_json::json!(s.as_ref()),
        CelValue::Bytes(b) => serde_json::json!(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b.as_ref()
        )),
        CelValue::List(list) => {
            serde_json::Value::Array(list.iter().map(cel_value_to_json).collect())
        }
        CelValue::Map(map) => {
            let object: serde_json::Map<String, serde_json::Value> = map
                .map
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        cel_interpreter::objects::Key::Int(i) => i.to_string(),
                        cel_interpreter::objects::Key::Uint(u) => u.to_string(),
                        cel_interpreter::objects::Key::Bool(b) => b.to_string(),
                        cel_interpreter::objects::Key::String(s) => s.to_string(),
                    };
                    (key, cel_value_to_json(v))
                })
                .collect();
            serde_json::Value::Object(object)
        }
        CelValue::Null => serde_json::Value::Null,
        CelValue::Timestamp(ts) => serde_json::json!(ts.to_rfc3339()),
        CelValue::Duration(d) => serde_json::json!(d.num_milliseconds() as f64 / 1000.0),
        CelValue::Function(name, _) => serde_json::json!(format!("<function: {}>", name)),
        #[allow(unreachable_patterns)]
        _ => serde_json::Value::Null,
    }
}

/// Convert a JSON Value to a CEL Value
///
/// Integers stay integers; every other number becomes a float.
pub fn json_to_cel_value(value: &serde_json::Value) -> CelValue {
    match value {
        serde_json::Value::Null => CelValue::Null,
        serde_json::Value::Bool(b) => CelValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => CelValue::Int(i),
            None => CelValue::Float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => CelValue::String(Arc::new(s.clone())),
        serde_json::Value::Array(items) => {
            let list: Vec<CelValue> = items.iter().map(json_to_cel_value).collect();
            CelValue::List(list.into())
        }
        serde_json::Value::Object(object) => {
            let map: HashMap<String, CelValue> = object
                .iter()
                .map(|(k, v)| (k.clone(), json_to_cel_value(v)))
                .collect();
            CelValue::Map(map.into())
        }
    }
}
