use callpipe_frame::Value;
use serde_json::{json, Map, Number, Value as Json};

/// Parse a command-line argument as JSON, falling back to a plain string.
pub fn parse_arg(raw: &str) -> Value {
    match serde_json::from_str::<Json>(raw) {
        Ok(json) => from_json(json),
        Err(_) => Value::Str(raw.to_string()),
    }
}

pub fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => number_to_value(&n),
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        Json::Object(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        ),
    }
}

fn number_to_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else if let Some(u) = n.as_u64() {
        Value::UInt(u)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Render a value as JSON. Byte arrays become `{"bytes": "<hex>"}` and
/// non-finite floats become `null`.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s.clone()),
        Value::Bytes(raw) => json!({ "bytes": hex::encode(raw) }),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => {
            let mut fields = Map::new();
            for (key, value) in entries {
                fields.insert(key.clone(), to_json(value));
            }
            Json::Object(fields)
        }
    }
}
