use chrono::{DateTime, Utc};
use serde_json::{Value, json};

pub const PROCESSED_BY: &str = "api-gateway";

/// Shape a backend body before it goes back to the caller.
///
/// Successful bodies that look like a service payload (`status` or `data` present)
/// get a `gateway_metadata` block. Error bodies always end up with
/// `status: "error"` and a `message`; a bare `error` field is renamed to `message`.
/// Non-object bodies pass through untouched.
pub fn transform_response(service: &str, status: u16, body: Value, timestamp: DateTime<Utc>) -> Value {
    let Value::Object(mut fields) = body else {
        return body;
    };

    if (200..400).contains(&status) {
        if fields.contains_key("status") || fields.contains_key("data") {
            fields.insert(
                "gateway_metadata".to_string(),
                json!({
                    "processed_by": PROCESSED_BY,
                    "timestamp": timestamp.to_rfc3339(),
                }),
            );
        }
    } else if status >= 400 {
        fields.entry("status").or_insert_with(|| json!("error"));
        if !fields.contains_key("message") {
            let message = fields
                .remove("error")
                .unwrap_or_else(|| json!(format!("An error occurred with {service} service.")));
            fields.insert("message".to_string(), message);
        }
    }

    Value::Object(fields)
}
