//! Canned weather lookup used to demonstrate tool calling.

use serde_json::{Value, json};

pub const DESCRIPTION: &str = "Get the current weather in a given location";

pub fn parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "location": {
                "type": "string",
                "description": "The city and state, e.g. San Francisco, CA"
            },
            "unit": {"type": "string", "enum": ["celsius", "fahrenheit"]}
        },
        "required": ["location"]
    })
}

/// Look up the weather for `location`.
///
/// Known cities report in their local unit regardless of `unit`; anything
/// else echoes the location back with an unknown temperature.
pub fn get_current_weather(location: &str, _unit: Option<&str>) -> Value {
    let needle = location.to_lowercase();

    if needle.contains("paris") {
        json!({"location": "Paris", "temperature": "22", "unit": "celsius"})
    } else if needle.contains("london") {
        json!({"location": "London", "temperature": "18", "unit": "celsius"})
    } else if needle.contains("new york") {
        json!({"location": "New York", "temperature": "72", "unit": "fahrenheit"})
    } else {
        json!({"location": location, "temperature": "unknown"})
    }
}
