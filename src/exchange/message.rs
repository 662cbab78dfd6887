use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A message carried by an exchange: body, headers and the fault flag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message body
    pub body: Value,

    /// Message headers
    #[serde(default)]
    pub headers: HashMap<String, Value>,

    /// Set when the message represents a fault reply rather than a normal one
    #[serde(default)]
    pub fault: bool,
}

impl Message {
    /// Create a message with the given body and no headers
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Create a fault message
    pub fn fault(body: impl Into<Value>) -> Self {
        Self {
            body: body.into(),
            fault: true,
            ..Default::default()
        }
    }

    /// Builder-style header setter
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    /// Body as a string slice, if the body is a JSON string
    pub fn body_as_str(&self) -> Option<&str> {
        self.body.as_str()
    }

    /// Body rendered as text: strings verbatim, null as empty, anything else as JSON
    pub fn body_as_string(&self) -> String {
        value_to_string(&self.body)
    }
}

/// Render a value as text the way expressions and URIs expect it
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_headers() {
        let mut message = Message::new("hello").with_header("a", 1);
        message.set_header("b", "two");

        assert_eq!(message.header("a"), Some(&json!(1)));
        assert_eq!(message.remove_header("b"), Some(json!("two")));
        assert!(message.header("b").is_none());
        assert!(!message.fault);
    }

    #[test]
    fn test_body_as_string() {
        assert_eq!(Message::new("World").body_as_string(), "World");
        assert_eq!(Message::new(json!(42)).body_as_string(), "42");
        assert_eq!(Message::default().body_as_string(), "");
        assert_eq!(Message::new(json!({"k": "v"})).body_as_string(), r#"{"k":"v"}"#);
    }

    #[test]
    fn test_fault_message() {
        let message = Message::fault("bad request");
        assert!(message.fault);
        assert_eq!(message.body_as_str(), Some("bad request"));
    }
}
