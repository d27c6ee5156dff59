use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutable key/value store scoped to one flow execution.
///
/// Values are JSON scalars. Structured data (lists, objects) is expected to
/// be serialized into a single string value by whoever writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    data: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a Context from initial data.
    pub fn from_map(data: HashMap<String, Value>) -> Self {
        Self { data }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value rendered as text, if it is a string, number or boolean.
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Set a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Remove a key. Returns true iff it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let mut ctx = Context::new();
        ctx.set("name", "Alice");
        assert_eq!(ctx.get("name"), Some(&Value::from("Alice")));
        assert_eq!(ctx.get_text("name").as_deref(), Some("Alice"));
        assert!(ctx.has("name"));
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let mut ctx = Context::new();
        ctx.set("k", "v1");
        ctx.set("k", "v2");
        assert_eq!(ctx.get_text("k").as_deref(), Some("v2"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_delete_reports_existence() {
        let mut ctx = Context::new();
        ctx.set("k", "v");
        assert!(ctx.delete("k"));
        assert!(!ctx.has("k"));
        assert!(!ctx.delete("k"));
    }

    #[test]
    fn test_clear() {
        let mut ctx = Context::new();
        ctx.set("a", "1");
        ctx.set("b", "2");
        ctx.clear();
        assert!(ctx.is_empty());
        assert!(!ctx.has("a"));
    }

    #[test]
    fn test_get_text_scalars_only() {
        let mut ctx = Context::new();
        ctx.set("n", 42);
        ctx.set("flag", true);
        ctx.set("list", serde_json::json!(["a", "b"]));
        ctx.set("nothing", Value::Null);

        assert_eq!(ctx.get_text("n").as_deref(), Some("42"));
        assert_eq!(ctx.get_text("flag").as_deref(), Some("true"));
        assert_eq!(ctx.get_text("list"), None);
        assert_eq!(ctx.get_text("nothing"), None);
    }

    #[test]
    fn test_from_map() {
        let mut map = HashMap::new();
        map.insert("topic".into(), serde_json::json!("AI"));
        let ctx = Context::from_map(map);
        assert_eq!(ctx.get_text("topic").as_deref(), Some("AI"));
    }
}
