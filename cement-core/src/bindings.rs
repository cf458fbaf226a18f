//! Wire-level to local type-name bindings.
//!
//! Populated lazily: the first time a wire type is tracked (or, in lenient
//! mode, the first time a push for it arrives) the host resolver is asked
//! for the local name and the answer is cached here.

use std::collections::HashMap;

/// Cached wire type → local name mapping.
#[derive(Debug, Clone, Default)]
pub struct TypeBindings {
    names: HashMap<String, String>,
}

impl TypeBindings {
    /// Create an empty binding table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a wire type to a local name, returning any previous binding.
    pub fn bind(&mut self, wire_type: &str, local_name: &str) -> Option<String> {
        self.names
            .insert(wire_type.to_string(), local_name.to_string())
    }

    /// Look up the local name for a wire type.
    pub fn resolve(&self, wire_type: &str) -> Option<&str> {
        self.names.get(wire_type).map(String::as_str)
    }

    /// Check whether a wire type is bound.
    pub fn is_bound(&self, wire_type: &str) -> bool {
        self.names.contains_key(wire_type)
    }

    /// Number of bound wire types.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_resolve() {
        let mut bindings = TypeBindings::new();
        assert_eq!(bindings.bind("article", "post"), None);

        assert_eq!(bindings.resolve("article"), Some("post"));
        assert!(bindings.is_bound("article"));
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn unbound_type_resolves_to_none() {
        let bindings = TypeBindings::new();
        assert_eq!(bindings.resolve("article"), None);
        assert!(bindings.is_empty());
    }

    #[test]
    fn rebinding_returns_previous() {
        let mut bindings = TypeBindings::new();
        bindings.bind("article", "post");
        assert_eq!(bindings.bind("article", "entry"), Some("post".to_string()));
        assert_eq!(bindings.resolve("article"), Some("entry"));
    }
}
