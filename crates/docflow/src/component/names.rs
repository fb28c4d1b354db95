//! Component naming.
//!
//! Authored names are global. Components generated by a composite are named
//! under their parent (`s/3`, `r/2/v`) so the same expansion always produces
//! the same names. Unnamed authored components get `_<type><n>`.

use crate::engine::arena::ComponentId;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct NameRegistry {
    by_name: FxHashMap<String, ComponentId>,
    counters: FxHashMap<String, usize>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a name; false when it is already taken.
    pub fn register(&mut self, name: &str, id: ComponentId) -> bool {
        if self.by_name.contains_key(name) {
            return false;
        }
        self.by_name.insert(name.to_string(), id);
        true
    }

    pub fn unregister(&mut self, name: &str, id: ComponentId) {
        if self.by_name.get(name) == Some(&id) {
            self.by_name.remove(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// Next free `_<type><n>` name.
    pub fn unnamed(&mut self, component_type: &str) -> String {
        loop {
            let counter = self.counters.entry(component_type.to_string()).or_default();
            *counter += 1;
            let name = format!("_{component_type}{counter}");
            if !self.by_name.contains_key(&name) {
                return name;
            }
        }
    }

    /// Resolve `reference` as seen from a component whose named ancestors,
    /// innermost first, are `scopes`: `<scope>/<reference>` wins over the
    /// global name.
    pub fn lookup_scoped<'a>(
        &self,
        scopes: impl IntoIterator<Item = &'a str>,
        reference: &str,
    ) -> Option<ComponentId> {
        for scope in scopes {
            if let Some(id) = self.get(&format!("{scope}/{reference}")) {
                return Some(id);
            }
        }
        self.get(reference)
    }
}

/// Name of a generated component: `local` under `parent`, or positional.
pub fn generated_name(parent: &str, local: Option<&str>, component_type: &str, position: usize) -> String {
    match local {
        Some(local) => format!("{parent}/{local}"),
        None => format!("{parent}/_{component_type}{}", position + 1),
    }
}

/// Name of the `index`-th replacement of a composite.
pub fn replacement_name(composite: &str, local: Option<&str>, index: usize) -> String {
    match local {
        Some(local) => format!("{composite}/{local}"),
        None => format!("{composite}/{}", index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> ComponentId {
        ComponentId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn scoped_lookup_prefers_inner_scope() {
        let mut names = NameRegistry::new();
        names.register("v", id(1));
        names.register("r/2/v", id(2));
        assert_eq!(names.lookup_scoped(["r/2/_number1", "r/2", "r"], "v"), Some(id(2)));
        assert_eq!(names.lookup_scoped(["r/1"], "v"), Some(id(1)));
        assert_eq!(names.lookup_scoped([], "w"), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut names = NameRegistry::new();
        assert!(names.register("n", id(1)));
        assert!(!names.register("n", id(2)));
        names.unregister("n", id(2));
        assert_eq!(names.get("n"), Some(id(1)));
    }

    #[test]
    fn unnamed_counter_skips_taken_names() {
        let mut names = NameRegistry::new();
        names.register("_number1", id(1));
        assert_eq!(names.unnamed("number"), "_number2");
        assert_eq!(names.unnamed("math"), "_math1");
    }

    #[test]
    fn generated_names_are_positional() {
        assert_eq!(replacement_name("s", None, 2), "s/3");
        assert_eq!(generated_name("r/1", Some("v"), "math", 0), "r/1/v");
        assert_eq!(generated_name("r/1", None, "number", 1), "r/1/_number2");
    }
}
