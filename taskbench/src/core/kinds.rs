//! Task-kind registry: maps a kind identifier to its default-name rule.
//!
//! Default names are resolved through this table rather than from the Rust
//! type, so plugins decide how their task kinds are named.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::naming::decapitalize;

/// How a task kind derives a name when registration omits one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultNameRule {
    /// Simple name with its first character lower-cased (`HelmLint` -> `helmLint`).
    Decapitalized,
    /// Always use this name.
    Fixed(String),
}

/// A registered task kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSpec {
    /// Identifier used by task types to refer to the kind (e.g. `HelmLint`).
    pub id: String,
    /// Human-facing simple name the default name is derived from.
    pub simple_name: String,
    pub rule: DefaultNameRule,
}

impl KindSpec {
    /// Kind whose id doubles as its simple name, named by [`DefaultNameRule::Decapitalized`].
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            simple_name: id.clone(),
            id,
            rule: DefaultNameRule::Decapitalized,
        }
    }

    pub fn with_rule(mut self, rule: DefaultNameRule) -> Self {
        self.rule = rule;
        self
    }

    /// Resolve the name used when registration omits one.
    pub fn default_name(&self) -> String {
        match &self.rule {
            DefaultNameRule::Decapitalized => decapitalize(&self.simple_name),
            DefaultNameRule::Fixed(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KindError {
    #[error("task kind `{0}` is already registered")]
    Duplicate(String),
}

/// Lookup table of task kinds known to a project.
#[derive(Debug, Clone, Default)]
pub struct TaskKinds {
    kinds: BTreeMap<String, KindSpec>,
}

impl TaskKinds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with built-in kinds; a later spec with the same id wins.
    pub fn seeded(specs: impl IntoIterator<Item = KindSpec>) -> Self {
        Self {
            kinds: specs
                .into_iter()
                .map(|spec| (spec.id.clone(), spec))
                .collect(),
        }
    }

    /// Register a kind. Registering the same id twice is an error.
    pub fn register(&mut self, spec: KindSpec) -> Result<(), KindError> {
        if self.kinds.contains_key(&spec.id) {
            return Err(KindError::Duplicate(spec.id));
        }
        self.kinds.insert(spec.id.clone(), spec);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&KindSpec> {
        self.kinds.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.kinds.contains_key(id)
    }

    /// Default task name for `id`, or `None` if the kind is unknown.
    pub fn default_name(&self, id: &str) -> Option<String> {
        self.kinds.get(id).map(KindSpec::default_name)
    }

    /// Registered kind ids in lexicographic order.
    pub fn ids(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }
}
