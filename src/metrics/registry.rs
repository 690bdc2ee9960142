use super::parsers;
use super::MetricParser;
use crate::error::{DebtError, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub type ParserCtor = fn() -> Box<dyn MetricParser>;

#[derive(Clone, Copy)]
struct RegistryEntry {
    default: bool,
    build: ParserCtor,
}

/// Which registered parsers to instantiate.
#[derive(Debug, Clone, Default)]
pub struct ParserSelection {
    /// Registry names enabled in addition to the defaults.
    pub extra: Vec<String>,
    pub skip_defaults: bool,
}

/// Explicit mapping from parser name to constructor.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every parser that ships with debtmeter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        parsers::register_builtins(&mut registry);
        registry
    }

    /// Register `build` under `name`. A later registration replaces an earlier one.
    pub fn register(&mut self, name: &str, default: bool, build: ParserCtor) {
        if self
            .entries
            .insert(name.to_string(), RegistryEntry { default, build })
            .is_some()
        {
            warn!(parser = name, "replacing previously registered metric parser");
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn default_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.default)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Instantiate the selected parsers, defaults first, each at most once.
    pub fn build(&self, selection: &ParserSelection) -> Result<Vec<Box<dyn MetricParser>>> {
        let mut names: Vec<&str> = if selection.skip_defaults {
            Vec::new()
        } else {
            self.default_names()
        };

        for extra in &selection.extra {
            if !self.entries.contains_key(extra) {
                return Err(DebtError::UnknownParser(extra.clone()));
            }
            if !names.contains(&extra.as_str()) {
                names.push(extra.as_str());
            }
        }

        debug!(parsers = ?names, "building metric parsers");
        Ok(names
            .into_iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| (entry.build)())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_split_into_defaults_and_optional() {
        let registry = ParserRegistry::with_builtins();
        let defaults = registry.default_names();
        assert!(defaults.contains(&"lines_of_code"));
        assert!(defaults.contains(&"python_imports"));
        assert!(!defaults.contains(&"file_count"));
        assert!(registry.names().contains(&"file_count"));
    }

    #[test]
    fn build_selects_defaults_plus_extras() {
        let registry = ParserRegistry::with_builtins();
        let built = registry
            .build(&ParserSelection {
                extra: vec!["file_count".to_string(), "todo".to_string()],
                skip_defaults: false,
            })
            .unwrap();
        let names: Vec<&str> = built.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), registry.default_names().len() + 1);
        assert_eq!(names.last(), Some(&"file_count"));
    }

    #[test]
    fn build_can_skip_defaults() {
        let registry = ParserRegistry::with_builtins();
        let built = registry
            .build(&ParserSelection {
                extra: vec!["todo".to_string()],
                skip_defaults: true,
            })
            .unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].name(), "todo");
    }

    #[test]
    fn unknown_extra_is_rejected() {
        let registry = ParserRegistry::with_builtins();
        let err = registry
            .build(&ParserSelection {
                extra: vec!["nope".to_string()],
                skip_defaults: false,
            })
            .err()
            .unwrap();
        assert!(matches!(err, DebtError::UnknownParser(name) if name == "nope"));
    }
}
