//! Built-in providers
//!
//! Each provider owns one top-level section of the manifest and turns it
//! into steps. Registration order decides which provider claims a step ID
//! first when two of them collide.

pub mod brew;
pub mod exec;
pub mod symlink;

use anyhow::{Result, bail};
use serde_json::Value;
use stepgraph::{Compiler, Manifest};

use crate::config::type_name;

pub use brew::BrewProvider;
pub use exec::ExecProvider;
pub use symlink::SymlinkProvider;

/// Compiler with every built-in provider registered
pub fn compiler() -> Compiler {
    Compiler::new()
        .with_provider(BrewProvider)
        .with_provider(SymlinkProvider)
        .with_provider(ExecProvider)
}

/// Require a section entry to be a table
pub(crate) fn section_entry<'a>(section: &str, name: &str, entry: &'a Value) -> Result<&'a Manifest> {
    match entry {
        Value::Object(map) => Ok(map),
        other => bail!("{section}.{name}: expected a table, found {}", type_name(other)),
    }
}

/// Required string field of a section entry
pub(crate) fn string_field<'a>(
    section: &str,
    name: &str,
    entry: &'a Manifest,
    field: &str,
) -> Result<&'a str> {
    match entry.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) => bail!("{section}.{name}: field {field:?} is empty"),
        Some(other) => bail!(
            "{section}.{name}: field {field:?} must be a string, found {}",
            type_name(other)
        ),
        None => bail!("{section}.{name}: missing string field {field:?}"),
    }
}

/// Optional array-of-strings field; absent means empty
///
/// `label` prefixes error messages, e.g. `brew` or `exec.rustup`.
pub(crate) fn string_list(label: &str, table: &Manifest, key: &str) -> Result<Vec<String>> {
    match table.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::String(s) => Ok(s.clone()),
                other => bail!(
                    "{label}.{key}[{i}]: expected a string, found {}",
                    type_name(other)
                ),
            })
            .collect(),
        Some(other) => bail!(
            "{label}.{key}: expected an array of strings, found {}",
            type_name(other)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(value: Value) -> Manifest {
        match value {
            Value::Object(map) => map,
            _ => panic!("not a table"),
        }
    }

    #[test]
    fn test_registration_order() {
        assert_eq!(compiler().provider_names(), ["brew", "symlink", "exec"]);
    }

    #[test]
    fn test_empty_manifest_compiles_to_empty_graph() {
        let graph = compiler().compile(Manifest::new()).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_string_field_errors_name_the_entry() {
        let entry = table(json!({ "run": 3, "blank": " " }));
        let err = string_field("exec", "x", &entry, "run").unwrap_err();
        assert_eq!(err.to_string(), "exec.x: field \"run\" must be a string, found number");
        let err = string_field("exec", "x", &entry, "blank").unwrap_err();
        assert!(err.to_string().contains("is empty"));
        let err = string_field("exec", "x", &entry, "unless").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_string_list() {
        let t = table(json!({ "taps": ["a/b", "c/d"], "bad": ["ok", 1], "scalar": "x" }));
        assert_eq!(string_list("brew", &t, "taps").unwrap(), ["a/b", "c/d"]);
        assert!(string_list("brew", &t, "missing").unwrap().is_empty());
        assert!(string_list("brew", &t, "bad").unwrap_err().to_string().contains("bad[1]"));
        assert!(string_list("brew", &t, "scalar").is_err());
    }

    #[test]
    fn test_section_entry_requires_table() {
        let err = section_entry("symlinks", "zshrc", &json!("~/.zshrc")).unwrap_err();
        assert!(err.to_string().contains("expected a table, found string"));
    }
}
