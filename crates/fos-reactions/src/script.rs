//! Replay scripts
//!
//! JSON description of definitions and a sequence of mutation steps.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use fos_elements::{ElementDefinitionOptions, EngineConfig, LifecycleCallback, Mutation};
use serde::Deserialize;

/// A whole replay script
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Engine config, overridden by `--config`
    #[serde(default)]
    pub config: Option<EngineConfig>,
    #[serde(default)]
    pub definitions: Vec<ScriptDefinition>,
    pub steps: Vec<Step>,
}

/// Element behavior a script can define
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDefinition {
    pub name: String,
    #[serde(default)]
    pub observed_attributes: Vec<String>,
    #[serde(default)]
    pub extends: Option<String>,
    /// Callbacks (or `constructor`) that return an error
    #[serde(default)]
    pub fail_on: Vec<LifecycleCallback>,
    /// Mutations reported from inside `connectedCallback`
    #[serde(default)]
    pub on_connected: Vec<Mutation>,
}

impl ScriptDefinition {
    pub fn options(&self) -> ElementDefinitionOptions {
        let options = ElementDefinitionOptions::observing(self.observed_attributes.iter().cloned());
        match &self.extends {
            Some(tag) => options.extending(tag),
            None => options,
        }
    }
}

/// One step of a script
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Control(Control),
    Mutation(Mutation),
}

/// Steps that drive the engine rather than the tree
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Control {
    /// Register a definition from the script's table
    Define { name: String },
    /// Report when a tag becomes defined
    WhenDefined { name: String },
    /// Run exactly one checkpoint
    Checkpoint,
    /// Run checkpoints until idle
    Flush,
}

impl Script {
    pub fn parse(json: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(json).context("malformed replay script")?;
        if let Some(config) = &script.config {
            config.validate()?;
        }
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&json).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn definition(&self, name: &str) -> Option<&ScriptDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_elements::{CheckpointMode, ElementId};

    #[test]
    fn test_parse_mixed_steps() {
        let script = Script::parse(
            r#"{
                "config": { "checkpoint_mode": "explicit" },
                "definitions": [
                    { "name": "x-badge", "observed_attributes": ["label"], "fail_on": ["disconnected"] }
                ],
                "steps": [
                    { "op": "define", "name": "x-badge" },
                    { "op": "insert", "element": 1, "tag_name": "x-badge" },
                    { "op": "attribute_set", "element": 1, "name": "label", "old_value": null, "new_value": "hi" },
                    { "op": "checkpoint" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(script.config.as_ref().unwrap().checkpoint_mode, CheckpointMode::Explicit);
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(&script.steps[0], Step::Control(Control::Define { name }) if name == "x-badge"));
        assert!(matches!(
            &script.steps[1],
            Step::Mutation(Mutation::Insert { element: ElementId(1), .. })
        ));
        assert!(matches!(script.steps[3], Step::Control(Control::Checkpoint)));

        let definition = script.definition("x-badge").unwrap();
        assert_eq!(definition.fail_on, vec![LifecycleCallback::Disconnected]);
        assert_eq!(definition.options().observed_attributes, vec!["label".to_string()]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Script::parse(r#"{ "config": { "max_checkpoints_per_flush": 0 }, "steps": [] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_op_rejected() {
        let result = Script::parse(r#"{ "steps": [ { "op": "explode" } ] }"#);
        assert!(result.is_err());
    }
}
