// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and parsing
//!
//! Two shapes are accepted:
//!
//! ```yaml
//! kind: Workflow
//! name: greet
//! trigger:
//!   actions:
//!     - kind: SendActivity
//!       activity: "Hello {Workflow.Inputs.input}"
//! ```
//!
//! or a bare `actions:` list at the top level.

use crate::adk::error::{BuildError, Result};
use crate::baton::declarative::actions::{parse_actions, Action};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A parsed declarative workflow
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: Option<String>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Deserialize)]
struct RawWorkflow {
    kind: Option<String>,
    name: Option<String>,
    description: Option<String>,
    trigger: Option<RawTrigger>,
    actions: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawTrigger {
    #[serde(default)]
    actions: Vec<Value>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            description: None,
            actions,
        }
    }

    /// Parse from an already-deserialized document
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawWorkflow = serde_json::from_value(value)?;
        Self::from_raw(raw, None)
    }

    fn from_raw(raw: RawWorkflow, fallback_name: Option<&str>) -> Result<Self> {
        if let Some(kind) = raw.kind.as_deref() {
            if kind != "Workflow" {
                return Err(BuildError::InvalidDefinition(format!(
                    "unsupported workflow kind '{}'",
                    kind
                ))
                .into());
            }
        }
        let actions = match (raw.trigger, raw.actions) {
            (Some(trigger), _) => trigger.actions,
            (None, Some(actions)) => actions,
            (None, None) => {
                return Err(BuildError::InvalidDefinition(
                    "workflow has neither trigger.actions nor actions".into(),
                )
                .into())
            }
        };
        Ok(Self {
            name: raw
                .name
                .or_else(|| fallback_name.map(str::to_string))
                .unwrap_or_else(|| "workflow".to_string()),
            description: raw.description,
            actions: parse_actions(&actions)?,
        })
    }
}

/// Loads workflow definitions from YAML files
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow definition from a YAML file; the file stem names
    /// workflows that have no `name`
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let raw: RawWorkflow = serde_yaml::from_str(&content)?;
        let stem = path.file_stem().and_then(|s| s.to_str());
        WorkflowDefinition::from_raw(raw, stem)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition> {
        let raw: RawWorkflow = serde_yaml::from_str(content)?;
        WorkflowDefinition::from_raw(raw, None)
    }

    /// Every `*.yaml` / `*.yml` file in a directory, sorted by path.
    /// Files that fail to parse are logged and skipped.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<(PathBuf, WorkflowDefinition)>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut workflows = Vec::new();
        for path in paths {
            match self.load_workflow(&path) {
                Ok(def) => workflows.push((path, def)),
                Err(e) => log::warn!("Skipping workflow {}: {}", path.display(), e),
            }
        }
        Ok(workflows)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::BatonError;
    use crate::baton::declarative::actions::ActionKind;

    #[test]
    fn test_parse_trigger_workflow() {
        let yaml = r#"
kind: Workflow
name: greet
description: "Says hello"
trigger:
  actions:
    - kind: SetVariable
      id: set_name
      variable: Local.name
      value: =Upper(Workflow.Inputs.input)
    - kind: SendActivity
      activity: "Hello {Local.name}"
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "greet");
        assert_eq!(def.description.as_deref(), Some("Says hello"));
        assert_eq!(def.actions.len(), 2);
        assert_eq!(def.actions[0].id, "set_name");
        assert!(matches!(
            def.actions[1].kind,
            ActionKind::SendActivity { .. }
        ));
    }

    #[test]
    fn test_parse_top_level_actions() {
        let yaml = r#"
actions:
  - kind: EndWorkflow
"#;
        let def = WorkflowLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.name, "workflow");
        assert_eq!(def.actions[0].kind, ActionKind::EndWorkflow);
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let err = WorkflowLoader::parse_yaml("kind: Direct\nactions: []\n").unwrap_err();
        assert!(matches!(err, BatonError::Build(BuildError::InvalidDefinition(_))));
    }

    #[test]
    fn test_action_errors_surface_as_build_errors() {
        let yaml = r#"
actions:
  - kind: Goto
    id: jump
"#;
        let err = WorkflowLoader::parse_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            BatonError::Build(BuildError::MissingField { ref field, .. }) if field == "actionId"
        ));
    }

    #[test]
    fn test_load_dir_uses_file_stem_and_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("hello.yaml"),
            "actions:\n  - kind: SendActivity\n    activity: hi\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.yml"), "actions: [ {kind: Nope} ]\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = WorkflowLoader::new().load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.name, "hello");
    }
}
