//! Training scenario document.
//!
//! A [`Scenario`] is the scripted unit of a training conversation: who the
//! agent plays ([`Persona`]), what the trainee should achieve
//! ([`Objective`]), and the ordered [`ScenarioStep`]s the session walks
//! through. Documents arrive as JSON with camelCase keys and are checked by
//! [`validate_scenario`] before they are loaded into a session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

fn default_locale() -> String {
    "fr-FR".to_string()
}

/// The character the agent plays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tone: String,
    #[serde(default)]
    pub motivations: Vec<String>,
    #[serde(default)]
    pub objections: Vec<String>,
}

/// A goal the trainee is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub id: String,
    pub description: String,
    /// Must contain at least one entry.
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
}

/// One scripted unit of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    pub id: String,
    pub title: String,
    pub prompt: String,
    #[serde(default)]
    pub expected_skills: Vec<String>,
    /// Keys into [`Scenario::objections`].
    #[serde(default)]
    pub objection_ids: Vec<String>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub guardrails: Vec<String>,
}

/// How hard an objection is to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Low,
    #[default]
    Medium,
    High,
}

/// An objection the persona may raise during a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objection {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub recommended_strategies: Vec<String>,
}

/// Reference material available to the agent during the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Metric weights used for live and end-of-session scoring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoring {
    #[serde(default)]
    pub realtime_weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub completion_weights: BTreeMap<String, f64>,
}

/// A complete training scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub title: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    pub persona: Persona,
    pub objectives: Vec<Objective>,
    pub steps: Vec<ScenarioStep>,
    pub objections: BTreeMap<String, Objection>,
    #[serde(default)]
    pub knowledge_base: Vec<KnowledgeEntry>,
    #[serde(default)]
    pub scoring: Scoring,
}

/// Errors produced when a scenario document fails schema checks.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The document is not shaped like a scenario.
    #[error("malformed scenario document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The scenario defines no objectives.
    #[error("scenario '{0}' has no objectives")]
    NoObjectives(String),

    /// The scenario defines no steps.
    #[error("scenario '{0}' has no steps")]
    NoSteps(String),

    /// An objective has an empty success criteria list.
    #[error("objective '{0}' has no success criteria")]
    NoSuccessCriteria(String),

    /// A step references an objection that is not defined.
    #[error("step '{step}' references unknown objection '{objection}'")]
    UnknownObjection { step: String, objection: String },
}

impl Scenario {
    /// Checks the structural invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.objectives.is_empty() {
            return Err(ValidationError::NoObjectives(self.id.clone()));
        }
        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps(self.id.clone()));
        }
        if let Some(objective) = self
            .objectives
            .iter()
            .find(|o| o.success_criteria.is_empty())
        {
            return Err(ValidationError::NoSuccessCriteria(objective.id.clone()));
        }
        for step in &self.steps {
            if let Some(missing) = step
                .objection_ids
                .iter()
                .find(|id| !self.objections.contains_key(id.as_str()))
            {
                return Err(ValidationError::UnknownObjection {
                    step: step.id.clone(),
                    objection: missing.clone(),
                });
            }
        }
        Ok(())
    }

    /// Looks up a step by its identifier.
    pub fn step(&self, id: &str) -> Option<&ScenarioStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Parses and validates a scenario document.
///
/// # Errors
///
/// Returns [`ValidationError::Malformed`] if the JSON does not match the
/// schema, or one of the structural variants if an invariant is violated.
pub fn validate_scenario(document: &serde_json::Value) -> Result<Scenario, ValidationError> {
    let scenario: Scenario = serde_json::from_value(document.clone())?;
    scenario.validate()?;
    Ok(scenario)
}
