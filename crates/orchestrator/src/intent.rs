//! Keyword-based intent classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a free-text request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DeployModel,
    TrainAndDeploy,
    OptimizeCosts,
    Unknown,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeployModel => "deploy_model",
            Self::TrainAndDeploy => "train_and_deploy",
            Self::OptimizeCosts => "optimize_costs",
            Self::Unknown => "unknown",
        }
    }

    /// Name of the workflow serving this intent.
    pub fn workflow_name(self) -> Option<&'static str> {
        match self {
            Self::Unknown => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification rules in priority order. The first rule with a matching
/// keyword wins, so "train and deploy" resolves to training and anything
/// mentioning cost resolves to optimization.
const RULES: &[(Intent, &[&str])] = &[
    (
        Intent::OptimizeCosts,
        &["optimize", "optimization", "cost", "savings", "cheaper"],
    ),
    (Intent::TrainAndDeploy, &["train", "fine-tune", "lora"]),
    (Intent::DeployModel, &["deploy", "serve", "serving"]),
];

/// Lowercased alphanumeric words of `text`.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A keyword matches at the start of a word, so "costs" and "deployed"
/// count but "constraints" and "observe" do not. Hyphenated keywords must
/// match consecutive words.
fn mentions(words: &[String], keyword: &str) -> bool {
    let parts: Vec<&str> = keyword.split('-').collect();
    let Some((last, leading)) = parts.split_last() else {
        return false;
    };
    words.windows(parts.len()).any(|window| {
        window[..leading.len()]
            .iter()
            .zip(leading)
            .all(|(word, part)| word == part)
            && window[leading.len()].starts_with(last)
    })
}

/// Classify a request by matching [`RULES`] against its words,
/// case-insensitive.
pub fn classify(text: &str) -> Intent {
    let words = words(text);
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| mentions(&words, k)))
        .map_or(Intent::Unknown, |(intent, _)| *intent)
}
