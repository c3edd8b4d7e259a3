//! Quality-control report schema and the evaluator contract.
//!
//! The core only consumes [`QcReport`]; whether an issue is auto-fixable is
//! decided by the evaluator and carried in [`QcIssue::auto_fixable`]. Nothing
//! here infers fixability from issue codes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::QcConfig;
use crate::provider::ProviderError;
use crate::state_machine::JobInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QcStatus {
    Pass,
    PassWithAutoFix,
    Blocked,
}

impl QcStatus {
    pub fn is_pass(self) -> bool {
        matches!(self, QcStatus::Pass | QcStatus::PassWithAutoFix)
    }
}

impl std::fmt::Display for QcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QcStatus::Pass => write!(f, "Pass"),
            QcStatus::PassWithAutoFix => write!(f, "PassWithAutoFix"),
            QcStatus::Blocked => write!(f, "Blocked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcIssue {
    pub code: String,
    pub auto_fixable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl QcIssue {
    pub fn fixable(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            auto_fixable: true,
            description: None,
        }
    }

    pub fn signoff(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            auto_fixable: false,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcReport {
    pub status: QcStatus,
    pub overall_score: u8,
    #[serde(default)]
    pub issues: Vec<QcIssue>,
}

/// How a failed report should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QcFailure {
    /// Every issue can be fixed without a human.
    AutoFixable,
    /// At least one issue needs human sign-off; carries those codes.
    RequiresSignoff(Vec<String>),
}

impl QcReport {
    pub fn pass(score: u8) -> Self {
        Self {
            status: QcStatus::Pass,
            overall_score: score.min(100),
            issues: Vec::new(),
        }
    }

    pub fn blocked(score: u8, issues: Vec<QcIssue>) -> Self {
        Self {
            status: QcStatus::Blocked,
            overall_score: score.min(100),
            issues,
        }
    }

    /// `None` when the report passes.
    pub fn failure(&self) -> Option<QcFailure> {
        if self.status.is_pass() {
            return None;
        }
        let signoff: Vec<String> = self
            .issues
            .iter()
            .filter(|issue| !issue.auto_fixable)
            .map(|issue| issue.code.clone())
            .collect();
        if signoff.is_empty() {
            Some(QcFailure::AutoFixable)
        } else {
            Some(QcFailure::RequiresSignoff(signoff))
        }
    }
}

/// External quality-control collaborator.
#[async_trait]
pub trait QcEvaluator: Send + Sync {
    /// Evaluates one draft. Timeouts and transport failures surface as `ProviderError`.
    async fn evaluate(&self, input: &JobInput, text: &str) -> Result<QcReport, ProviderError>;
}

/// Deterministic rule-based evaluator.
///
/// Checks length, anchor text, target link and prohibited phrases. Only the
/// prohibited-phrase rule needs sign-off; the rest can be fixed by a rewrite.
pub struct HeuristicEvaluator {
    config: QcConfig,
}

const THIN_CONTENT_PENALTY: u32 = 30;
const ANCHOR_PENALTY: u32 = 20;
const LINK_PENALTY: u32 = 20;
const PROHIBITED_PENALTY: u32 = 50;

impl HeuristicEvaluator {
    pub fn new(config: QcConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, input: &JobInput, text: &str) -> QcReport {
        let mut issues = Vec::new();
        let mut penalty = 0u32;

        let words = text.split_whitespace().count();
        if words < self.config.min_words {
            penalty += THIN_CONTENT_PENALTY;
            issues.push(QcIssue::fixable("thin_content").with_description(format!(
                "article has {words} words, at least {} required",
                self.config.min_words
            )));
        }

        let lower = text.to_lowercase();
        let anchor = input.anchor_text.trim().to_lowercase();
        if !anchor.is_empty() && !lower.contains(&anchor) {
            penalty += ANCHOR_PENALTY;
            issues.push(QcIssue::fixable("anchor_missing").with_description(format!(
                "anchor text \"{}\" does not appear",
                input.anchor_text.trim()
            )));
        }

        let target = input.target_url.trim();
        if !target.is_empty() && !text.contains(target) {
            penalty += LINK_PENALTY;
            issues.push(
                QcIssue::fixable("link_missing")
                    .with_description(format!("no link to {target}")),
            );
        }

        for phrase in &self.config.prohibited_phrases {
            let needle = phrase.trim().to_lowercase();
            if !needle.is_empty() && lower.contains(&needle) {
                penalty += PROHIBITED_PENALTY;
                issues.push(QcIssue::signoff("prohibited_content").with_description(format!(
                    "contains prohibited phrase \"{}\"",
                    phrase.trim()
                )));
            }
        }

        let score = 100u32.saturating_sub(penalty) as u8;
        if issues.is_empty() {
            QcReport::pass(score)
        } else {
            QcReport::blocked(score, issues)
        }
    }
}

#[async_trait]
impl QcEvaluator for HeuristicEvaluator {
    async fn evaluate(&self, input: &JobInput, text: &str) -> Result<QcReport, ProviderError> {
        Ok(self.assess(input, text))
    }
}
