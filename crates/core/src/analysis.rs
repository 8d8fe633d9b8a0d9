//! Analysis vocabulary: AI models, funnel stages, and the `(model, stage)`
//! pairs that make up a run's worklist.
//!
//! A run's worklist is the Cartesian product of the selected models and
//! stages in stage-major order: every model is analysed for the first stage
//! before any model moves on to the next one. The same ordering is used when
//! a run is created and when the stuck-run sweep reconstructs the worklist,
//! so both must go through [`build_pairs`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// AiModel
// ---------------------------------------------------------------------------

/// An AI assistant whose answers are analysed for brand visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiModel {
    #[serde(rename = "ChatGPT")]
    ChatGpt,
    Claude,
    Gemini,
    Perplexity,
}

impl AiModel {
    pub const ALL: [AiModel; 4] = [
        AiModel::ChatGpt,
        AiModel::Claude,
        AiModel::Gemini,
        AiModel::Perplexity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatGpt => "ChatGPT",
            Self::Claude => "Claude",
            Self::Gemini => "Gemini",
            Self::Perplexity => "Perplexity",
        }
    }
}

impl fmt::Display for AiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiModel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Validation(format!("Unknown AI model '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// PipelineStage
// ---------------------------------------------------------------------------

/// Marketing funnel stage the prompts are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    /// Top of funnel: awareness questions.
    #[serde(rename = "TOFU")]
    Tofu,
    /// Middle of funnel: consideration and comparison questions.
    #[serde(rename = "MOFU")]
    Mofu,
    /// Bottom of funnel: purchase-intent questions.
    #[serde(rename = "BOFU")]
    Bofu,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 3] = [
        PipelineStage::Tofu,
        PipelineStage::Mofu,
        PipelineStage::Bofu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tofu => "TOFU",
            Self::Mofu => "MOFU",
            Self::Bofu => "BOFU",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::Validation(format!("Unknown pipeline stage '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// AnalysisPair
// ---------------------------------------------------------------------------

/// One unit of work: analyse a brand with `model` for `stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisPair {
    pub model: AiModel,
    pub stage: PipelineStage,
}

impl AnalysisPair {
    pub fn new(model: AiModel, stage: PipelineStage) -> Self {
        Self { model, stage }
    }

    /// Human-readable progress label, e.g. `"ChatGPT - TOFU"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.model, self.stage)
    }
}

impl fmt::Display for AnalysisPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.model, self.stage)
    }
}

/// Build the ordered worklist for a run.
///
/// Duplicates in either selection are dropped, keeping the first
/// occurrence, so the pair count always equals
/// `distinct(models) * distinct(stages)`.
pub fn build_pairs(models: &[AiModel], stages: &[PipelineStage]) -> Vec<AnalysisPair> {
    let models = dedup(models);
    let stages = dedup(stages);

    stages
        .iter()
        .flat_map(|&stage| models.iter().map(move |&model| AnalysisPair::new(model, stage)))
        .collect()
}

/// Validate a model/stage selection before a run is created.
pub fn validate_selection(models: &[AiModel], stages: &[PipelineStage]) -> Result<(), CoreError> {
    if models.is_empty() {
        return Err(CoreError::Validation(
            "At least one AI model must be selected".into(),
        ));
    }
    if stages.is_empty() {
        return Err(CoreError::Validation(
            "At least one pipeline stage must be selected".into(),
        ));
    }
    Ok(())
}

/// Parse stored model names (as persisted on the run row).
pub fn parse_models(names: &[String]) -> Result<Vec<AiModel>, CoreError> {
    names.iter().map(|n| n.parse()).collect()
}

/// Parse stored stage names (as persisted on the run row).
pub fn parse_stages(names: &[String]) -> Result<Vec<PipelineStage>, CoreError> {
    names.iter().map(|n| n.parse()).collect()
}

fn dedup<T: Copy + PartialEq>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(*item);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
