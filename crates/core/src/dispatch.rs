//! Wire format of the messages carried by the external dispatcher.
//!
//! A [`DispatchMessage`] is the explicit worklist handed from one
//! invocation to the next: the pair to execute now plus everything that is
//! still left. The dispatcher delivers it at least once to the dispatch
//! webhook; a [`ResumeMessage`] asks for the run to be reloaded and picked up
//! from its first incomplete pair.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisPair;
use crate::types::RunId;

/// Header carrying the hex HMAC-SHA256 signature of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-brandlens-signature";

/// Path of the dispatch webhook, relative to the public base URL.
pub const DISPATCH_PATH: &str = "/webhooks/analysis/dispatch";

/// Path of the resume webhook, relative to the public base URL.
pub const RESUME_PATH: &str = "/webhooks/analysis/resume";

/// Execute `current_pair` for `run_id`, then continue with `remaining_pairs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub run_id: RunId,
    pub current_pair: AnalysisPair,
    #[serde(default)]
    pub remaining_pairs: Vec<AnalysisPair>,
}

impl DispatchMessage {
    /// Split a non-empty worklist into head and tail.
    ///
    /// Returns `None` when there is nothing left to dispatch.
    pub fn from_worklist(run_id: RunId, pairs: &[AnalysisPair]) -> Option<Self> {
        let (head, tail) = pairs.split_first()?;
        Some(Self {
            run_id,
            current_pair: *head,
            remaining_pairs: tail.to_vec(),
        })
    }
}

/// Reload `run_id` and continue from its first incomplete pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMessage {
    pub run_id: RunId,
}
