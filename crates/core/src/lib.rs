//! Brandlens domain core.
//!
//! Zero internal dependencies: the analysis vocabulary (models, stages,
//! pairs), the dispatch wire format, provider-output normalization, webhook
//! signing, and the narrow collaborator traits the orchestration layer is
//! written against.

pub mod analysis;
pub mod collaborators;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod signing;
pub mod types;
