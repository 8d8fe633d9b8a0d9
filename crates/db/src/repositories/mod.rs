//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod analysis_pair_repo;
pub mod analysis_result_repo;
pub mod analysis_run_repo;
pub mod directory_repo;
pub mod maintenance_lock_repo;

pub use analysis_pair_repo::AnalysisPairRepo;
pub use analysis_result_repo::AnalysisResultRepo;
pub use analysis_run_repo::AnalysisRunRepo;
pub use directory_repo::{BrandRepo, UserRepo};
pub use maintenance_lock_repo::MaintenanceLockRepo;
