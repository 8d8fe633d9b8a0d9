//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row plus the input DTOs its repository accepts.

pub mod analysis_pair;
pub mod analysis_result;
pub mod analysis_run;
pub mod directory;
pub mod maintenance_lock;
pub mod status;
