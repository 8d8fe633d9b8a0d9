//! External delivery channels.
//!
//! Both channels implement the collaborator traits from
//! `brandlens_core::collaborators` so the pipeline never sees transport
//! details.

pub mod dispatch;
pub mod email;
