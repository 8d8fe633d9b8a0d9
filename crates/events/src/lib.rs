//! Outbound delivery for the analysis pipeline.
//!
//! - [`HttpDispatcher`] publishes signed dispatch messages to the external
//!   at-least-once delivery service (or straight to the dispatch webhook).
//! - [`EmailDelivery`] sends run notifications over SMTP.
//! - [`LogNotifier`] stands in for email when SMTP is not configured.

pub mod delivery;

pub use delivery::dispatch::{DispatchConfig, DispatchError, HttpDispatcher};
pub use delivery::email::{EmailConfig, EmailDelivery, EmailError, LogNotifier};
