pub mod analysis;
pub mod cron;
pub mod webhooks;
