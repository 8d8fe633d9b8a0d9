pub mod run_retention;
