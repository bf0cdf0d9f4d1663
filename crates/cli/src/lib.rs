//! `analysis-cli` library crate.
//!
//! Re-exports the job file loader for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod job_file;
