//! Observability Module
//!
//! Text rendering of run results for the log.

pub mod common;
mod run_summary;

pub use run_summary::{render_items, render_summary};
