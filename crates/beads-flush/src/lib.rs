//! Debounced auto-flush pipeline: exports dirty store rows to the JSONL
//! log without amplification (§4.2).

pub mod controller;
pub mod error;
pub mod export;

pub use controller::FlushController;
pub use error::{FlushError, Result};
