//! Content-addressed auto-import pipeline (§4.3), collision detector &
//! remapper (§4.4), and deletion-aware three-way merge (§4.5).

pub mod apply;
pub mod collision;
pub mod error;
pub mod import;
pub mod merge;
pub mod remap;

pub use collision::{Classification, Collision};
pub use error::{ImportError, Result};
pub use import::{auto_import, ImportReport};
pub use merge::{merge, read_snapshot, MergeOutcome};
