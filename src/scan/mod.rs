//! Repository scanning: query construction, evidence scoring, metadata
//! enrichment and the background job state machine.

pub mod enrich;
pub mod evidence;
pub mod queries;
pub mod registry;
pub mod runner;

pub use enrich::backfill_metadata;
pub use evidence::{CandidateRepo, Evidence};
pub use registry::TaskRegistry;
pub use runner::{ScanContext, ScanError, Scanner};
