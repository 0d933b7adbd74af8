// =============================================================================
// hookline-core/src/auth/mod.rs
// =============================================================================

pub mod snapshot;

pub use snapshot::{AuthSnapshot, AuthSnapshotStore, SnapshotEntry, SNAPSHOT_VERSION};
