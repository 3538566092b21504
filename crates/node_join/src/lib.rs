//! Joining a discovered group: pick a member service, fetch the genesis and
//! current rosters from it, then hand the result to the consensus engine.

pub mod coordinator;
pub mod error;
pub mod handoff;
pub mod selector;

pub use coordinator::{JoinCoordinator, JoinFailure, JoinReady, JoinState};
pub use error::{HandoffError, JoinError};
pub use handoff::{load_archive, ArchivedGroup, ConfigDirWriter, JoinHandoff};
pub use selector::{FirstService, RandomService, ServiceSelector};
