// Request dispatch: lifecycle, fingerprints, worker pool, facade and registry

mod fingerprint;
mod pathfinder;
mod processor;
mod registry;
mod request;
mod sync_context;
mod workers;

pub use fingerprint::{Fingerprint, PointToPointComparer, RequestComparer, SingleSourceComparer};
pub use pathfinder::{GridPathfinder, PathfindEngine, PathfindEngineBuilder};
pub use processor::{PathJob, PathProcessor, RequestProcessor};
pub use registry::{PathfinderRegistry, RegisteredPathfinder};
pub use request::{FailureReason, PathCallback, PathOutcome, PathRequest, RequestState};
pub use sync_context::{ChannelSyncContext, SyncCallback, SynchronizationContext, ThreadSyncContext};
pub use workers::WorkerPool;
