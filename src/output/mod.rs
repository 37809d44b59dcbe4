mod local;
mod remote;
mod s3;

pub use local::LocalSink;
pub use remote::RemoteSink;
pub use s3::S3Store;

use crate::clock::SystemClock;
use crate::error::CaptureError;
use crate::naming::Snapshot;

/// Trait for snapshot destinations
pub trait SnapshotSink {
    /// Durably store a snapshot and return where it ended up. Delivering the
    /// same snapshot again overwrites the earlier copy.
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<String, CaptureError>;

    /// Where snapshots go, for logs
    fn describe(&self) -> String;
}

/// The destinations a run can be configured with.
pub enum Output {
    Local(LocalSink),
    Remote(RemoteSink<S3Store, SystemClock>),
}

impl SnapshotSink for Output {
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<String, CaptureError> {
        match self {
            Self::Local(sink) => sink.deliver(snapshot),
            Self::Remote(sink) => sink.deliver(snapshot),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Local(sink) => sink.describe(),
            Self::Remote(sink) => sink.describe(),
        }
    }
}
