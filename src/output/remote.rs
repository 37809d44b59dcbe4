use super::SnapshotSink;
use crate::clock::Clock;
use crate::error::CaptureError;
use crate::naming::Snapshot;
use crate::retry::{retry, RetryPolicy};

/// A bucket-like store addressed by key.
pub trait ObjectStore {
    /// Verify the destination exists and accepts writes.
    fn check_access(&self) -> Result<(), CaptureError>;

    /// Store `body` under `key`, replacing any existing object. Returns the
    /// object's URL.
    fn put_object(&self, key: &str, body: &[u8], content_type: &str) -> Result<String, CaptureError>;

    fn describe(&self) -> String;
}

/// `{prefix}/{partition}/{name}` with empty segments and stray slashes
/// removed. The prefix defaults to the snapshot's source type.
pub fn object_key(prefix: Option<&str>, snapshot: &Snapshot) -> String {
    let prefix = prefix.unwrap_or(snapshot.kind.prefix());
    [Some(prefix), snapshot.partition.as_deref(), Some(snapshot.name.as_str())]
        .into_iter()
        .flatten()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Uploads snapshots to an [`ObjectStore`], retrying transient failures.
pub struct RemoteSink<S, C> {
    store: S,
    prefix: Option<String>,
    policy: RetryPolicy,
    clock: C,
}

impl<S: ObjectStore, C: Clock> RemoteSink<S, C> {
    /// Fails fast if the store is unreachable or refuses access.
    pub fn new(
        store: S,
        prefix: Option<String>,
        policy: RetryPolicy,
        clock: C,
    ) -> Result<Self, CaptureError> {
        store.check_access()?;
        tracing::info!("Destination {} is accessible", store.describe());

        Ok(Self {
            store,
            prefix,
            policy,
            clock,
        })
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ObjectStore, C: Clock> SnapshotSink for RemoteSink<S, C> {
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<String, CaptureError> {
        let key = object_key(self.prefix.as_deref(), snapshot);
        let what = format!("upload of {key}");
        retry(&self.policy, &self.clock, &what, |_| {
            self.store
                .put_object(&key, &snapshot.bytes, snapshot.content_type())
        })
    }

    fn describe(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", self.store.describe(), prefix.trim_matches('/')),
            None => self.store.describe(),
        }
    }
}
