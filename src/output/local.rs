use super::SnapshotSink;
use crate::error::CaptureError;
use crate::naming::Snapshot;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes snapshots under `base/partition/name`.
pub struct LocalSink {
    base: PathBuf,
}

impl LocalSink {
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, CaptureError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).map_err(|e| {
            CaptureError::ConfigInvalid(format!(
                "cannot create output directory {}: {e}",
                base.display()
            ))
        })?;

        tracing::info!("Images will be saved to: {}", base.display());
        Ok(Self { base })
    }

    pub fn path_for(&self, snapshot: &Snapshot) -> PathBuf {
        let dir = match &snapshot.partition {
            Some(partition) => self.base.join(partition),
            None => self.base.clone(),
        };
        dir.join(&snapshot.name)
    }

    fn write(&self, snapshot: &Snapshot) -> io::Result<PathBuf> {
        let path = self.path_for(snapshot);
        let dir = path.parent().unwrap_or(&self.base);
        fs::create_dir_all(dir)?;

        // Write beside the target and rename so a retry never leaves a
        // half-written image under the final name.
        let staging = dir.join(format!(".{}.part", snapshot.name));
        if let Err(e) = stage_and_rename(&staging, &path, &snapshot.bytes) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        sync_dir(dir)?;

        Ok(path)
    }
}

fn stage_and_rename(staging: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(staging)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(staging, path)
}

/// Flush the directory entry so the rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl SnapshotSink for LocalSink {
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<String, CaptureError> {
        self.write(snapshot)
            .map(|path| path.display().to_string())
            .map_err(|e| {
                let transient = e.kind() != io::ErrorKind::PermissionDenied;
                CaptureError::delivery(
                    format!("failed to write {}: {e}", self.path_for(snapshot).display()),
                    transient,
                )
            })
    }

    fn describe(&self) -> String {
        self.base.display().to_string()
    }
}
