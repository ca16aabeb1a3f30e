//! Scoped read/write access to a module artifact
//!
//! A session owns the decoded module and a lock file next to the artifact.
//! The lock is released when the session is dropped, whichever way the
//! weaving pass exits. Changes reach disk only through [`ModuleSession::commit`].

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use weft_bytecode::Module;

use crate::error::WeaveError;

/// Exclusive marker file; removed on drop
#[derive(Debug)]
struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    fn acquire(artifact: &Path) -> Result<Self, WeaveError> {
        let path = sibling(artifact, "lock");
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(WeaveError::SessionBusy(artifact.to_path_buf()))
            }
            Err(source) => Err(WeaveError::Io { path, source }),
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// An open artifact
#[derive(Debug)]
pub struct ModuleSession {
    path: PathBuf,
    module: Module,
    _lock: SessionLock,
}

impl ModuleSession {
    /// Lock and decode the artifact at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WeaveError> {
        let path = path.into();
        let lock = SessionLock::acquire(&path)?;

        let bytes = fs::read(&path).map_err(|source| WeaveError::Io {
            path: path.clone(),
            source,
        })?;
        let module = Module::decode(&bytes).map_err(|source| WeaveError::Decode {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            module,
            _lock: lock,
        })
    }

    /// Artifact path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The decoded module
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Mutable access to the decoded module
    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    /// Encode the module and replace the artifact, then release the lock
    pub fn commit(self) -> Result<(), WeaveError> {
        // Write to a temporary file first so a failed write leaves the
        // artifact untouched.
        let tmp_path = sibling(&self.path, "tmp");
        let mut tmp_file = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        tmp_file
            .write_all(&self.module.encode())
            .map_err(io_err(&tmp_path))?;
        tmp_file.sync_all().map_err(io_err(&tmp_path))?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> WeaveError {
    let path = path.to_path_buf();
    move |source| WeaveError::Io { path, source }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
