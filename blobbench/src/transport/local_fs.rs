use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use super::Transport;
use crate::error::{Result, TransferError};

/// Stores blobs as plain files below a root directory.
#[derive(Debug)]
pub struct LocalFsTransport {
    name: String,
    path: PathBuf,
}

impl LocalFsTransport {
    pub fn new(name: impl Into<String>, path: &Path) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl Transport for LocalFsTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&self, _concurrency: usize) -> Result<()> {
        fs::create_dir_all(&self.path)?;
        Ok(())
    }

    fn download(&self, name: &str, buffer: &mut [u8]) -> Result<()> {
        let mut file = match File::open(self.path.join(name)) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(TransferError::NotFound {
                    name: name.to_owned(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let actual = file.metadata()?.len();
        if actual != buffer.len() as u64 {
            return Err(TransferError::SizeMismatch {
                name: name.to_owned(),
                expected: buffer.len() as u64,
                actual,
            });
        }

        file.read_exact(buffer)?;
        Ok(())
    }

    fn upload(&self, name: &str, buffer: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path.join(name))?;

        file.write_all(buffer)?;
        file.sync_data()?;
        Ok(())
    }
}
