use crate::traits::CheckpointLog;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Flat append-only checkpoint log: one completed object name per line,
/// UTF-8, trailing newline per record. Loading trims incidental
/// whitespace and drops blank lines so a hand-edited file still parses.
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointLog for FileCheckpoint {
    fn load(&self) -> io::Result<HashSet<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(HashSet::new()),
            Err(error) => Err(error),
        }
    }

    fn append(&mut self, name: &str) -> io::Result<()> {
        if name.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to checkpoint an empty object name",
            ));
        }
        if name.contains(['\n', '\r']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("object name contains a record delimiter: {name:?}"),
            ));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(name.as_bytes())?;
        file.write_all(b"\n")?;
        // The append must be durable before the runner reports success.
        file.sync_data()
    }
}
