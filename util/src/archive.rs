//! Struct archiving functionality
//!
//! Modules archive their status reports as one csv row per processed cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
///
/// A default archiver has no file behind it and silently discards records, which lets modules be
/// run without a session (in tests for example).
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session,
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_file_path(session.arch_root.join(path))
    }

    /// Create a new archiver writing to the given file, creating parent
    /// directories as needed. Any existing file is truncated.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let w = WriterBuilder::new().has_headers(true).from_writer(file);

        Ok(Self { writer: Some(w) })
    }

    /// True if records are being written to a file.
    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut w) = self.writer {
            w.serialize(record)?;
            w.flush()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Record {
        error_m: f64,
        angular_rads: f64,
    }

    #[test]
    fn test_archive_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wall_ctrl/status_report.csv");

        let mut archiver = Archiver::from_file_path(&path).unwrap();
        assert!(archiver.is_active());

        archiver
            .serialise(Record {
                error_m: 0.1,
                angular_rads: -0.3,
            })
            .unwrap();
        archiver
            .serialise(Record {
                error_m: 0.0,
                angular_rads: 0.0,
            })
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines, vec!["error_m,angular_rads", "0.1,-0.3", "0.0,0.0"]);
    }

    #[test]
    fn test_default_archiver_discards() {
        let mut archiver = Archiver::default();
        assert!(!archiver.is_active());
        assert!(archiver
            .serialise(Record {
                error_m: 1.0,
                angular_rads: 1.0
            })
            .is_ok());
    }
}
