use csv::Writer;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

/// Append-only CSV audit log of delivered lifecycle events, one description
/// per row. Rows are flushed as they are written so the file stays usable
/// while the service runs.
pub struct EventLog {
    writer: Mutex<Writer<File>>,
}

impl EventLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(["description"])?;
        writer.flush()?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    pub fn record(&self, description: &str) -> Result<(), EventLogError> {
        let mut writer = self.writer.lock().expect("event log mutex poisoned");
        writer.write_record([description])?;
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("event log write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("event log flush failed: {0}")]
    Io(#[from] std::io::Error),
}
