//! Append-only session log files.
//!
//! One file per session under the log directory, named after the UTC start
//! time, e.g. `logs/20240501123005_bm-lastheard.txt`.

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::format::DisplayLine;

/// Default directory for session logs, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// An open session log.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl SessionLog {
    /// File name for a session started at `started_at`.
    pub fn file_name(started_at: DateTime<Utc>) -> String {
        format!("{}_bm-lastheard.txt", started_at.format("%Y%m%d%H%M%S"))
    }

    /// Create the log directory if needed and open the session's file for appending.
    pub fn create(dir: &Path, started_at: DateTime<Utc>) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Self::open(dir.join(Self::file_name(started_at)))
    }

    /// Open `path` for appending.
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines written so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Append one line and flush it to disk.
    pub fn write_line(&mut self, line: &DisplayLine) -> io::Result<()> {
        self.writer.write_all(line.log_line().as_bytes())?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and close the file, returning its path.
    pub fn close(mut self) -> io::Result<PathBuf> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap()
    }

    fn line(text: &str) -> DisplayLine {
        use crate::event::{CallEvent, EventKind, LinkInfo};
        use crate::format::EventFormatter;
        use crate::lookup::NoLookup;

        let event = CallEvent {
            session_id: String::new(),
            kind: EventKind::SessionStop,
            callsign: text.to_string(),
            source_id: None,
            talkgroup: 91,
            peer_id: 2441,
            timestamp: started(),
            duration: None,
            link: LinkInfo::default(),
        };
        EventFormatter::new(false).render(&event, &NoLookup)
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            SessionLog::file_name(started()),
            "20240501123005_bm-lastheard.txt"
        );
    }

    #[test]
    fn test_creates_directory_and_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");

        let mut log = SessionLog::create(&log_dir, started()).unwrap();
        log.write_line(&line("OH6ABC")).unwrap();
        log.write_line(&line("OH2XYZ")).unwrap();
        assert_eq!(log.lines(), 2);

        let path = log.close().unwrap();
        assert_eq!(path, log_dir.join("20240501123005_bm-lastheard.txt"));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("OH6ABC"));
        assert!(lines[1].contains("OH2XYZ"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_reopening_appends() {
        let dir = tempfile::tempdir().unwrap();

        let mut log = SessionLog::create(dir.path(), started()).unwrap();
        log.write_line(&line("OH6ABC")).unwrap();
        log.close().unwrap();

        let mut log = SessionLog::create(dir.path(), started()).unwrap();
        log.write_line(&line("OH2XYZ")).unwrap();
        let path = log.close().unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
