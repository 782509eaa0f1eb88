//! Infrastructure implementation of the `LogReader` port.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::LogReader;

/// Delay between polls in follow mode.
pub const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads per-alias log files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLogReader;

impl LogReader for FileLogReader {
    type Lines = LogTail;

    fn tail(&self, path: &Path, follow: bool, n: usize) -> Result<LogTail> {
        LogTail::open(path, follow, n)
    }
}

/// Yields the last `n` lines of a file, then (in follow mode) every line
/// appended afterwards. Iteration in follow mode blocks and never ends on its
/// own.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    pending: VecDeque<String>,
    follow: bool,
    offset: u64,
    partial: Vec<u8>,
}

impl LogTail {
    fn open(path: &Path, follow: bool, n: usize) -> Result<Self> {
        let mut tail = Self {
            path: path.to_path_buf(),
            pending: VecDeque::new(),
            follow,
            offset: 0,
            partial: Vec::new(),
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tail),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot open {}", path.display()));
            }
        };

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .with_context(|| format!("cannot read {}", path.display()))?;
            if read == 0 {
                break;
            }
            tail.offset += read as u64;
            // An unterminated last line is held back until it completes.
            if follow && line.last() != Some(&b'\n') {
                tail.partial.extend_from_slice(&line);
                break;
            }
            if n > 0 {
                if tail.pending.len() == n {
                    tail.pending.pop_front();
                }
                tail.pending.push_back(decode_line(&line));
            }
        }
        Ok(tail)
    }

    /// Read whatever was appended since the last poll into `pending`.
    fn poll(&mut self) -> std::io::Result<()> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len < self.offset {
            // Truncated or replaced: start over.
            self.offset = 0;
            self.partial.clear();
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut appended = Vec::new();
        file.read_to_end(&mut appended)?;
        self.offset += appended.len() as u64;
        self.partial.extend_from_slice(&appended);

        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.pending.push_back(decode_line(&line));
        }
        Ok(())
    }
}

impl Iterator for LogTail {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(line);
            }
            if !self.follow {
                return None;
            }
            if let Err(e) = self.poll() {
                tracing::warn!(path = %self.path.display(), "log follow stopped: {e}");
                return None;
            }
            if self.pending.is_empty() {
                std::thread::sleep(FOLLOW_POLL_INTERVAL);
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}
