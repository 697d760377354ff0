//! Streams logical lines out of map-adjacent text files. Comment-only and
//! blank lines never reach the callers; what does reach them carries the
//! 1-based line number, the original text, the trimmed text with trailing
//! `//` comments removed, and the first meaningful character for cheap
//! dispatch. Block comments are left alone here; only the shader parser
//! needs them and it tracks the open/close state itself.
//!
//! Input is treated as UTF-8 with invalid sequences replaced, so a stray
//! latin-1 byte in a decade-old shader file cannot abort a pack.
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use pakfs::CancelToken;

use crate::ScanError;

#[derive(Debug, Clone)]
pub struct Line {
    /// 1-based line number in the source.
    pub index: u32,
    /// Original text, without the line terminator.
    pub raw: String,
    /// Trimmed text with any trailing `//` comment removed. Never empty.
    pub value: String,
    /// First character of `value`.
    pub first: char,
}

pub struct LineReader<R> {
    reader: R,
    label: String,
    cancel: CancelToken,
    index: u32,
    done: bool,
}

impl LineReader<BufReader<File>> {
    pub fn open(path: &Path, cancel: CancelToken) -> Result<Self, ScanError> {
        let label = path.display().to_string();
        let file = File::open(path).map_err(|source| ScanError::io(label.clone(), source))?;
        Ok(Self::new(BufReader::new(file), label, cancel))
    }
}

impl LineReader<Cursor<Vec<u8>>> {
    /// Reader over in-memory bytes, e.g. an archive entry.
    pub fn from_bytes(bytes: Vec<u8>, label: impl Into<String>, cancel: CancelToken) -> Self {
        Self::new(Cursor::new(bytes), label.into(), cancel)
    }
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R, label: String, cancel: CancelToken) -> Self {
        Self {
            reader,
            label,
            cancel,
            index: 0,
            done: false,
        }
    }

    /// Where the lines come from; used in error reports.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = Result<Line, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.cancel.is_canceled() {
                self.done = true;
                return Some(Err(ScanError::Canceled));
            }

            let mut buf = Vec::new();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(source) => {
                    self.done = true;
                    return Some(Err(ScanError::io(self.label.clone(), source)));
                }
            }
            self.index += 1;

            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }

            let raw = String::from_utf8_lossy(&buf).into_owned();
            let mut value = raw.trim();
            if let Some(idx) = value.find("//") {
                value = value[..idx].trim_end();
            }
            if value.is_empty() {
                continue;
            }

            let first = value.chars().next().expect("value is non-empty");
            return Some(Ok(Line {
                index: self.index,
                value: value.to_string(),
                first,
                raw,
            }));
        }
    }
}
