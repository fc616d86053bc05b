//! # JSON-Lines File Store
//!
//! Persists one collection as an append-only file:
//!
//! ```text
//! <root>/<database>/<collection>.jsonl
//! {"_id":"…","name":"a"}\n
//! {"_id":"…","x":1}\n
//! ```
//!
//! Appends happen under a mutex that also tracks the committed length: the
//! byte offset just past the last complete line. Scans read up to that length
//! only, which gives each cursor a stable snapshot. A failed append is cut
//! back to the committed length, and a torn tail left by a crash is dropped
//! when the file is opened, so a half-written line never swallows the
//! documents appended after it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Take, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use docbridge_common::{Document, DocumentId};

use crate::store::{DocumentCursor, DocumentStore, StoreError, StoreResult};

const FILE_EXTENSION: &str = "jsonl";

/// Durable store backed by a JSON-lines file per collection.
pub struct FileStore {
    path: PathBuf,
    writer: Mutex<Option<Appender>>,
}

/// Append handle plus the length of the file that holds only whole lines.
struct Appender {
    file: File,
    committed: u64,
}

impl Appender {
    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        // Bytes past `committed` belong to a line that never finished.
        if self.file.metadata()?.len() > self.committed {
            self.file.set_len(self.committed)?;
        }
        if let Err(err) = self.file.write_all(line).and_then(|()| self.file.flush()) {
            if let Err(trim) = self.file.set_len(self.committed) {
                warn!(error = %trim, committed = self.committed, "failed to cut back torn append");
            }
            return Err(err);
        }
        self.committed += line.len() as u64;
        Ok(())
    }
}

impl FileStore {
    /// Opens (creating if needed) the collection file under `root`.
    pub fn open(root: &Path, database: &str, collection: &str) -> StoreResult<Self> {
        let dir = root.join(database);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{collection}.{FILE_EXTENSION}"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed = committed_len(&path)?;
        let len = file.metadata()?.len();
        if len > committed {
            warn!(path = %path.display(), dropped = len - committed, "dropping torn tail");
            file.set_len(committed)?;
        }

        Ok(FileStore {
            path,
            writer: Mutex::new(Some(Appender { file, committed })),
        })
    }

    /// Location of the collection file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for FileStore {
    fn insert_one(&self, mut document: Document) -> StoreResult<DocumentId> {
        let id = document.ensure_id(|| Uuid::new_v4().to_string());
        let mut line = Vec::with_capacity(128);
        document.write_json(&mut line);
        line.push(b'\n');

        let mut guard = self.writer.lock();
        let appender = guard.as_mut().ok_or(StoreError::Disconnected)?;
        appender.append(&line)?;
        Ok(id)
    }

    fn scan_all(&self) -> StoreResult<DocumentCursor> {
        let snapshot_len = self
            .writer
            .lock()
            .as_ref()
            .map(|appender| appender.committed)
            .ok_or(StoreError::Disconnected)?;
        let reader = BufReader::new(File::open(&self.path)?.take(snapshot_len));

        Ok(Box::new(FileCursor {
            reader,
            line_no: 0,
            done: false,
        }))
    }

    fn disconnect(&self) -> StoreResult<()> {
        let Appender { mut file, .. } = self.writer.lock().take().ok_or(StoreError::Disconnected)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// Length of the prefix of `path` made of newline-terminated lines.
fn committed_len(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    let mut committed = 0;
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 || !line.ends_with(b"\n") {
            return Ok(committed);
        }
        committed += read as u64;
    }
}

/// Cursor over a snapshot of the collection file. Stops after the first error.
struct FileCursor {
    reader: BufReader<Take<File>>,
    line_no: usize,
    done: bool,
}

impl Iterator for FileCursor {
    type Item = StoreResult<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    self.line_no += 1;
                    if !line.trim().is_empty() {
                        break;
                    }
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(StoreError::Io(err)));
                }
            }
        }

        match serde_json::from_str::<Map<String, Value>>(&line) {
            Ok(fields) => Some(
                Document::from_value(Value::Object(fields))
                    .map_err(|err| StoreError::Backend(err.to_string())),
            ),
            Err(source) => {
                self.done = true;
                Some(Err(StoreError::Corrupt {
                    line: self.line_no,
                    source,
                }))
            }
        }
    }
}
