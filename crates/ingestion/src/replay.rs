//! JSON-lines record replay.
//!
//! One `RawRecord` per line; blank lines and `#` comments are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use contracts::{RawRecord, StreamType};
use tracing::{info, warn};

use crate::error::{IngestionError, Result};

/// Records read from a replay file, split by stream
#[derive(Debug, Clone, Default)]
pub struct ReplayBatch {
    pub gamma: Vec<RawRecord>,
    pub heavy_ion: Vec<RawRecord>,
    /// Lines that failed to parse
    pub skipped: usize,
}

impl ReplayBatch {
    pub fn total_records(&self) -> usize {
        self.gamma.len() + self.heavy_ion.len()
    }

    fn push(&mut self, record: RawRecord) {
        match record.stream {
            StreamType::Gamma => self.gamma.push(record),
            StreamType::HeavyIon => self.heavy_ion.push(record),
        }
    }
}

/// Line-by-line reader of a JSON-lines record file
pub struct RecordReplay<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl RecordReplay<BufReader<File>> {
    /// Open a replay file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        info!(path = %path.display(), "opened record replay");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> RecordReplay<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Read everything, skipping (and logging) unparsable lines
    ///
    /// # Errors
    /// Only IO errors abort the read.
    pub fn read_all(self) -> Result<ReplayBatch> {
        let mut batch = ReplayBatch::default();
        for item in self {
            match item {
                Ok(record) => batch.push(record),
                Err(e @ IngestionError::ParseFailed { .. }) => {
                    warn!(error = %e, "skipping replay line");
                    batch.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }
}

impl<R: BufRead> Iterator for RecordReplay<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;

            let line = self.buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(
                serde_json::from_str(line).map_err(|e| IngestionError::ParseFailed {
                    line: self.line,
                    message: e.to_string(),
                }),
            );
        }
    }
}

/// Write records as JSON lines
pub fn write_records<'a, W, I>(mut writer: W, records: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a RawRecord>,
{
    let mut written = 0;
    for record in records {
        serde_json::to_writer(&mut writer, record).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io::Cursor;

    #[test]
    fn test_read_mixed_streams() {
        let input = r#"
# run 42
{"stream":"gamma","sequence_index":0,"timestamp":{"counter":100}}
{"stream":"heavy_ion","sequence_index":0,"timestamp":{"counter":104}}

{"stream":"gamma","sequence_index":1,"timestamp":{"counter":300}}
"#;
        let batch = RecordReplay::new(Cursor::new(input)).read_all().unwrap();
        assert_eq!(batch.gamma.len(), 2);
        assert_eq!(batch.heavy_ion.len(), 1);
        assert_eq!(batch.skipped, 0);
    }

    #[test]
    fn test_bad_line_is_skipped() {
        let input = "{\"stream\":\"gamma\",\"sequence_index\":0}\nnot json\n";
        let mut replay = RecordReplay::new(Cursor::new(input));

        assert!(replay.next().unwrap().is_ok());
        let err = replay.next().unwrap().unwrap_err();
        assert!(matches!(err, IngestionError::ParseFailed { line: 2, .. }));
        assert!(replay.next().is_none());
    }

    #[test]
    fn test_write_then_read_file() {
        let records = vec![
            RawRecord::counter(StreamType::Gamma, 0, 5, Bytes::from_static(b"\x01\x02")),
            RawRecord::tsc(StreamType::HeavyIon, 0, vec![1, 2, 3, 4, 0], Bytes::new()),
        ];
        let file = tempfile::NamedTempFile::new().unwrap();
        let written = write_records(file.as_file(), &records).unwrap();
        assert_eq!(written, 2);

        let batch = RecordReplay::open(file.path()).unwrap().read_all().unwrap();
        assert_eq!(batch.total_records(), 2);
        assert_eq!(batch.gamma[0].payload, Bytes::from_static(b"\x01\x02"));
        assert_eq!(batch.heavy_ion[0].timestamp, records[1].timestamp);
    }
}
