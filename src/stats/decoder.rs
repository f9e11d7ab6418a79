use std::io::BufRead;

use super::raw::RawStatsRecord;
use super::{Error, Result};

/// Upper bound on the number of records reserved up front; the requested count comes from
/// the caller and may far exceed what the stream holds.
pub(super) const PREALLOCATED_RECORDS: usize = 1024;

/// Reads newline-delimited stats documents from a buffered stream.
///
/// Every document must be terminated by `\n`; a stream that ends in the middle of a
/// document is reported as [`Error::UnexpectedEof`] rather than decoded.
#[derive(Debug)]
pub struct StreamDecoder<R> {
    reader: R,
    line: String,
    index: usize,
}

impl<R: BufRead> StreamDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::with_capacity(4096),
            index: 0,
        }
    }

    /// Reads and decodes the next record from the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if reading from the stream fails, [`Error::UnexpectedEof`] if
    /// the stream ends before a full line was read, or [`Error::Decode`] if the line is not a
    /// valid stats document.
    pub fn read_record(&mut self) -> Result<RawStatsRecord> {
        let index = self.index;
        self.line.clear();

        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|source| Error::Read { index, source })?;
        if read == 0 || !self.line.ends_with('\n') {
            return Err(Error::UnexpectedEof { index });
        }

        let record =
            serde_json::from_str(&self.line).map_err(|source| Error::Decode { index, source })?;
        self.index += 1;
        Ok(record)
    }

    /// Reads exactly `count` records.
    ///
    /// Either all `count` records are returned, or the first error encountered; records
    /// decoded before the failure are discarded.
    pub fn read_records(&mut self, count: usize) -> Result<Vec<RawStatsRecord>> {
        let mut out = Vec::with_capacity(count.min(PREALLOCATED_RECORDS));
        for _ in 0..count {
            out.push(self.read_record()?);
        }
        Ok(out)
    }

    /// Returns the number of records decoded so far.
    pub fn records_read(&self) -> usize {
        self.index
    }
}
