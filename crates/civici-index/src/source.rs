//! Row source: streams delimited records from the input file
//!
//! Rows come out one at a time in file order; nothing beyond the current
//! record is kept in memory. `None` from the iterator is a clean end of
//! stream, `Some(Err(_))` a fatal read error after which the source is
//! exhausted. The underlying file is closed when the source is dropped.
//!
//! The csv reader drops empty lines without reporting them. They still count
//! as rows here, so the header is found at the same line number whether or
//! not the preamble contains blank lines.

use crate::error::{IndexError, Result};
use csv::{ByteRecord, Reader, ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// One physical row of the input
#[derive(Debug, Clone)]
pub struct SourceRow {
    /// 0-based position among all rows, preamble and blank lines included
    pub index: u64,
    pub record: StringRecord,
}

/// Pull-based, non-restartable sequence of input rows
pub struct RowSource<R: Read> {
    reader: Reader<BlankLineTracker<R>>,
    next_index: u64,
    finished: bool,
}

impl RowSource<Box<dyn Read + Send>> {
    /// Open `path`, decompressing it when the extension is `.gz`
    pub fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).map_err(|source| IndexError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let compressed = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

        let reader: Box<dyn Read + Send> = if compressed {
            debug!(path = %path.display(), "Reading gzip-compressed input");
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(file)
        };

        Ok(Self::from_reader(reader, delimiter))
    }
}

impl<R: Read> RowSource<R> {
    /// Wrap any reader. Rows may differ in width; quoting follows RFC 4180.
    pub fn from_reader(reader: R, delimiter: u8) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(BlankLineTracker::new(reader, delimiter));

        Self {
            reader,
            next_index: 0,
            finished: false,
        }
    }

    /// Number of rows seen so far, blank lines included
    pub fn rows_read(&self) -> u64 {
        self.next_index
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = Result<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut bytes = ByteRecord::new();
        match self.reader.read_byte_record(&mut bytes) {
            Ok(true) => {
                let consumed = self.reader.position().byte();
                self.next_index += self.reader.get_mut().take_blank_lines_before(consumed);

                let row = SourceRow {
                    index: self.next_index,
                    record: StringRecord::from_byte_record_lossy(bytes),
                };
                self.next_index += 1;
                Some(Ok(row))
            },
            Ok(false) => {
                self.finished = true;
                None
            },
            Err(source) => {
                self.finished = true;
                Some(Err(IndexError::Input {
                    row: self.next_index,
                    source,
                }))
            },
        }
    }
}

/// Where the scanner is relative to csv's record grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    LineStart,
    /// After a `\r` that ended a line; a following `\n` belongs to it
    AfterCr,
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Pass-through reader that records the byte offset of every line the csv
/// reader will skip as empty. Quoted newlines are not line breaks.
struct BlankLineTracker<R> {
    inner: R,
    delimiter: u8,
    offset: u64,
    state: LineState,
    blank_lines: VecDeque<u64>,
}

impl<R> BlankLineTracker<R> {
    fn new(inner: R, delimiter: u8) -> Self {
        Self {
            inner,
            delimiter,
            offset: 0,
            state: LineState::LineStart,
            blank_lines: VecDeque::new(),
        }
    }

    /// Count and forget the blank lines that start before byte `end`
    fn take_blank_lines_before(&mut self, end: u64) -> u64 {
        let mut count = 0;
        while self.blank_lines.front().is_some_and(|&offset| offset < end) {
            self.blank_lines.pop_front();
            count += 1;
        }
        count
    }

    fn observe(&mut self, byte: u8) {
        let mut state = self.state;

        if state == LineState::AfterCr {
            if byte == b'\n' {
                self.state = LineState::LineStart;
                return;
            }
            state = LineState::LineStart;
        }

        if state == LineState::LineStart {
            if byte == b'\n' || byte == b'\r' {
                self.blank_lines.push_back(self.offset);
                self.state = if byte == b'\r' {
                    LineState::AfterCr
                } else {
                    LineState::LineStart
                };
                return;
            }
            state = LineState::FieldStart;
        }

        self.state = match state {
            LineState::FieldStart if byte == b'"' => LineState::Quoted,
            LineState::Quoted if byte == b'"' => LineState::QuoteInQuoted,
            LineState::Quoted => LineState::Quoted,
            LineState::QuoteInQuoted if byte == b'"' => LineState::Quoted,
            _ => self.unquoted(byte),
        };
    }

    fn unquoted(&self, byte: u8) -> LineState {
        match byte {
            b'\n' => LineState::LineStart,
            b'\r' => LineState::AfterCr,
            b if b == self.delimiter => LineState::FieldStart,
            _ => LineState::Unquoted,
        }
    }
}

impl<R: Read> Read for BlankLineTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for &byte in &buf[..n] {
            self.observe(byte);
            self.offset += 1;
        }
        Ok(n)
    }
}
