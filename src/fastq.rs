//src/fastq.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{IoContext, Result};

/// Open a text input, transparently decompressing it when the name ends in `.gz`.
pub fn open_maybe_gz<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path).with_path(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// Reduce a FASTQ header (or a classifier's read column) to the bare read id:
/// surrounding whitespace and one leading `@` removed, cut at the first whitespace.
pub fn normalize_read_id(raw: &str) -> &str {
    let s = raw.trim();
    let s = s.strip_prefix('@').unwrap_or(s);
    s.split_whitespace().next().unwrap_or("")
}

/// Borrowed view of the record the reader currently holds.
#[derive(Debug, Clone, Copy)]
pub struct FastqRecord<'a> {
    pub header: &'a str,
    pub seq: &'a str,
}

impl FastqRecord<'_> {
    pub fn read_id(&self) -> &str {
        normalize_read_id(self.header)
    }
}

/// Streaming 4-line record reader. Only one record is held in memory at a
/// time; the line buffers are reused between records.
pub struct FastqReader {
    reader: Box<dyn BufRead>,
    path: PathBuf,
    header: String,
    seq: String,
    separator: String,
    quals: String,
}

impl FastqReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self::from_reader(open_maybe_gz(path)?, path))
    }

    pub fn from_reader<P: AsRef<Path>>(reader: Box<dyn BufRead>, path: P) -> Self {
        Self {
            reader,
            path: path.as_ref().to_path_buf(),
            header: String::new(),
            seq: String::new(),
            separator: String::new(),
            quals: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next group of four lines. A group cut short before its
    /// quality line is treated as the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<FastqRecord<'_>>> {
        self.header.clear();
        self.seq.clear();
        self.separator.clear();
        self.quals.clear();

        // 1) header
        if self.reader.read_line(&mut self.header).with_path(&self.path)? == 0 {
            return Ok(None);
        }
        // 2) sequence, 3) separator
        self.reader.read_line(&mut self.seq).with_path(&self.path)?;
        self.reader.read_line(&mut self.separator).with_path(&self.path)?;
        // 4) quality
        if self.reader.read_line(&mut self.quals).with_path(&self.path)? == 0 {
            return Ok(None);
        }

        Ok(Some(FastqRecord {
            header: self.header.trim_end(),
            seq: self.seq.trim(),
        }))
    }
}
