//! Edge stream readers and writers.
//!
//! Two on-disk formats are supported. The binary format stores one
//! 12-byte record per edge: `tail: u32`, `head: u32`, `weight: f32`, all
//! little-endian, read and written record by record until end of file.
//! The text format stores one `tail head` pair per line, whitespace
//! separated; anything after the second field on a line is ignored.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use crate::{
    error::{CoreError, Result},
    ids::Vid,
};

/// On-disk edge encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeFormat {
    /// 12-byte binary records.
    Binary,
    /// Whitespace-separated text lines.
    Text,
}

impl EdgeFormat {
    /// Guesses the format from a file extension: `.dat` is binary, `.net`
    /// and `.txt` are text.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "dat" => Some(Self::Binary),
            "net" | "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Pull-based edge source.
pub trait EdgeReader {
    /// Reads the next edge, or `None` at end of stream.
    ///
    /// # Errors
    /// [`CoreError::Io`] on malformed input or read failure.
    fn read_edge(&mut self) -> Result<Option<(Vid, Vid)>>;
}

/// Push-based edge sink.
pub trait EdgeWriter {
    /// Appends one edge.
    ///
    /// # Errors
    /// [`CoreError::Io`] on write failure.
    fn write_edge(&mut self, tail: Vid, head: Vid) -> Result<()>;
}

/// Reader for the 12-byte binary record format.
pub struct BinaryEdgeReader<R> {
    reader: R,
    path: PathBuf,
}

impl BinaryEdgeReader<BufReader<File>> {
    /// # Errors
    /// [`CoreError::Io`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| CoreError::io(path, source))?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
        })
    }
}

impl<R: Read> EdgeReader for BinaryEdgeReader<R> {
    fn read_edge(&mut self) -> Result<Option<(Vid, Vid)>> {
        let mut record = [0u8; 12];
        match self.reader.read_exact(&mut record) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(source) => return Err(CoreError::io(&self.path, source)),
        }
        let tail = u32::from_le_bytes(record[0..4].try_into().expect("4-byte field"));
        let head = u32::from_le_bytes(record[4..8].try_into().expect("4-byte field"));
        // The weight field is carried for format compatibility only.
        Ok(Some((Vid(tail), Vid(head))))
    }
}

/// Writer for the 12-byte binary record format; every record carries unit
/// weight.
pub struct BinaryEdgeWriter<W> {
    writer: W,
    path: PathBuf,
}

impl BinaryEdgeWriter<BufWriter<File>> {
    /// # Errors
    /// [`CoreError::Io`] when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| CoreError::io(path, source))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }
}

impl<W: Write> EdgeWriter for BinaryEdgeWriter<W> {
    fn write_edge(&mut self, tail: Vid, head: Vid) -> Result<()> {
        let mut record = [0u8; 12];
        record[0..4].copy_from_slice(&tail.0.to_le_bytes());
        record[4..8].copy_from_slice(&head.0.to_le_bytes());
        record[8..12].copy_from_slice(&1.0f32.to_le_bytes());
        self.writer
            .write_all(&record)
            .map_err(|source| CoreError::io(&self.path, source))
    }
}

/// Reader for the `tail head` text format.
pub struct TextEdgeReader<R> {
    lines: io::Lines<R>,
    path: PathBuf,
}

impl TextEdgeReader<BufReader<File>> {
    /// # Errors
    /// [`CoreError::Io`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| CoreError::io(path, source))?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            path: path.to_path_buf(),
        })
    }
}

impl<R: BufRead> TextEdgeReader<R> {
    /// Wraps an already buffered reader, e.g. an in-memory cursor.
    #[must_use]
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            path: PathBuf::from("<reader>"),
        }
    }
}

impl<R: BufRead> EdgeReader for TextEdgeReader<R> {
    fn read_edge(&mut self) -> Result<Option<(Vid, Vid)>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line.map_err(|source| CoreError::io(&self.path, source))?;
            let mut fields = line.split_whitespace();
            let Some(tail) = fields.next() else {
                continue; // blank line
            };
            let head = fields
                .next()
                .ok_or_else(|| self.malformed(&line))?;
            let tail: u32 = tail.parse().map_err(|_| self.malformed(&line))?;
            let head: u32 = head.parse().map_err(|_| self.malformed(&line))?;
            return Ok(Some((Vid(tail), Vid(head))));
        }
    }
}

impl<R> TextEdgeReader<R> {
    fn malformed(&self, line: &str) -> CoreError {
        CoreError::io(
            &self.path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed edge line `{line}`"),
            ),
        )
    }
}

/// Writer for the `tail head` text format.
pub struct TextEdgeWriter<W> {
    writer: W,
    path: PathBuf,
}

impl TextEdgeWriter<BufWriter<File>> {
    /// # Errors
    /// [`CoreError::Io`] when the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| CoreError::io(path, source))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }
}

impl<W: Write> EdgeWriter for TextEdgeWriter<W> {
    fn write_edge(&mut self, tail: Vid, head: Vid) -> Result<()> {
        writeln!(self.writer, "{} {}", tail.0, head.0)
            .map_err(|source| CoreError::io(&self.path, source))
    }
}

/// Opens `path` with the requested format.
///
/// # Errors
/// [`CoreError::Io`] when the file cannot be opened.
pub fn open_edge_reader(path: &Path, format: EdgeFormat) -> Result<Box<dyn EdgeReader>> {
    Ok(match format {
        EdgeFormat::Binary => Box::new(BinaryEdgeReader::open(path)?),
        EdgeFormat::Text => Box::new(TextEdgeReader::open(path)?),
    })
}

/// Creates `path` with the requested format.
///
/// # Errors
/// [`CoreError::Io`] when the file cannot be created.
pub fn create_edge_writer(path: &Path, format: EdgeFormat) -> Result<Box<dyn EdgeWriter>> {
    Ok(match format {
        EdgeFormat::Binary => Box::new(BinaryEdgeWriter::create(path)?),
        EdgeFormat::Text => Box::new(TextEdgeWriter::create(path)?),
    })
}
