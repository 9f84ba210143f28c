//! Reading output

use anyhow::{Context, Result};
use protocol::Reading;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// Destination for decoded readings
pub trait OutputSink {
    /// Called once per successful reading
    fn emit(&mut self, reading: &Reading) -> Result<()>;
}

/// Writes `timestamp,temperature,port` lines
pub struct CsvSink<W: Write> {
    writer: W,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl CsvSink<Box<dyn Write + Send>> {
    /// Sink appending to `path`, or stdout when `path` is None
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match path {
            Some(path) => Box::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open output file: {}", path.display()))?,
            ),
            None => Box::new(io::stdout()),
        };
        Ok(Self::new(writer))
    }
}

impl<W: Write> OutputSink for CsvSink<W> {
    fn emit(&mut self, reading: &Reading) -> Result<()> {
        writeln!(
            self.writer,
            "{},{:.2},{}",
            reading.timestamp_secs, reading.temperature, reading.port
        )
        .context("Failed to write reading")?;
        self.writer.flush().context("Failed to flush output")?;
        Ok(())
    }
}
