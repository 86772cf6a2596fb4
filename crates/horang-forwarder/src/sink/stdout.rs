//! Line-oriented sink for local runs

use super::Sink;
use async_trait::async_trait;
use horang_common::{Batch, HorangError, Result};
use std::io::{self, Stdout, Write};
use std::sync::Mutex;

/// Writes each record as one JSON line
pub struct StreamSink<W: Write + Send> {
    writer: Mutex<W>,
}

/// The console flavour
pub type StdoutSink = StreamSink<Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl<W: Write + Send> Sink for StreamSink<W> {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn deliver(&self, batch: &Batch) -> Result<bool> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| HorangError::sink("output writer poisoned"))?;
        for record in &batch.records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(true)
    }
}
