//! Gzip-compressed payloads
//!
//! Decompression is not incremental, so a gzip file is read exactly once: the
//! whole payload is parsed with the first inner reader that accepts it and the
//! outcome always carries [`FileOffset::Skip`].

use flate2::read::MultiGzDecoder;
use horang_common::FileOffset;
use std::io::Read;
use tracing::debug;

use super::{inner_formats, IncrementalReader, ReadOutcome};
use crate::detect::FileFormat;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipReader;

impl GzipReader {
    /// Decompress every gzip member of `content`
    pub fn decompress(content: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut decoder = MultiGzDecoder::new(content);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        debug!("Decompressed {} -> {} bytes", content.len(), decompressed.len());
        Ok(decompressed)
    }
}

impl IncrementalReader for GzipReader {
    fn format(&self) -> FileFormat {
        FileFormat::Gzip
    }

    fn accepts(&self, content: &[u8]) -> bool {
        content.starts_with(&GZIP_MAGIC)
    }

    fn read(&self, content: &[u8], _offset: u64) -> ReadOutcome {
        if !self.accepts(content) {
            return ReadOutcome::rejected();
        }

        let payload = match Self::decompress(content) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Gzip payload could not be decompressed");
                return ReadOutcome::rejected();
            },
        };

        let Some(inner) = inner_formats()
            .into_iter()
            .find(|reader| reader.accepts(&payload))
        else {
            return ReadOutcome::rejected();
        };

        debug!(inner = %inner.format(), "Reading gzip payload");
        let mut outcome = inner.read(&payload, 0);
        outcome.next = FileOffset::Skip;
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use serde_json::json;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzipped_ndjson() {
        let content = gzip(b"{\"id\":1}\n{\"id\":2}\n");
        let outcome = GzipReader.read(&content, 0);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[1]["id"], json!(2));
        assert_eq!(outcome.next, FileOffset::Skip);
    }

    #[test]
    fn test_gzipped_csv_and_plaintext() {
        let csv = GzipReader.read(&gzip(b"ip,msg\n1.1.1.1,hi\n"), 0);
        assert_eq!(csv.records[0]["msg"], json!("hi"));

        let log = GzipReader.read(&gzip(b"line one\nline two\n"), 0);
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.next, FileOffset::Skip);
    }

    #[test]
    fn test_offset_is_ignored() {
        let outcome = GzipReader.read(&gzip(b"a\nb\n"), 100);
        assert_eq!(outcome.records.len(), 2);
    }

    #[test]
    fn test_corrupt_payload_is_rejected() {
        let mut content = gzip(b"some log line\n");
        content.truncate(6);
        assert!(GzipReader.accepts(&content));
        assert!(GzipReader.read(&content, 0).is_rejected());
    }

    #[test]
    fn test_nested_gzip_is_rejected() {
        let content = gzip(&gzip(b"inner\n"));
        assert!(GzipReader.read(&content, 0).is_rejected());
    }
}
