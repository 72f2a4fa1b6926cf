//! Gzip-compressed NDJSON batch payloads.
//!
//! [`DocumentStream`] decodes a downloaded payload one line at a time;
//! [`BatchWriter`] builds the payload that is uploaded back.

use std::io::{BufRead, BufReader, Read, Write};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use docenrich_shared::{Document, EnrichError, Result};

// ---------------------------------------------------------------------------
// DocumentStream
// ---------------------------------------------------------------------------

/// One decoded line of a batch.
#[derive(Debug)]
pub enum StreamItem {
    Document(Document),
    /// The line was not a valid document; processing continues.
    Malformed { line: usize, error: String },
}

/// Streaming decoder over a gzip-compressed NDJSON payload.
///
/// Yields `Err` at most once, when the compressed stream itself is corrupt;
/// iteration ends after that.
pub struct DocumentStream<R: Read> {
    reader: BufReader<MultiGzDecoder<R>>,
    buf: Vec<u8>,
    line: usize,
    done: bool,
}

impl<R: Read> DocumentStream<R> {
    pub fn new(compressed: R) -> Self {
        Self {
            reader: BufReader::new(MultiGzDecoder::new(compressed)),
            buf: Vec::new(),
            line: 0,
            done: false,
        }
    }
}

impl<R: Read> Iterator for DocumentStream<R> {
    type Item = Result<StreamItem>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line += 1;
                    let line = self.buf.trim_ascii();
                    if line.is_empty() {
                        continue;
                    }
                    let item = match serde_json::from_slice::<Document>(line) {
                        Ok(doc) => StreamItem::Document(doc),
                        Err(e) => StreamItem::Malformed {
                            line: self.line,
                            error: e.to_string(),
                        },
                    };
                    return Some(Ok(item));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(EnrichError::Codec(format!(
                        "corrupt batch stream after line {}: {e}",
                        self.line
                    ))));
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// BatchWriter
// ---------------------------------------------------------------------------

/// Accumulates enriched documents as gzip-compressed NDJSON.
pub struct BatchWriter {
    encoder: GzEncoder<Vec<u8>>,
    documents: usize,
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWriter {
    pub fn new() -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::default()),
            documents: 0,
        }
    }

    /// Append one document as a JSON line.
    ///
    /// A document that fails to serialize leaves the batch untouched.
    pub fn push(&mut self, document: &Document) -> Result<()> {
        let mut line = serde_json::to_vec(document).map_err(|e| {
            EnrichError::parse(format!(
                "failed to serialize document {}: {e}",
                document.document_id
            ))
        })?;
        line.push(b'\n');

        self.encoder
            .write_all(&line)
            .map_err(|e| EnrichError::Codec(format!("failed to compress batch: {e}")))?;
        self.documents += 1;
        Ok(())
    }

    /// Number of documents written so far.
    pub fn len(&self) -> usize {
        self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }

    /// Finish compression. An empty batch becomes a single blank line.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.documents == 0 {
            self.encoder
                .write_all(b"\n")
                .map_err(|e| EnrichError::Codec(format!("failed to compress batch: {e}")))?;
        }
        self.encoder
            .finish()
            .map_err(|e| EnrichError::Codec(format!("failed to finish batch: {e}")))
    }
}

/// Placeholder payload uploaded when the batch could not be built.
pub fn fallback_payload() -> Result<Vec<u8>> {
    BatchWriter::new().finish()
}
