//! Batch enrichment pipeline: fetch → stream → enrich → compress → upload.
//!
//! Nothing here fails outward. A failed download degrades to the fallback
//! payload, a bad line or document shrinks the output, and the upload
//! outcome is only reported.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use docenrich_batches::{BatchStore, BatchWriter, DocumentStream, StreamItem, fallback_payload};
use docenrich_scoring::Scorer;
use docenrich_shared::{BatchRef, Document, Feature, Result};

use crate::annotate::{assemble_annotations, failure_features};
use crate::extract::{snippets, text_fields};

// ---------------------------------------------------------------------------
// Phases and reports
// ---------------------------------------------------------------------------

/// Pipeline states, in the order a batch moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Fetching,
    /// Download failed; a placeholder payload replaces the batch.
    Fallback,
    Streaming,
    Compressing,
    Uploading,
    Done,
}

/// Result of the final upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum UploadOutcome {
    Accepted,
    Failed(String),
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch: BatchRef,
    /// Whether the download succeeded.
    pub fetched: bool,
    /// Documents decoded from the batch.
    pub documents: usize,
    /// Documents that went through scoring (possibly with zero annotations).
    pub annotated: usize,
    /// Documents that ended up with a failure notice.
    pub noticed: usize,
    /// Malformed lines skipped.
    pub skipped_lines: usize,
    /// Enriched documents dropped because they could not be serialized.
    pub unserializable: usize,
    /// The compressed stream broke before its end.
    pub stream_error: bool,
    pub upload: UploadOutcome,
    pub elapsed: Duration,
}

impl BatchReport {
    fn new(batch: &BatchRef) -> Self {
        Self {
            batch: batch.clone(),
            fetched: false,
            documents: 0,
            annotated: 0,
            noticed: 0,
            skipped_lines: 0,
            unserializable: 0,
            stream_error: false,
            upload: UploadOutcome::Failed("not uploaded".into()),
            elapsed: Duration::ZERO,
        }
    }

    pub fn uploaded(&self) -> bool {
        self.upload == UploadOutcome::Accepted
    }
}

/// How a single document came out of enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Scored; carries the number of annotations produced.
    Annotated(usize),
    /// Failed; the document carries one notice feature.
    Noticed,
}

/// An output document and how it was produced.
#[derive(Debug, Clone)]
pub struct EnrichedDocument {
    pub document: Document,
    pub outcome: DocumentOutcome,
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Callback for pipeline progress, for monitoring and tests.
pub trait BatchObserver: Send + Sync {
    /// Called when the pipeline enters a new phase.
    fn phase(&self, batch: &BatchRef, phase: BatchPhase);
    /// Called after each document is enriched.
    fn document(&self, _batch: &BatchRef, _document_id: &str, _outcome: DocumentOutcome) {}
}

/// No-op observer for headless usage.
pub struct SilentObserver;

impl BatchObserver for SilentObserver {
    fn phase(&self, _batch: &BatchRef, _phase: BatchPhase) {}
}

// ---------------------------------------------------------------------------
// Per-document enrichment
// ---------------------------------------------------------------------------

/// Extract, score and assemble one document.
///
/// The output keeps only the document id and the new features: annotations
/// on success, a single notice on failure.
pub async fn enrich_document(scorer: &dyn Scorer, document: Document) -> EnrichedDocument {
    match annotate(scorer, &document).await {
        Ok(features) => EnrichedDocument {
            outcome: DocumentOutcome::Annotated(features.len()),
            document: Document::enriched(document.document_id, features),
        },
        Err(e) => {
            warn!(document_id = %document.document_id, error = %e, "document enrichment failed");
            EnrichedDocument {
                outcome: DocumentOutcome::Noticed,
                document: Document::enriched(document.document_id, failure_features(&e)),
            }
        }
    }
}

async fn annotate(scorer: &dyn Scorer, document: &Document) -> Result<Vec<Feature>> {
    let fields = text_fields(&document.features);
    if fields.is_empty() {
        debug!(document_id = %document.document_id, "no text fields, skipping scoring");
        return Ok(Vec::new());
    }

    let snippets = snippets(document, &fields)?;
    let mentions = scorer.score(&document.document_id, &snippets).await?;
    assemble_annotations(&fields, &snippets, mentions)
}

// ---------------------------------------------------------------------------
// BatchPipeline
// ---------------------------------------------------------------------------

/// One batch enrichment run over explicit store and scorer instances.
pub struct BatchPipeline {
    store: Arc<dyn BatchStore>,
    scorer: Arc<dyn Scorer>,
    observer: Arc<dyn BatchObserver>,
}

impl BatchPipeline {
    pub fn new(store: Arc<dyn BatchStore>, scorer: Arc<dyn Scorer>) -> Self {
        Self {
            store,
            scorer,
            observer: Arc::new(SilentObserver),
        }
    }

    /// Attach a progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run the whole pipeline for `batch`. Always makes at most one upload
    /// attempt and never returns an error.
    #[instrument(skip_all, fields(batch = %batch))]
    pub async fn run(&self, batch: &BatchRef) -> BatchReport {
        let start = Instant::now();
        let mut report = BatchReport::new(batch);

        info!("starting batch enrichment");

        // --- Fetch ---
        self.observer.phase(batch, BatchPhase::Fetching);
        let built = match self.store.fetch(batch).await {
            Ok(compressed) => {
                report.fetched = true;
                self.observer.phase(batch, BatchPhase::Streaming);
                let writer = self.stream(batch, &compressed, &mut report).await;
                self.observer.phase(batch, BatchPhase::Compressing);
                writer.finish()
            }
            Err(e) => {
                warn!(error = %e, "failed to pull batch, uploading fallback payload");
                self.observer.phase(batch, BatchPhase::Fallback);
                self.observer.phase(batch, BatchPhase::Compressing);
                fallback_payload()
            }
        };

        let payload = match built.or_else(|e| {
            warn!(error = %e, "failed to build batch, uploading fallback payload");
            fallback_payload()
        }) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to build fallback payload, nothing uploaded");
                report.upload = UploadOutcome::Failed(e.to_string());
                return self.finish(batch, report, start);
            }
        };

        // --- Upload ---
        self.observer.phase(batch, BatchPhase::Uploading);
        report.upload = match self.store.upload(batch, payload).await {
            Ok(()) => UploadOutcome::Accepted,
            Err(e) => {
                warn!(error = %e, "failed to push batch");
                UploadOutcome::Failed(e.to_string())
            }
        };

        self.finish(batch, report, start)
    }

    /// Decode, enrich and re-encode every document of the payload.
    async fn stream(
        &self,
        batch: &BatchRef,
        compressed: &[u8],
        report: &mut BatchReport,
    ) -> BatchWriter {
        let mut writer = BatchWriter::new();

        for item in DocumentStream::new(compressed) {
            match item {
                Ok(StreamItem::Document(document)) => {
                    report.documents += 1;
                    let enriched = enrich_document(self.scorer.as_ref(), document).await;
                    match enriched.outcome {
                        DocumentOutcome::Annotated(_) => report.annotated += 1,
                        DocumentOutcome::Noticed => report.noticed += 1,
                    }
                    self.observer.document(
                        batch,
                        &enriched.document.document_id,
                        enriched.outcome,
                    );

                    if let Err(e) = writer.push(&enriched.document) {
                        warn!(
                            document_id = %enriched.document.document_id,
                            error = %e,
                            "failed to add document to batch"
                        );
                        report.unserializable += 1;
                    }
                }
                Ok(StreamItem::Malformed { line, error }) => {
                    warn!(line, %error, "failed to parse document, skipping line");
                    report.skipped_lines += 1;
                }
                Err(e) => {
                    warn!(error = %e, "batch stream ended early, keeping documents enriched so far");
                    report.stream_error = true;
                }
            }
        }

        writer
    }

    fn finish(&self, batch: &BatchRef, mut report: BatchReport, start: Instant) -> BatchReport {
        report.elapsed = start.elapsed();
        self.observer.phase(batch, BatchPhase::Done);

        info!(
            fetched = report.fetched,
            documents = report.documents,
            annotated = report.annotated,
            noticed = report.noticed,
            skipped_lines = report.skipped_lines,
            unserializable = report.unserializable,
            stream_error = report.stream_error,
            uploaded = report.uploaded(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch enrichment complete"
        );

        report
    }
}
