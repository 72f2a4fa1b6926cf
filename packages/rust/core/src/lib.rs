//! Batch enrichment for docenrich.
//!
//! Ties the batch API, the scoring endpoint and the offset machinery into
//! a single pipeline run per batch, and runs those pipelines on a bounded
//! worker pool.

pub mod annotate;
pub mod extract;
pub mod offsets;
pub mod pipeline;
pub mod worker;

pub use pipeline::{
    BatchObserver, BatchPhase, BatchPipeline, BatchReport, DocumentOutcome, EnrichedDocument,
    SilentObserver, UploadOutcome, enrich_document,
};
pub use worker::{EnrichmentQueue, JobTicket, QueueStats, WorkerPool, spawn_workers};

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use docenrich_batches::{BatchClient, DocumentStream, StreamItem};
    use docenrich_scoring::ScoringClient;
    use docenrich_shared::{
        BatchApiSettings, BatchRef, Document, Feature, FieldProperties, Location,
        ScoringSettings, Timeouts,
    };
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const SAMPLE_BATCH: &str = include_str!("../../../../fixtures/batch-sample.ndjson");

    const BATCH_PATH: &str = "/v2/projects/p1/collections/c1/batches/b1";
    const SCORING_PATH: &str = "/ml/v4/deployments/dep-1/predictions";

    fn timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(2),
            request: Duration::from_secs(5),
        }
    }

    fn batch() -> BatchRef {
        BatchRef {
            project_id: "p1".into(),
            collection_id: "c1".into(),
            batch_id: "b1".into(),
            version: "2023-03-31".into(),
        }
    }

    fn pipeline_for(server: &MockServer) -> BatchPipeline {
        let store = BatchClient::new(&BatchApiSettings {
            base_url: url::Url::parse(&server.uri()).unwrap(),
            api_key: "key".into(),
            timeouts: timeouts(),
        })
        .unwrap();
        let scorer = ScoringClient::new(&ScoringSettings {
            endpoint: format!("{}{SCORING_PATH}", server.uri()),
            api_token: "token".into(),
            timeouts: timeouts(),
        })
        .unwrap();
        BatchPipeline::new(Arc::new(store), Arc::new(scorer))
    }

    fn gzip_documents(documents: &[Document]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for document in documents {
            serde_json::to_writer(&mut encoder, document).unwrap();
            encoder.write_all(b"\n").unwrap();
        }
        encoder.finish().unwrap()
    }

    /// Pull the gzip payload out of a multipart upload body.
    fn uploaded_documents(body: &[u8]) -> Vec<Document> {
        let start = body
            .windows(2)
            .position(|w| w == [0x1f, 0x8b])
            .expect("gzip payload in multipart body");
        DocumentStream::new(&body[start..])
            .filter_map(|item| match item {
                Ok(StreamItem::Document(d)) => Some(d),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_hello_world_over_http() {
        let server = MockServer::start().await;

        let input = Document {
            document_id: "doc-1".into(),
            artifact: Some("hello world".into()),
            features: vec![Feature::Field {
                location: Location::new(0, 5),
                properties: FieldProperties {
                    field_name: "text".into(),
                    field_index: 0,
                    field_type: None,
                },
            }],
        };

        Mock::given(method("GET"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_documents(&[input])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SCORING_PATH))
            .and(body_json(json!({
                "input_data": [{"fields": ["text"], "values": [["hello"]]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{
                    "fields": ["entities"],
                    "values": [[{
                        "mentions": [{
                            "span": {"begin": 0, "end": 5, "text": "hello"},
                            "type": "GREETING",
                            "confidence": 0.9
                        }]
                    }]]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"accepted": true})))
            .expect(1)
            .mount(&server)
            .await;

        let report = pipeline_for(&server).run(&batch()).await;
        assert!(report.fetched);
        assert!(report.uploaded());
        assert_eq!(report.annotated, 1);

        let requests = server.received_requests().await.unwrap();
        let upload = requests
            .iter()
            .find(|r| r.method.as_str() == "POST" && r.url.path() == BATCH_PATH)
            .unwrap();
        let output = uploaded_documents(&upload.body);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].document_id, "doc-1");

        match &output[0].features[..] {
            [Feature::Annotation { location, properties }] => {
                assert_eq!(*location, Some(Location::new(0, 5)));
                assert_eq!(properties.entity_type.as_deref(), Some("GREETING"));
                assert_eq!(properties.entity_text.as_deref(), Some("hello"));
                assert_eq!(properties.confidence, 0.9);
            }
            other => panic!("unexpected features: {other:?}"),
        }
    }

    fn gzip_text(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn scoring_reply(mentions: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [{"fields": ["entities"], "values": [[{"mentions": mentions}]]}]
        }))
    }

    #[tokio::test]
    async fn test_sample_batch_fixture() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_text(SAMPLE_BATCH)))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SCORING_PATH))
            .and(body_json(json!({"input_data": [{"fields": ["text"], "values": [["hello"]]}]})))
            .respond_with(scoring_reply(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SCORING_PATH))
            .and(body_json(json!({
                "input_data": [{"fields": ["text"], "values": [["\u{1F600} Bob met Alice"]]}]
            })))
            .respond_with(scoring_reply(json!([
                {"span": {"begin": 2, "end": 5, "text": "Bob"}, "type": "Person", "confidence": 0.8},
                {"span": {"begin": 10, "end": 15, "text": "Alice"}, "type": "Person", "confidence": 0.7}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"accepted": true})))
            .expect(1)
            .mount(&server)
            .await;

        let report = pipeline_for(&server).run(&batch()).await;
        assert_eq!(report.documents, 3);
        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.annotated, 3);
        assert_eq!(report.noticed, 0);

        let requests = server.received_requests().await.unwrap();
        let upload = requests
            .iter()
            .find(|r| r.method.as_str() == "POST" && r.url.path() == BATCH_PATH)
            .unwrap();
        let output = uploaded_documents(&upload.body);
        let ids: Vec<&str> = output.iter().map(|d| d.document_id.as_str()).collect();
        assert_eq!(ids, vec!["doc-hello", "doc-emoji", "doc-no-text"]);
        assert!(output.iter().all(|d| d.artifact.is_none()));

        assert!(output[0].features.is_empty());
        let locations: Vec<Option<Location>> =
            output[1].features.iter().map(Feature::location).collect();
        // the emoji before "Bob" shifts every later offset by one code unit
        assert_eq!(
            locations,
            vec![Some(Location::new(9, 12)), Some(Location::new(17, 22))]
        );
        assert!(output[2].features.is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_uploads_exactly_one_fallback() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SCORING_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"accepted": true})))
            .expect(1)
            .mount(&server)
            .await;

        let report = pipeline_for(&server).run(&batch()).await;
        assert!(!report.fetched);
        assert!(report.uploaded());
    }

    #[tokio::test]
    async fn test_scoring_outage_yields_notices() {
        let server = MockServer::start().await;

        let documents: Vec<Document> = ["a", "b"]
            .iter()
            .map(|id| Document {
                document_id: (*id).into(),
                artifact: Some("some text".into()),
                features: vec![Feature::Field {
                    location: Location::new(0, 4),
                    properties: FieldProperties {
                        field_name: "text".into(),
                        field_index: 0,
                        field_type: None,
                    },
                }],
            })
            .collect();

        Mock::given(method("GET"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_documents(&documents)))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SCORING_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(BATCH_PATH))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"accepted": true})))
            .expect(1)
            .mount(&server)
            .await;

        let report = pipeline_for(&server).run(&batch()).await;
        assert_eq!(report.noticed, 2);

        let requests = server.received_requests().await.unwrap();
        let upload = requests
            .iter()
            .find(|r| r.method.as_str() == "POST" && r.url.path() == BATCH_PATH)
            .unwrap();
        let output = uploaded_documents(&upload.body);
        assert_eq!(output.len(), 2);
        assert!(
            output
                .iter()
                .all(|d| matches!(&d.features[..], [Feature::Notice { .. }]))
        );
    }
}
