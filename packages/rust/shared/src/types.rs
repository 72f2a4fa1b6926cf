//! Document and feature types exchanged with the collection service.
//!
//! One [`Document`] per NDJSON line. Feature offsets are always UTF-16
//! code-unit positions into the document's `artifact`.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// BatchRef
// ---------------------------------------------------------------------------

/// Coordinates of one enrichment batch in the collection service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchRef {
    pub project_id: String,
    pub collection_id: String,
    pub batch_id: String,
    /// API version string forwarded as the `version` query parameter.
    pub version: String,
}

impl std::fmt::Display for BatchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.project_id, self.collection_id, self.batch_id
        )
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A single document of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    /// Full document text. Omitted from enriched output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Document {
    /// Build an output document carrying only the id and the new features.
    pub fn enriched(document_id: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            document_id: document_id.into(),
            artifact: None,
            features,
        }
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Half-open `[begin, end)` range in UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub begin: usize,
    pub end: usize,
}

impl Location {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }
}

// ---------------------------------------------------------------------------
// Feature
// ---------------------------------------------------------------------------

/// The `type` tag of a feature on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Field,
    Annotation,
    Notice,
}

/// A document feature. Field features always carry a location; notices
/// never do. Annotations left by earlier stages may lack one
/// (`document_classes` covers the whole document).
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Field {
        location: Location,
        properties: FieldProperties,
    },
    Annotation {
        location: Option<Location>,
        properties: AnnotationProperties,
    },
    Notice {
        properties: NoticeProperties,
    },
}

impl Feature {
    pub fn feature_type(&self) -> FeatureType {
        match self {
            Self::Field { .. } => FeatureType::Field,
            Self::Annotation { .. } => FeatureType::Annotation,
            Self::Notice { .. } => FeatureType::Notice,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Field { location, .. } => Some(*location),
            Self::Annotation { location, .. } => *location,
            Self::Notice { .. } => None,
        }
    }

    /// A notice feature stamped with the current time.
    pub fn notice(description: impl Into<String>) -> Self {
        Self::Notice {
            properties: NoticeProperties {
                description: description.into(),
                created_at: Utc::now(),
            },
        }
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.location().is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("Feature", len)?;
        state.serialize_field("type", &self.feature_type())?;
        match self {
            Self::Field {
                location,
                properties,
            } => {
                state.serialize_field("location", location)?;
                state.serialize_field("properties", properties)?;
            }
            Self::Annotation {
                location,
                properties,
            } => {
                if let Some(location) = location {
                    state.serialize_field("location", location)?;
                }
                state.serialize_field("properties", properties)?;
            }
            Self::Notice { properties } => {
                state.serialize_field("properties", properties)?;
            }
        }
        state.end()
    }
}

/// Wire shape before the properties are resolved against the tag.
#[derive(Deserialize)]
struct RawFeature {
    #[serde(rename = "type")]
    kind: FeatureType,
    #[serde(default)]
    location: Option<Location>,
    properties: serde_json::Value,
}

impl<'de> Deserialize<'de> for Feature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawFeature::deserialize(deserializer)?;

        match raw.kind {
            FeatureType::Field => Ok(Self::Field {
                location: raw
                    .location
                    .ok_or_else(|| D::Error::custom("field feature without location"))?,
                properties: serde_json::from_value(raw.properties).map_err(D::Error::custom)?,
            }),
            FeatureType::Annotation => Ok(Self::Annotation {
                location: raw.location,
                properties: serde_json::from_value(raw.properties).map_err(D::Error::custom)?,
            }),
            FeatureType::Notice => Ok(Self::Notice {
                properties: serde_json::from_value(raw.properties).map_err(D::Error::custom)?,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Feature properties
// ---------------------------------------------------------------------------

/// Declared type of a source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Long,
    Double,
    Date,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProperties {
    pub field_name: String,
    #[serde(default)]
    pub field_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    Entities,
    ElementClasses,
    DocumentClasses,
}

/// Entity annotations carry `entity_type`/`entity_text`; class annotations
/// carry `class_name` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationProperties {
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeProperties {
    pub description: String,
    /// Failure time, epoch milliseconds on the wire.
    #[serde(rename = "created", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_feature() {
        let json = r#"{"type":"field","location":{"begin":0,"end":5},"properties":{"field_name":"text","field_index":0,"field_type":"string"}}"#;
        let feature: Feature = serde_json::from_str(json).unwrap();
        match feature {
            Feature::Field {
                location,
                properties,
            } => {
                assert_eq!(location, Location::new(0, 5));
                assert_eq!(properties.field_name, "text");
                assert_eq!(properties.field_type, Some(FieldType::String));
            }
            other => panic!("expected field, got {other:?}"),
        }
    }

    #[test]
    fn unknown_feature_tag_fails() {
        let json = r#"{"type":"highlight","location":{"begin":0,"end":5},"properties":{}}"#;
        assert!(serde_json::from_str::<Feature>(json).is_err());
    }

    #[test]
    fn field_without_location_fails() {
        let json = r#"{"type":"field","properties":{"field_name":"text","field_index":0}}"#;
        let err = serde_json::from_str::<Feature>(json).unwrap_err();
        assert!(err.to_string().contains("without location"));
    }

    #[test]
    fn properties_must_match_tag() {
        let json = r#"{"type":"annotation","location":{"begin":0,"end":5},"properties":{"field_name":"text","field_index":0}}"#;
        assert!(serde_json::from_str::<Feature>(json).is_err());
    }

    #[test]
    fn annotation_serializes_with_wire_names() {
        let feature = Feature::Annotation {
            location: Some(Location::new(3, 8)),
            properties: AnnotationProperties {
                annotation_type: AnnotationType::Entities,
                confidence: 0.5,
                entity_type: Some("ORG".into()),
                entity_text: Some("Acme!".into()),
                class_name: None,
            },
        };
        let value = serde_json::to_value(&feature).unwrap();
        assert_eq!(value["type"], "annotation");
        assert_eq!(value["location"]["begin"], 3);
        assert_eq!(value["properties"]["type"], "entities");
        assert_eq!(value["properties"]["entity_type"], "ORG");
        assert!(value["properties"].get("class_name").is_none());
    }

    #[test]
    fn parses_class_annotations_from_earlier_stages() {
        let json = r#"{"type":"annotation","properties":{"type":"document_classes","class_name":"Slip","confidence":1.0}}"#;
        let feature: Feature = serde_json::from_str(json).unwrap();
        assert_eq!(feature.location(), None);
        match &feature {
            Feature::Annotation { properties, .. } => {
                assert_eq!(properties.annotation_type, AnnotationType::DocumentClasses);
                assert_eq!(properties.class_name.as_deref(), Some("Slip"));
                assert!(properties.entity_type.is_none());
            }
            other => panic!("expected annotation, got {other:?}"),
        }

        let value = serde_json::to_value(&feature).unwrap();
        assert!(value.get("location").is_none());
        assert!(value["properties"].get("entity_text").is_none());

        let json = r#"{"type":"annotation","location":{"begin":0,"end":4},"properties":{"type":"element_classes","class_name":"Header","confidence":0.7}}"#;
        let feature: Feature = serde_json::from_str(json).unwrap();
        assert_eq!(feature.location(), Some(Location::new(0, 4)));
    }

    #[test]
    fn field_index_defaults_to_zero() {
        let json = r#"{"type":"field","location":{"begin":0,"end":5},"properties":{"field_name":"text"}}"#;
        match serde_json::from_str::<Feature>(json).unwrap() {
            Feature::Field { properties, .. } => assert_eq!(properties.field_index, 0),
            other => panic!("expected field, got {other:?}"),
        }
    }

    #[test]
    fn notice_has_no_location_and_millis_timestamp() {
        let created_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let feature = Feature::Notice {
            properties: NoticeProperties {
                description: "scoring failed".into(),
                created_at,
            },
        };
        let value = serde_json::to_value(&feature).unwrap();
        assert_eq!(value["type"], "notice");
        assert!(value.get("location").is_none());
        assert_eq!(value["properties"]["created"], 1_700_000_000_123_i64);

        let back: Feature = serde_json::from_value(value).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn document_ignores_unknown_keys_and_omits_missing_artifact() {
        let json = r#"{"document_id":"d1","artifact":"hello","features":[],"extra":{"a":1}}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.artifact.as_deref(), Some("hello"));

        let out = serde_json::to_string(&Document::enriched("d1", vec![])).unwrap();
        assert_eq!(out, r#"{"document_id":"d1","features":[]}"#);
    }

    #[test]
    fn batch_ref_display() {
        let batch = BatchRef {
            project_id: "p".into(),
            collection_id: "c".into(),
            batch_id: "b".into(),
            version: "2023-03-31".into(),
        };
        assert_eq!(batch.to_string(), "p/c/b");
    }
}
