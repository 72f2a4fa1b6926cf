//! Selection of the text fields submitted for scoring.

use docenrich_shared::{
    Document, EnrichError, Feature, FieldProperties, Location, Result, slice_utf16,
};

/// Field name whose content is scored.
pub const TEXT_FIELD_NAME: &str = "text";

/// A field feature selected for scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextField<'a> {
    pub location: Location,
    pub properties: &'a FieldProperties,
}

/// Keep `text` field features, ordered by `field_index`.
///
/// The order fixes both the submission order to the scorer and how results
/// are attached back. Equal indexes keep their original relative order.
pub fn text_fields(features: &[Feature]) -> Vec<TextField<'_>> {
    let mut fields: Vec<TextField<'_>> = features
        .iter()
        .filter_map(|feature| match feature {
            Feature::Field {
                location,
                properties,
            } if properties.field_name == TEXT_FIELD_NAME => Some(TextField {
                location: *location,
                properties,
            }),
            _ => None,
        })
        .collect();

    fields.sort_by_key(|f| f.properties.field_index);
    fields
}

/// Slice the artifact text covered by each selected field.
pub fn snippets(document: &Document, fields: &[TextField<'_>]) -> Result<Vec<String>> {
    let artifact = document.artifact.as_deref().ok_or_else(|| {
        EnrichError::validation(format!(
            "document {} has text fields but no artifact",
            document.document_id
        ))
    })?;

    fields
        .iter()
        .map(|field| slice_utf16(artifact, field.location).map(str::to_owned))
        .collect()
}
