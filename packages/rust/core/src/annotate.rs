//! Annotation assembly: scoring output → document features.

use docenrich_scoring::Mention;
use docenrich_shared::{AnnotationProperties, AnnotationType, EnrichError, Feature, Result};

use crate::extract::TextField;
use crate::offsets::OffsetMap;

/// Turn per-snippet mentions into annotation features on the full artifact.
///
/// `snippets` and `mentions` are positionally aligned with `fields`. Each
/// mention span is translated from code points within its snippet to code
/// units within the artifact, offset by the field's own begin.
pub fn assemble_annotations(
    fields: &[TextField<'_>],
    snippets: &[String],
    mentions: Vec<Vec<Mention>>,
) -> Result<Vec<Feature>> {
    if fields.len() != snippets.len() || snippets.len() != mentions.len() {
        return Err(EnrichError::Scoring(format!(
            "{} mention lists for {} snippets",
            mentions.len(),
            snippets.len()
        )));
    }

    let mut features = Vec::new();
    for ((field, snippet), snippet_mentions) in fields.iter().zip(snippets).zip(mentions) {
        let map = OffsetMap::build(snippet);
        features.extend(snippet_mentions.into_iter().map(|mention| Feature::Annotation {
            location: Some(map.to_utf16(
                mention.span.begin,
                mention.span.end,
                field.location.begin,
            )),
            properties: AnnotationProperties {
                annotation_type: AnnotationType::Entities,
                confidence: mention.confidence,
                entity_type: Some(mention.mention_type),
                entity_text: Some(mention.span.text),
                class_name: None,
            },
        }));
    }

    Ok(features)
}

/// The feature list of a document whose enrichment failed.
pub fn failure_features(error: &EnrichError) -> Vec<Feature> {
    vec![Feature::notice(error.to_string())]
}
