//! Tabular row shape and file-name helpers

use crate::capture::CapturedArtifact;
use crate::source::Record;
use serde::{Deserialize, Serialize};

/// Column names in file order
pub const COLUMNS: &[&str] = &[
    "term",
    "record_id",
    "owner_id",
    "owner_name",
    "body",
    "link_title",
    "link_description",
    "link_caption",
    "resource_url",
    "local_screenshot_path",
    "artifact_source",
    "spend_lower_bound",
    "spend_upper_bound",
    "impressions_lower_bound",
    "impressions_upper_bound",
    "currency",
];

/// One emitted row: a record, the term that produced it and its artifact
///
/// Field order is the column order of every output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub term: String,
    pub record_id: String,
    pub owner_id: Option<String>,
    pub owner_name: Option<String>,
    pub body: Option<String>,
    pub link_title: Option<String>,
    pub link_description: Option<String>,
    pub link_caption: Option<String>,
    pub resource_url: Option<String>,
    pub local_screenshot_path: Option<String>,
    pub artifact_source: Option<String>,
    pub spend_lower_bound: Option<u64>,
    pub spend_upper_bound: Option<u64>,
    pub impressions_lower_bound: Option<u64>,
    pub impressions_upper_bound: Option<u64>,
    pub currency: Option<String>,
}

impl OutputRow {
    /// Flattens a record and its optional artifact
    pub fn from_record(term: &str, record: &Record, artifact: Option<&CapturedArtifact>) -> Self {
        let spend = record.spend.as_ref();
        let impressions = record.impressions.as_ref();

        Self {
            term: term.to_string(),
            record_id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            owner_name: record.owner_name.clone(),
            body: record.body.clone(),
            link_title: record.link_title.clone(),
            link_description: record.link_description.clone(),
            link_caption: record.link_caption.clone(),
            resource_url: record.resource_url.clone(),
            local_screenshot_path: artifact.map(|a| a.local_path.display().to_string()),
            artifact_source: artifact.map(|a| a.source.as_str().to_string()),
            spend_lower_bound: spend.and_then(|b| b.lower_bound),
            spend_upper_bound: spend.and_then(|b| b.upper_bound),
            impressions_lower_bound: impressions.and_then(|b| b.lower_bound),
            impressions_upper_bound: impressions.and_then(|b| b.upper_bound),
            currency: record.currency.clone(),
        }
    }
}

/// File-system safe form of a term or id
///
/// Characters other than letters, digits, `-` and `_` become `_`; leading
/// and trailing `_` are trimmed. A term with nothing left maps to `item`.
pub fn term_safe(term: &str) -> String {
    let replaced: String = term
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Groups of terms that map to the same [`term_safe`] name
///
/// Terms in a group append to the same per-item file. Groups keep the order
/// in which their first term appears; singletons are left out.
pub fn shared_item_names(terms: &[String]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for term in terms {
        let safe = term_safe(term);
        match groups.iter_mut().find(|(name, _)| *name == safe) {
            Some((_, members)) => members.push(term.clone()),
            None => groups.push((safe, vec![term.clone()])),
        }
    }
    groups.retain(|(_, members)| members.len() > 1);
    groups
}

/// Artifact file stem for a record found under a term
pub fn artifact_id(term_safe: &str, record_id: &str) -> String {
    format!("{}_{}", term_safe, self::term_safe(record_id))
}
