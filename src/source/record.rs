//! Strict record schema enforced at the fetch boundary
//!
//! The source returns loosely typed JSON objects. Each one is converted into a
//! [`Record`] here: a missing or empty `id` rejects the record, every other
//! field is optional and null-filled when absent or of an unexpected type.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Lower/upper bound pair reported for spend and impressions
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Bounds {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub lower_bound: Option<u64>,

    #[serde(default, deserialize_with = "lenient_u64")]
    pub upper_bound: Option<u64>,
}

/// One entity returned by the source for a work item
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Record {
    /// Globally unique within the source
    #[serde(deserialize_with = "required_id")]
    pub id: String,

    #[serde(
        rename = "page_id",
        alias = "owner_id",
        default,
        deserialize_with = "lenient_string"
    )]
    pub owner_id: Option<String>,

    #[serde(
        rename = "page_name",
        alias = "owner_name",
        default,
        deserialize_with = "lenient_string"
    )]
    pub owner_name: Option<String>,

    #[serde(
        rename = "ad_creative_body",
        alias = "body",
        default,
        deserialize_with = "lenient_string"
    )]
    pub body: Option<String>,

    #[serde(
        rename = "ad_creative_link_title",
        alias = "link_title",
        default,
        deserialize_with = "lenient_string"
    )]
    pub link_title: Option<String>,

    #[serde(
        rename = "ad_creative_link_description",
        alias = "link_description",
        default,
        deserialize_with = "lenient_string"
    )]
    pub link_description: Option<String>,

    #[serde(
        rename = "ad_creative_link_caption",
        alias = "link_caption",
        default,
        deserialize_with = "lenient_string"
    )]
    pub link_caption: Option<String>,

    #[serde(
        rename = "ad_snapshot_url",
        alias = "resource_url",
        default,
        deserialize_with = "lenient_string"
    )]
    pub resource_url: Option<String>,

    #[serde(default, deserialize_with = "lenient_bounds")]
    pub spend: Option<Bounds>,

    #[serde(default, deserialize_with = "lenient_bounds")]
    pub impressions: Option<Bounds>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
}

impl Record {
    /// Converts one raw source object into a record
    ///
    /// # Returns
    ///
    /// * `Ok(Record)` - The object carried a usable `id`
    /// * `Err(String)` - The object was rejected at the boundary
    pub fn from_value(value: Value) -> Result<Self, String> {
        if !value.is_object() {
            return Err(format!("expected a JSON object, got {}", type_name(&value)));
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    /// Text handed to the filter predicate
    ///
    /// The creative body when present, otherwise the link title, description,
    /// caption and owner name joined by spaces. `None` when all are blank.
    pub fn text(&self) -> Option<String> {
        if let Some(body) = non_blank(&self.body) {
            return Some(body.to_string());
        }

        let joined = [
            &self.link_title,
            &self.link_description,
            &self.link_caption,
            &self.owner_name,
        ]
        .iter()
        .filter_map(|field| non_blank(field))
        .collect::<Vec<_>>()
        .join(" ");

        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "record id must be a non-empty string or number, got {}",
            type_name(&other)
        ))),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_bounds<'de, D>(deserializer: D) -> Result<Option<Bounds>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}
