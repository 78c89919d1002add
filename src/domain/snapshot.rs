//! Review documents as stored in the search index.
//!
//! The indexer writes integer columns as decimal strings and timestamps as
//! `YYYY-MM-DD HH:MM:SS`, so deserialization accepts both shapes.

use serde::{Deserialize, Deserializer, Serialize, de};
use time::{PrimitiveDateTime, macros::format_description};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    #[serde(deserialize_with = "int_or_string")]
    pub review_id: i64,
    #[serde(deserialize_with = "int_or_string")]
    pub store_id: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub order_id: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub user_id: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub sku_id: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub spu_id: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub score: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub service_score: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub express_score: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub pic_info: String,
    #[serde(default)]
    pub video_info: String,
    #[serde(default, deserialize_with = "int_or_string")]
    pub anonymous: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub has_media: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub has_reply: i64,
    #[serde(default, deserialize_with = "int_or_string")]
    pub status: i64,
    #[serde(default, deserialize_with = "index_datetime")]
    pub create_at: Option<String>,
    #[serde(default, deserialize_with = "index_datetime")]
    pub update_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntRepr {
    Int(i64),
    Text(String),
}

fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match IntRepr::deserialize(deserializer)? {
        IntRepr::Int(value) => Ok(value),
        IntRepr::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|err| de::Error::custom(format!("invalid integer `{text}`: {err}"))),
    }
}

/// Validates the index timestamp format and keeps it as-is for display.
fn index_datetime<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(text) if text.is_empty() => Ok(None),
        Some(text) => {
            let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
            PrimitiveDateTime::parse(&text, format)
                .map_err(|err| de::Error::custom(format!("invalid timestamp `{text}`: {err}")))?;
            Ok(Some(text))
        }
    }
}
