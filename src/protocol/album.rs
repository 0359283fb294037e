use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};
use time::OffsetDateTime;

use super::{Artist, Resource, Song};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub cover_img_url: String,

    /// Release date as sent by the backend. Kept verbatim: the backend
    /// accepts both plain dates and full timestamps.
    #[serde(default)]
    pub release_date: Option<String>,

    #[serde(default)]
    pub artist: Option<Artist>,

    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub songs: Vec<Song>,

    #[serde(default, rename = "createAt", with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,

    #[serde(default, rename = "updateAt", with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Resource for Album {
    const COLLECTION: &'static str = "album";
}
