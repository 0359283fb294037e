use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};
use time::OffsetDateTime;

use super::{Album, Resource, Song};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub avatar_url: Option<String>,

    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub songs: Vec<Song>,

    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub albums: Vec<Album>,

    #[serde(default, rename = "createAt", with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,

    #[serde(default, rename = "updateAt", with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Resource for Artist {
    const COLLECTION: &'static str = "artist";
    const CREDENTIALS: bool = true;
}
