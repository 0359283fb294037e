use std::fmt;

use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};
use time::OffsetDateTime;

use super::{Album, Artist, Genre, Resource};

/// A playable song.
///
/// Songs are immutable value data once fetched. Two songs are the same song
/// for playback purposes when their `id`s match; see [`Song::is`].
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub cover_img_url: String,

    /// Location of the audio file.
    #[serde(default)]
    pub file_url: String,

    /// Credited artists, main artist first.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub genres: Vec<Genre>,

    #[serde(default)]
    pub album: Option<Album>,

    #[serde(default, rename = "createAt", with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,

    #[serde(default, rename = "updateAt", with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Resource for Song {
    const COLLECTION: &'static str = "song";
}

impl Song {
    /// Whether `other` denotes the same song.
    #[must_use]
    pub fn is(&self, other: &Song) -> bool {
        self.id == other.id
    }

    /// Names of the credited artists, in credit order.
    pub fn artist_names(&self) -> impl Iterator<Item = &str> {
        self.artists.iter().map(|artist| artist.name.as_str())
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let artists = self.artist_names().collect::<Vec<_>>();
        if artists.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} - {}", artists.join(", "), self.title)
        }
    }
}
