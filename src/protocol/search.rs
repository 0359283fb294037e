use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};

use super::{Album, Artist, Song};

/// Matches for a keyword across the catalog, as returned by `GET search`.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SearchResults {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub songs: Vec<Song>,

    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub albums: Vec<Album>,
}
