//! Keyword search across songs, artists and albums.

use crate::{
    error::Result,
    gateway::Gateway,
    http::{Request, Transport},
    protocol::{Album, Artist, SearchResults, Song},
};

/// The single most relevant match, shown above the full result lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BestResult {
    pub id: String,
    pub title: String,
    pub category: &'static str,
    pub image: Option<String>,
    pub file_url: Option<String>,
    pub artists: Vec<String>,
}

impl From<&Song> for BestResult {
    fn from(song: &Song) -> Self {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_owned());
        Self {
            id: song.id.clone(),
            title: song.title.clone(),
            category: "Song",
            image: non_empty(&song.cover_img_url),
            file_url: non_empty(&song.file_url),
            artists: song.artist_names().map(ToOwned::to_owned).collect(),
        }
    }
}

/// Search results arranged for presentation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Results {
    /// The first matching song, if any.
    pub best_result: Option<BestResult>,
    pub tracks: Vec<Song>,
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
}

impl Results {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.artists.is_empty() && self.albums.is_empty()
    }
}

impl From<SearchResults> for Results {
    fn from(results: SearchResults) -> Self {
        Self {
            best_result: results.songs.first().map(BestResult::from),
            tracks: results.songs,
            artists: results.artists,
            albums: results.albums,
        }
    }
}

/// Searches the catalog for `query`.
///
/// A blank query clears the search: it returns `None` without contacting the
/// backend.
///
/// # Errors
///
/// Returns an error if the request fails or the response is malformed.
pub async fn search<T: Transport>(gateway: &Gateway<T>, query: &str) -> Result<Option<Results>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(None);
    }

    let request = Request::get("search").anonymous().query("keyword", query);
    let results: SearchResults = gateway.send_json(&request).await?;
    debug!(
        "search \"{query}\": {} songs, {} artists, {} albums",
        results.songs.len(),
        results.artists.len(),
        results.albums.len()
    );

    Ok(Some(results.into()))
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::gateway::tests::ScriptedTransport;

    #[tokio::test]
    async fn blank_query_skips_request() {
        let transport = ScriptedTransport::new(Vec::new());
        let gateway = Gateway::with_transport(transport.clone());

        assert_eq!(search(&gateway, "   ").await.unwrap(), None);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn first_song_is_best_result() {
        let transport = ScriptedTransport::new([ScriptedTransport::respond(
            StatusCode::OK,
            r#"{
                "songs": [
                    { "id": "s1", "title": "Blue", "coverImgUrl": "", "fileUrl": "https://cdn.example.com/s1.mp3",
                      "artists": [{ "id": "a1", "name": "Mara" }] },
                    { "id": "s2", "title": "Bluer" }
                ],
                "artists": [{ "id": "a1", "name": "Mara" }],
                "albums": null
            }"#,
        )]);
        let gateway = Gateway::with_transport(transport.clone());

        let results = search(&gateway, " blue ").await.unwrap().unwrap();
        let best = results.best_result.unwrap();
        assert_eq!(best.id, "s1");
        assert_eq!(best.category, "Song");
        assert_eq!(best.image, None);
        assert_eq!(best.file_url.as_deref(), Some("https://cdn.example.com/s1.mp3"));
        assert_eq!(best.artists, ["Mara"]);
        assert_eq!(results.tracks.len(), 2);
        assert!(results.albums.is_empty());

        let sent = transport.sent();
        assert_eq!(sent[0].query, [("keyword".to_string(), "blue".to_string())]);
    }

    #[test]
    fn no_songs_no_best_result() {
        let results = Results::from(SearchResults::default());
        assert!(results.best_result.is_none());
        assert!(results.is_empty());
    }
}
