//! Client-side view of the catalog.
//!
//! [`Catalog`] caches songs, albums, artists and genres fetched from the
//! backend and keeps the cache in step with the changes it makes: created
//! entities are appended, updated albums are replaced and deleted songs are
//! removed once the backend confirms. All credentialed calls go through
//! [`Gateway::call`], so an expired session is renewed transparently.
//!
//! The catalog is an explicit context object: whoever drives the application
//! owns it and lends it to the parts that need it.
//!
//! # Example
//!
//! ```rust
//! use melodia::{catalog::Catalog, gateway::Gateway};
//!
//! let gateway = Gateway::new(&config)?;
//! let mut catalog = Catalog::default();
//! catalog.fetch_songs(&gateway).await?;
//! for song in catalog.songs() {
//!     println!("{song}");
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::{
    error::Result,
    gateway::Gateway,
    http::{Field, Request, Transport},
    protocol::{Album, Artist, Genre, Resource, Song},
};

/// A song to upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSong {
    pub title: String,
    pub artist_id: String,
    pub cover_image: PathBuf,
    pub audio_file: PathBuf,
}

/// An album to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAlbum {
    pub title: String,
    pub artist_id: String,
    pub release_date: String,
    pub cover_image: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    songs: Vec<Song>,
    albums: Vec<Album>,
    artists: Vec<Artist>,
    genres: Vec<Genre>,
}

impl Catalog {
    #[must_use]
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    #[must_use]
    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    #[must_use]
    pub fn artists(&self) -> &[Artist] {
        &self.artists
    }

    #[must_use]
    pub fn genres(&self) -> &[Genre] {
        &self.genres
    }

    #[must_use]
    pub fn song(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|song| song.id == id)
    }

    async fn list<T, R>(gateway: &Gateway<T>) -> Result<Vec<R>>
    where
        T: Transport,
        R: Resource + DeserializeOwned,
    {
        let request = Request::get(R::COLLECTION);
        let list: Vec<R> = if R::CREDENTIALS {
            gateway.call_json(&request).await?
        } else {
            gateway.send_json(&request.anonymous()).await?
        };

        debug!("fetched {} entries from /{}", list.len(), R::COLLECTION);
        Ok(list)
    }

    /// Replaces the cached songs with the backend's.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. The cache is left untouched.
    pub async fn fetch_songs<T: Transport>(&mut self, gateway: &Gateway<T>) -> Result<&[Song]> {
        self.songs = Self::list(gateway).await?;
        Ok(&self.songs)
    }

    /// Replaces the cached albums with the backend's.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. The cache is left untouched.
    pub async fn fetch_albums<T: Transport>(&mut self, gateway: &Gateway<T>) -> Result<&[Album]> {
        self.albums = Self::list(gateway).await?;
        Ok(&self.albums)
    }

    /// Replaces the cached artists with the backend's.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. The cache is left untouched.
    pub async fn fetch_artists<T: Transport>(
        &mut self,
        gateway: &Gateway<T>,
    ) -> Result<&[Artist]> {
        self.artists = Self::list(gateway).await?;
        Ok(&self.artists)
    }

    /// Replaces the cached genres with the backend's.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. The cache is left untouched.
    pub async fn fetch_genres<T: Transport>(&mut self, gateway: &Gateway<T>) -> Result<&[Genre]> {
        self.genres = Self::list(gateway).await?;
        Ok(&self.genres)
    }

    /// Uploads a new song with its cover image and audio file.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read or the upload fails.
    pub async fn create_song<T: Transport>(
        &mut self,
        gateway: &Gateway<T>,
        song: &NewSong,
    ) -> Result<&Song> {
        let fields = vec![
            Field::text("title", &song.title),
            Field::text("artistId", &song.artist_id),
            Field::from_path("coverImg", &song.cover_image).await?,
            Field::from_path("mp3File", &song.audio_file).await?,
        ];
        let request = Request::post("song/create-song").multipart(fields);

        let created: Song = gateway.call_json(&request).await?;
        info!("created song {created}");

        self.songs.push(created);
        Ok(&self.songs[self.songs.len() - 1])
    }

    /// Sets the genres of a song.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_song_genres<T, S>(
        &mut self,
        gateway: &Gateway<T>,
        song_id: &str,
        genre_ids: &[S],
    ) -> Result<()>
    where
        T: Transport,
        S: AsRef<str>,
    {
        let genre_ids: Vec<&str> = genre_ids.iter().map(|id| id.as_ref()).collect();
        let request = Request::patch(format!("song/{song_id}/update-genres"))
            .json(&serde_json::json!({ "genreIds": genre_ids }))?;
        gateway.call(&request).await?;

        // Mirror the change for genres that are known locally.
        let genres = genre_ids
            .iter()
            .filter_map(|id| self.genres.iter().find(|genre| genre.id == *id))
            .cloned()
            .collect::<Vec<_>>();
        if genres.len() == genre_ids.len() {
            if let Some(song) = self.songs.iter_mut().find(|song| song.id == song_id) {
                song.genres = genres;
            }
        }

        info!("updated genres of song {song_id}");
        Ok(())
    }

    /// Replaces the audio file of a song.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the upload fails.
    pub async fn update_song_file<T: Transport>(
        &mut self,
        gateway: &Gateway<T>,
        song_id: &str,
        audio_file: &Path,
    ) -> Result<()> {
        let request = Request::put(format!("song/{song_id}/file"))
            .multipart(vec![Field::from_path("mp3File", audio_file).await?]);
        gateway.call(&request).await?;

        info!("replaced audio of song {song_id}");
        Ok(())
    }

    /// Deletes a song.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. The song stays cached.
    pub async fn delete_song<T: Transport>(
        &mut self,
        gateway: &Gateway<T>,
        song_id: &str,
    ) -> Result<()> {
        gateway
            .call(&Request::delete(format!("song/{song_id}")))
            .await?;
        self.songs.retain(|song| song.id != song_id);

        info!("deleted song {song_id}");
        Ok(())
    }

    /// Creates an album, optionally with a cover image.
    ///
    /// # Errors
    ///
    /// Returns an error if the cover cannot be read or the request fails.
    pub async fn create_album<T: Transport>(
        &mut self,
        gateway: &Gateway<T>,
        album: &NewAlbum,
    ) -> Result<&Album> {
        let mut fields = vec![
            Field::text("title", &album.title),
            Field::text("artistId", &album.artist_id),
            Field::text("releaseDate", &album.release_date),
        ];
        if let Some(ref cover_image) = album.cover_image {
            fields.push(Field::from_path("coverImg", cover_image).await?);
        }

        let request = Request::post(Album::COLLECTION).multipart(fields);
        let created: Album = gateway.call_json(&request).await?;
        info!("created album {}", created.title);

        self.albums.push(created);
        Ok(&self.albums[self.albums.len() - 1])
    }

    /// Adds a song to an album, returning the updated album.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn add_song_to_album<T: Transport>(
        &mut self,
        gateway: &Gateway<T>,
        album_id: &str,
        song_id: &str,
    ) -> Result<&Album> {
        let request = Request::post("album/add-song").json(&serde_json::json!({
            "albumId": album_id,
            "songId": song_id,
        }))?;
        let updated: Album = gateway.call_json(&request).await?;

        let index = match self.albums.iter().position(|album| album.id == album_id) {
            Some(index) => {
                self.albums[index] = updated;
                index
            }
            None => {
                self.albums.push(updated);
                self.albums.len() - 1
            }
        };

        info!("added song {song_id} to album {album_id}");
        Ok(&self.albums[index])
    }
}
