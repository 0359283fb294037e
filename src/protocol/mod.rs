//! Catalog and account types as served by the REST backend.
//!
//! This module provides type-safe representations of:
//! * Songs ([`song`])
//! * Albums ([`album`])
//! * Artists ([`artist`])
//! * Genres ([`genre`])
//! * Signed-in users ([`user`])
//! * Search results ([`search`])
//!
//! # Wire Format
//!
//! The backend serializes entities as camelCase JSON. Relations are embedded
//! to a varying depth depending on the endpoint, so nested collections
//! default to empty and nested timestamps are optional:
//!
//! ```json
//! {
//!     "id": "b3c1",
//!     "title": "Night Drive",
//!     "coverImgUrl": "https://cdn.example.com/covers/b3c1.jpg",
//!     "fileUrl": "https://cdn.example.com/audio/b3c1.mp3",
//!     "artists": [{ "id": "a1", "name": "Solenne" }],
//!     "genres": [],
//!     "album": null,
//!     "createAt": "2024-11-02T10:15:00.000Z",
//!     "updateAt": "2024-11-02T10:15:00.000Z"
//! }
//! ```

pub mod album;
pub mod artist;
pub mod genre;
pub mod search;
pub mod song;
pub mod user;

pub use album::Album;
pub use artist::Artist;
pub use genre::Genre;
pub use search::SearchResults;
pub use song::Song;
pub use user::{Role, User};

/// A catalog entity listed under a fixed REST collection.
///
/// # Examples
///
/// ```rust
/// use melodia::protocol::{Resource, Song};
///
/// assert_eq!(Song::COLLECTION, "song");
/// ```
pub trait Resource {
    /// Path of the collection endpoint, relative to the API base URL.
    const COLLECTION: &'static str;

    /// Whether listing the collection requires the session cookie.
    const CREDENTIALS: bool = false;
}
