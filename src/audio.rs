//! Audio output.
//!
//! The [`Player`](crate::player::Player) drives an [`Output`] without knowing
//! how audio is produced. [`Sink`] is the real implementation on top of
//! `rodio`: loading a song only records where its file lives, and the owner
//! of the sink fetches and decodes it with [`Sink::resolve`]. This keeps the
//! player synchronous while downloads happen on the event loop.

use std::{io::Cursor, sync::Arc, time::Duration};

use cpal::traits::{DeviceTrait, HostTrait};
use url::Url;

use crate::{
    error::{Error, Result},
    http,
    protocol::Song,
    volume::Volume,
};

/// Instructions the player gives to the audio device.
pub trait Output {
    /// Replaces whatever is loaded with `song`, paused at its start.
    fn load(&mut self, song: &Song) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn seek(&mut self, position: Duration) -> Result<()>;

    fn set_volume(&mut self, volume: Volume);

    /// Elapsed time within the loaded song.
    fn position(&self) -> Duration;
}

/// Bookkeeping for the song held by a [`Sink`]: where to fetch it, its
/// bytes once fetched and whether its end was reported.
#[derive(Debug, Default)]
struct Slot {
    pending: Option<Url>,
    data: Option<Arc<[u8]>>,
    finished: bool,
}

impl Slot {
    /// Forgets the previous song, even when `song` turns out unplayable.
    fn load(&mut self, song: &Song) -> Result<()> {
        *self = Self::default();

        let url = Url::parse(&song.file_url).map_err(|e| {
            Error::invalid_argument(format!("{song} has no playable file: {e}"))
        })?;
        self.pending = Some(url);
        Ok(())
    }

    fn take_pending(&mut self) -> Option<Url> {
        self.pending.take()
    }

    fn fill(&mut self, data: Arc<[u8]>) {
        self.data = Some(data);
    }

    /// Bytes to decode again when the fetched song has drained from the
    /// device.
    fn rewind(&self, drained: bool) -> Option<Arc<[u8]>> {
        if drained {
            self.data.clone()
        } else {
            None
        }
    }

    fn appended(&mut self) {
        self.finished = false;
    }

    /// `true` the first time a drained device is reported for a fetched song.
    fn take_finished(&mut self, drained: bool) -> bool {
        if self.finished || self.data.is_none() || !drained {
            return false;
        }

        self.finished = true;
        true
    }
}

/// Audio output on the default device.
pub struct Sink {
    sink: rodio::Sink,
    slot: Slot,

    // Dropping the stream stops all output: keep it alive as long as the sink.
    _stream: rodio::OutputStream,
}

impl Sink {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn open(volume: Volume) -> Result<Self> {
        if let Some(device) = cpal::default_host().default_output_device() {
            let name = device.name().unwrap_or_else(|_| "unknown".to_string());
            info!("audio output: {name}");
        }

        let (stream, handle) = rodio::OutputStream::try_default()?;
        let sink = rodio::Sink::try_new(&handle)?;
        sink.pause();
        sink.set_volume(volume.as_ratio());

        Ok(Self {
            sink,
            slot: Slot::default(),
            _stream: stream,
        })
    }

    /// Downloads and decodes the most recently loaded song, if it is not
    /// decoded yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be downloaded or decoded.
    pub async fn resolve(&mut self, client: &http::Client) -> Result<()> {
        let Some(url) = self.slot.take_pending() else {
            return Ok(());
        };

        debug!("downloading {url}");
        let data: Arc<[u8]> = client.download(url).await?.into();
        self.append(&data)?;
        self.slot.fill(data);
        Ok(())
    }

    /// Whether a download is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.pending.is_some()
    }

    /// Returns `true` once after the loaded song played to its end.
    pub fn take_finished(&mut self) -> bool {
        self.slot.take_finished(self.sink.empty())
    }

    fn append(&mut self, data: &Arc<[u8]>) -> Result<()> {
        let decoder = rodio::Decoder::new(Cursor::new(Arc::clone(data)))?;
        self.sink.append(decoder);
        self.slot.appended();
        Ok(())
    }

    /// Decodes the loaded song again if it already played to its end.
    fn rewind_if_drained(&mut self) -> Result<()> {
        if let Some(data) = self.slot.rewind(self.sink.empty()) {
            self.append(&data)?;
        }
        Ok(())
    }
}

impl Output for Sink {
    fn load(&mut self, song: &Song) -> Result<()> {
        self.sink.clear();
        self.slot.load(song)
    }

    fn play(&mut self) -> Result<()> {
        self.rewind_if_drained()?;
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.sink.pause();
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.rewind_if_drained()?;
        if self.sink.empty() {
            // Nothing decoded yet: the song starts at zero anyway.
            return Ok(());
        }
        self.sink.try_seek(position).map_err(Into::into)
    }

    fn set_volume(&mut self, volume: Volume) {
        self.sink.set_volume(volume.as_ratio());
    }

    fn position(&self) -> Duration {
        if self.sink.empty() {
            Duration::ZERO
        } else {
            self.sink.get_pos()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str, file_url: &str) -> Song {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": id,
            "fileUrl": file_url,
        }))
        .unwrap()
    }

    #[test]
    fn unplayable_song_drops_previous_download() {
        let mut slot = Slot::default();
        slot.load(&song("a", "https://cdn.example.com/a.mp3")).unwrap();

        let err = slot.load(&song("b", "")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidArgument);
        assert!(slot.take_pending().is_none());
    }

    #[test]
    fn last_load_wins() {
        let mut slot = Slot::default();
        slot.load(&song("a", "https://cdn.example.com/a.mp3")).unwrap();
        slot.load(&song("b", "https://cdn.example.com/b.mp3")).unwrap();

        assert_eq!(
            slot.take_pending().map(String::from),
            Some("https://cdn.example.com/b.mp3".to_string())
        );
        assert!(slot.take_pending().is_none());
    }

    #[test]
    fn end_is_reported_once_per_playthrough() {
        let mut slot = Slot::default();
        slot.load(&song("a", "https://cdn.example.com/a.mp3")).unwrap();
        assert!(!slot.take_finished(true), "nothing fetched yet");

        slot.take_pending();
        slot.fill(Arc::from(&[1u8, 2, 3][..]));
        slot.appended();
        assert!(!slot.take_finished(false));
        assert!(slot.take_finished(true));
        assert!(!slot.take_finished(true));

        let data = slot.rewind(true).unwrap();
        assert_eq!(&data[..], [1, 2, 3]);
        slot.appended();
        assert!(slot.take_finished(true));
    }

    #[test]
    fn nothing_to_rewind_while_playing_or_unfetched() {
        let mut slot = Slot::default();
        assert!(slot.rewind(true).is_none());

        slot.fill(Arc::from(&[0u8][..]));
        assert!(slot.rewind(false).is_none());
    }
}
