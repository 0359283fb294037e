//! Output volume and its persisted preference.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Output volume as a percentage, always within `0..=100`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Volume(u8);

impl Volume {
    pub const MAX: Self = Self(100);
    pub const DEFAULT: Self = Self(50);

    /// Creates a volume, saturating at 100.
    #[must_use]
    pub fn new(percent: u8) -> Self {
        Self(percent.min(Self::MAX.0))
    }

    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }

    /// Linear gain for the audio sink.
    #[must_use]
    pub fn as_ratio(self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i64> for Volume {
    fn from(value: i64) -> Self {
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(value.clamp(0, i64::from(Self::MAX.0)) as u8)
    }
}

impl From<Volume> for u8 {
    fn from(volume: Volume) -> Self {
        volume.0
    }
}

impl FromStr for Volume {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s.trim().parse()?;
        if !(0..=100).contains(&value) {
            return Err(Error::out_of_range(format!(
                "volume must be between 0 and 100, got {value}"
            )));
        }
        Ok(Self::from(value))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Default, Deserialize, Serialize)]
struct Stored {
    #[serde(default)]
    music_player_volume: Option<Volume>,
}

/// Preferences file remembering the volume across runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preferences {
    path: PathBuf,
}

impl Preferences {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored volume, or the default when nothing usable is stored.
    ///
    /// A missing file is not an error. An unreadable or malformed file is
    /// logged and ignored.
    #[must_use]
    pub fn volume(&self) -> Volume {
        match self.read() {
            Ok(stored) => stored.music_player_volume.unwrap_or_default(),
            Err(e) => {
                warn!(
                    "ignoring preferences in {}: {e}",
                    self.path.display()
                );
                Volume::default()
            }
        }
    }

    /// Stores `volume`, keeping any other keys in the file. A file that is
    /// not valid TOML is logged and replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_volume(&self, volume: Volume) -> Result<()> {
        let mut table = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents.parse::<toml::Table>().unwrap_or_else(|e| {
                warn!(
                    "replacing malformed preferences in {}: {e}",
                    self.path.display()
                );
                toml::Table::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(e) => return Err(e.into()),
        };

        table.insert(
            "music_player_volume".to_string(),
            toml::Value::Integer(i64::from(volume.percent())),
        );
        std::fs::write(&self.path, toml::to_string(&table)?)?;

        trace!("stored volume {volume} in {}", self.path.display());
        Ok(())
    }

    fn read(&self) -> Result<Stored> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Stored::default()),
            Err(e) => Err(e.into()),
        }
    }
}
