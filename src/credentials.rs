//! Sign-in credentials loaded from a secrets file.
//!
//! The secrets file is TOML with two keys:
//!
//! ```toml
//! email = "admin@example.com"
//! password = "correct horse battery staple"
//! ```
//!
//! The password is redacted from `Debug` output so that credentials never
//! end up in logs.

use std::{fs, path::Path};

use serde::Deserialize;
use veil::Redact;

use crate::error::{Error, Result};

#[derive(Clone, Eq, PartialEq, Deserialize, Redact)]
pub struct Credentials {
    pub email: String,

    #[redact]
    pub password: String,
}

impl Credentials {
    /// Secrets files are expected to be tiny; anything larger is refused
    /// before reading it into memory.
    const MAX_FILE_SIZE: u64 = 1024;

    /// Loads credentials from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is larger than 1 KiB, is
    /// not valid TOML, or contains an empty email or password.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: secrets file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        contents.parse()
    }
}

impl std::str::FromStr for Credentials {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let credentials: Self = toml::from_str(s)?;
        if credentials.email.trim().is_empty() {
            return Err(Error::invalid_argument("email is empty"));
        }
        if credentials.password.is_empty() {
            return Err(Error::invalid_argument("password is empty"));
        }

        Ok(credentials)
    }
}
