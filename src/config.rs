//! Client configuration.
//!
//! Collects what every other component needs to know about the running
//! application: its identity as presented to the backend, where the backend
//! lives and where local preferences are kept.

use std::path::PathBuf;

use url::Url;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    pub user_agent: String,

    /// Base URL of the REST backend. Always ends with a `/` so that relative
    /// endpoint paths join below it.
    pub api_url: Url,

    /// File that stores the volume preference.
    pub preferences_file: PathBuf,
}

impl Config {
    /// Default location of the REST backend.
    pub const DEFAULT_API_URL: &'static str = "http://localhost:8080/";

    /// Default name of the preferences file.
    pub const DEFAULT_PREFERENCES_FILE: &'static str = "preferences.toml";

    /// Creates a configuration for the backend at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the URL cannot serve as a base URL
    /// (e.g. `mailto:`) or when the application name, version or language
    /// cannot be put in a `User-Agent` header.
    pub fn new(api_url: Url) -> Result<Self> {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            return Err(Error::invalid_argument(format!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            )));
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.is_empty() && !version.contains(illegal_chars))
            .unwrap_or_else(|| String::from("0"));

        let user_agent =
            format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Desktop; {app_lang})");
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,
            app_lang,
            user_agent,
            api_url: Self::normalize(api_url)?,
            preferences_file: PathBuf::from(Self::DEFAULT_PREFERENCES_FILE),
        })
    }

    /// Ensures the URL can be used as a base for relative endpoint paths.
    fn normalize(mut api_url: Url) -> Result<Url> {
        if api_url.cannot_be_a_base() {
            return Err(Error::invalid_argument(format!(
                "{api_url} cannot be used as API base URL"
            )));
        }

        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        Ok(api_url)
    }

    /// Resolves an endpoint path against the API base URL.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the path does not form a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path.trim_start_matches('/'))
            .map_err(Into::into)
    }
}
