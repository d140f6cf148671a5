// Client configuration. Values come either from the environment (the way a
// deployed service usually wires things up) or from explicit setters.

use crate::auth::{derive_identity_url, Credentials, IdentityConfig};
use crate::error::{Result, UFilesError};

/// Storage endpoint used when `UFILES_URL` is not set.
pub const DEFAULT_UFILES_URL: &str = "https://media.pixiee.io/v1/f";

/// Everything needed to build a session and a file client.
#[derive(Clone, Debug)]
pub struct Config {
    pub ufiles_base_url: String,
    /// Identity service base URL. Derived from `ufiles_base_url` when unset.
    pub usso_base_url: Option<String>,
    /// Token refresh endpoint. Defaults to `{usso_base_url}/auth/refresh`.
    pub usso_refresh_url: Option<String>,
    pub api_key: Option<String>,
    pub refresh_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_UFILES_URL)
    }
}

impl Config {
    pub fn new(ufiles_base_url: &str) -> Self {
        Config {
            ufiles_base_url: normalize_base_url(ufiles_base_url),
            usso_base_url: None,
            usso_refresh_url: None,
            api_key: None,
            refresh_token: None,
        }
    }

    /// Build a configuration from `UFILES_URL`, `USSO_URL`, `USSO_REFRESH_URL`,
    /// `UFILES_API_KEY` and `USSO_REFRESH_TOKEN`. Empty variables count as unset.
    pub fn from_env() -> Self {
        let base_url = env_var("UFILES_URL").unwrap_or_else(|| DEFAULT_UFILES_URL.into());
        Config {
            ufiles_base_url: normalize_base_url(&base_url),
            usso_base_url: env_var("USSO_URL").map(|u| normalize_base_url(&u)),
            usso_refresh_url: env_var("USSO_REFRESH_URL"),
            api_key: env_var("UFILES_API_KEY"),
            refresh_token: env_var("USSO_REFRESH_TOKEN"),
        }
    }

    pub fn usso_base_url(mut self, url: &str) -> Self {
        self.usso_base_url = Some(normalize_base_url(url));
        self
    }

    pub fn usso_refresh_url(mut self, url: &str) -> Self {
        self.usso_refresh_url = Some(url.to_string());
        self
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn refresh_token(mut self, token: &str) -> Self {
        self.refresh_token = Some(token.to_string());
        self
    }

    /// Resolve the identity-service side of the configuration.
    ///
    /// The API key takes precedence when both credentials are present.
    pub fn identity(&self) -> Result<IdentityConfig> {
        let credentials = match (&self.api_key, &self.refresh_token) {
            (Some(key), _) => Credentials::ApiKey(key.clone()),
            (None, Some(token)) => Credentials::RefreshToken(token.clone()),
            (None, None) => {
                return Err(UFilesError::InvalidInput(
                    "either an API key or a refresh token is required".into(),
                ))
            }
        };

        let base_url = match &self.usso_base_url {
            Some(url) => normalize_base_url(url),
            None => derive_identity_url(&self.ufiles_base_url)?,
        };
        let refresh_url = self
            .usso_refresh_url
            .clone()
            .unwrap_or_else(|| format!("{base_url}/auth/refresh"));

        Ok(IdentityConfig {
            base_url,
            refresh_url,
            credentials,
        })
    }
}

/// Strip trailing slashes so paths can be appended with `format!("{base}/...")`.
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
