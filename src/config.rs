use url::Url;

use crate::hosting::links::DEFAULT_FILES_URL;

pub const DEFAULT_API_URL: &str = "https://catbox.moe/user/api.php";

/// Everything the session needs, resolved once at startup.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// The single endpoint taking `reqtype` requests.
    pub api_url: Url,
    /// Base under which hosted files are served by name.
    pub files_url: Url,
    /// Account userhash. Uploads without one are anonymous.
    pub userhash: Option<String>,
}

impl ClientConfig {
    pub fn new(api_url: Url, files_url: Url, userhash: Option<String>) -> Self {
        Self {
            api_url,
            files_url,
            userhash: userhash.filter(|hash| !hash.trim().is_empty()),
        }
    }

    pub fn userhash(&self) -> &str {
        self.userhash.as_deref().unwrap_or_default()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(
            Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            Url::parse(DEFAULT_FILES_URL).expect("default hosting URL is valid"),
            None,
        )
    }
}
