use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_FILES_URL: &str = "https://files.catbox.moe/";

/// The host that serves uploaded files as `<base>/<filename>`.
#[derive(Clone, Debug)]
pub struct FileHost {
    base: Url,
}

impl FileHost {
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base }
    }

    /// Removes a recognized hosting prefix, leaving the hosted file name.
    /// Links without a known prefix are returned untouched.
    pub fn strip<'a>(&self, link: &'a str) -> &'a str {
        let link = link.trim();
        [self.base.as_str(), DEFAULT_FILES_URL]
            .into_iter()
            .find_map(|prefix| link.strip_prefix(prefix))
            .unwrap_or(link)
    }

    pub fn normalize(&self, link: &str) -> String {
        format!("{}{}", self.base, self.strip(link))
    }

    pub fn canonical_url(&self, link: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.normalize(link))
    }

    /// The `files` field of a delete request: every link reduced to its name.
    pub fn joined_names<S: AsRef<str>>(&self, links: &[S]) -> String {
        links
            .iter()
            .map(|link| self.strip(link.as_ref()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for FileHost {
    fn default() -> Self {
        Self::new(Url::parse(DEFAULT_FILES_URL).expect("default hosting URL is valid"))
    }
}

/// Where a hosted file called `name` lands inside `target_dir`. Names that
/// could escape the directory are refused.
pub fn build_download_path(name: &str, target_dir: &Path) -> Option<PathBuf> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(target_dir.join(name))
}
