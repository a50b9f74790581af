use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response. The shared session is assumed broken.
    #[error("request for '{label}' failed: {source}")]
    Transport {
        label: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a userhash is required to delete files")]
    MissingUserhash,

    #[error("'{label}' cannot be used for {operation}")]
    WrongItem {
        label: String,
        operation: &'static str,
    },
}

impl ClientError {
    pub fn transport(label: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            label: label.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
