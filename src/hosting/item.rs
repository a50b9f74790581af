use std::fmt;
use std::fs::File;
use std::path::PathBuf;

use crate::hosting::ClientError;

pub const FILE_UPLOAD: &str = "fileupload";
pub const URL_UPLOAD: &str = "urlupload";
pub const DELETE_FILES: &str = "deletefiles";

/// One unit of requested work.
#[derive(Debug)]
pub enum WorkItem {
    /// A local file, already opened for reading.
    LocalFile { path: PathBuf, file: File },
    /// A URL the remote service fetches and hosts itself.
    RemoteUrl { url: String },
    /// The public link of a previously uploaded file.
    HostedLink { url: String },
}

impl WorkItem {
    pub fn label(&self) -> String {
        match self {
            WorkItem::LocalFile { path, .. } => path.display().to_string(),
            WorkItem::RemoteUrl { url } | WorkItem::HostedLink { url } => url.clone(),
        }
    }

    /// The link to act on for delete and download.
    pub fn link(&self) -> Result<&str, ClientError> {
        match self {
            WorkItem::HostedLink { url } => Ok(url),
            _ => Err(ClientError::WrongItem {
                label: self.label(),
                operation: "delete or download",
            }),
        }
    }

    /// Maps the item onto the upload request it calls for. The file body of a
    /// local file travels separately as the `fileToUpload` part.
    pub fn into_upload(self, userhash: &str) -> Result<UploadRequest, ClientError> {
        let userhash = ("userhash", userhash.to_string());
        match self {
            WorkItem::LocalFile { path, file } => Ok(UploadRequest::File {
                fields: vec![("reqtype", FILE_UPLOAD.to_string()), userhash],
                path,
                file,
            }),
            WorkItem::RemoteUrl { url } => Ok(UploadRequest::Url {
                fields: vec![
                    ("reqtype", URL_UPLOAD.to_string()),
                    userhash,
                    ("url", url.clone()),
                ],
                url,
            }),
            WorkItem::HostedLink { .. } => Err(ClientError::WrongItem {
                label: self.label(),
                operation: "upload",
            }),
        }
    }
}

pub type Fields = Vec<(&'static str, String)>;

#[derive(Debug)]
pub enum UploadRequest {
    File { fields: Fields, path: PathBuf, file: File },
    Url { fields: Fields, url: String },
}

pub fn delete_fields(userhash: &str, files: String) -> Fields {
    vec![
        ("reqtype", DELETE_FILES.to_string()),
        ("userhash", userhash.to_string()),
        ("files", files),
    ]
}

/// Outcome of a single work item, printed as soon as it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Success { label: String, payload: String },
    Failure { label: String, cause: String },
}

impl OperationResult {
    pub fn label(&self) -> &str {
        match self {
            OperationResult::Success { label, .. } | OperationResult::Failure { label, .. } => label,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success { .. })
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::Success { label, payload } => write!(f, "{label} -> {payload}"),
            OperationResult::Failure { label, cause } => {
                write!(f, "* Error while downloading {label}: {cause}")
            }
        }
    }
}
