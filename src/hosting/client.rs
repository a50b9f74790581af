use futures::StreamExt;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::config::ClientConfig;
use crate::hosting::item::{Fields, OperationResult, UploadRequest, WorkItem, delete_fields};
use crate::hosting::links::{FileHost, build_download_path};
use crate::hosting::ClientError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Owns the connection pool shared by every request of a run.
///
/// Uploads never fail on HTTP status: the API answers 200 and reports problems
/// in the body, which is handed back verbatim. Downloads go through the file
/// host and a non-2xx status becomes a per-item `Failure`. Only transport and
/// local I/O problems are errors.
pub struct SessionClient {
    http: reqwest::Client,
    api_url: Url,
    host: FileHost,
    userhash: String,
}

impl SessionClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        debug!(api = %config.api_url, files = %config.files_url, "HTTP session acquired");
        let userhash = config.userhash().to_string();
        Ok(Self {
            http,
            api_url: config.api_url,
            host: FileHost::new(config.files_url),
            userhash,
        })
    }

    pub async fn upload(&self, item: WorkItem) -> Result<OperationResult, ClientError> {
        match item.into_upload(&self.userhash)? {
            UploadRequest::File { fields, path, file } => self.upload_file(fields, path, file).await,
            UploadRequest::Url { fields, url } => self.upload_url(fields, url).await,
        }
    }

    async fn upload_file(
        &self,
        fields: Fields,
        path: PathBuf,
        file: File,
    ) -> Result<OperationResult, ClientError> {
        let length = file
            .metadata()
            .map_err(|err| ClientError::io(&path, err))?
            .len();
        let body = Body::wrap_stream(ReaderStream::new(tokio::fs::File::from_std(file)));
        let label = path.display().to_string();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| label.clone());
        let form = fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
            .part(
                "fileToUpload",
                Part::stream_with_length(body, length).file_name(file_name),
            );
        let request = self.http.post(self.api_url.clone()).multipart(form);
        self.send_upload(label, request).await
    }

    async fn upload_url(&self, fields: Fields, url: String) -> Result<OperationResult, ClientError> {
        let request = self.http.post(self.api_url.clone()).form(&fields);
        self.send_upload(url, request).await
    }

    async fn send_upload(
        &self,
        label: String,
        request: reqwest::RequestBuilder,
    ) -> Result<OperationResult, ClientError> {
        debug!(%label, "sending upload");
        let response = request
            .send()
            .await
            .map_err(|err| ClientError::transport(&label, err))?;
        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|err| ClientError::transport(&label, err))?;
        debug!(%label, %status, "upload answered");
        Ok(OperationResult::Success { label, payload })
    }

    /// Deletes every link in one request and returns the service's status text.
    pub async fn delete_files<S: AsRef<str>>(
        &self,
        links: &[S],
        userhash: &str,
    ) -> Result<String, ClientError> {
        if userhash.trim().is_empty() {
            return Err(ClientError::MissingUserhash);
        }
        let files = self.host.joined_names(links);
        info!(count = links.len(), %files, "deleting files");
        let response = self
            .http
            .post(self.api_url.clone())
            .form(&delete_fields(userhash, files))
            .send()
            .await
            .map_err(|err| ClientError::transport("delete", err))?;
        response
            .text()
            .await
            .map_err(|err| ClientError::transport("delete", err))
    }

    /// Fetches a hosted file into `dest_dir`, replacing any file of the same name.
    pub async fn download_file(
        &self,
        link: &str,
        dest_dir: &Path,
    ) -> Result<OperationResult, ClientError> {
        let label = self.host.normalize(link);
        let url = match self.host.canonical_url(link) {
            Ok(url) => url,
            Err(err) => {
                return Ok(OperationResult::Failure {
                    label,
                    cause: format!("invalid URL ({err})"),
                });
            }
        };
        let Some(path) = build_download_path(self.host.strip(link), dest_dir) else {
            return Ok(OperationResult::Failure {
                label,
                cause: "not a hosted file name".to_string(),
            });
        };

        debug!(%url, "fetching");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| ClientError::transport(&label, err))?;
        let status = response.status();
        if !status.is_success() {
            let cause = format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            );
            return Ok(OperationResult::Failure {
                label,
                cause: cause.trim_end().to_string(),
            });
        }

        let mut dest = tokio::fs::File::create(&path)
            .await
            .map_err(|err| ClientError::io(&path, err))?;
        let mut stream = response.bytes_stream();
        let mut written = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| ClientError::transport(&label, err))?;
            dest.write_all(&chunk)
                .await
                .map_err(|err| ClientError::io(&path, err))?;
            written += chunk.len();
        }
        dest.flush().await.map_err(|err| ClientError::io(&path, err))?;
        debug!(path = %path.display(), bytes = written, "saved");

        Ok(OperationResult::Success {
            label,
            payload: path.display().to_string(),
        })
    }

    /// Releases the connection pool. Consuming `self` rules out reuse.
    pub fn close(self) {
        debug!("HTTP session released");
        drop(self.http);
    }
}
