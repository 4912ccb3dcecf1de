//! Artifact transfer pipeline
//!
//! Uploads stream the source into a multipart body through a bounded byte
//! pipe, so memory use is bounded by the pipe depth rather than the artifact
//! size. Downloads stream the response body to disk with all-or-nothing
//! semantics. Authorization rides in a dedicated job-scoped header, not the
//! standard auth header, distinguishing artifact traffic from runner-level
//! operations.

use std::path::Path;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use reqwest::Method;
use reqwest::header::HeaderMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{error, info, warn};

use forge_core::domain::runner::JobCredentials;

use crate::CoordinatorClient;
use crate::outcome::{DownloadState, UploadState, classify_download, classify_upload};

/// Dedicated header carrying the job-scoped secret for artifact endpoints
const JOB_TOKEN_HEADER: &str = "JOB-TOKEN";

/// Chunk size the producer task reads from the source
const UPLOAD_CHUNK_SIZE: usize = 32 * 1024;

/// Depth of the byte pipe joining the producer task and the HTTP transport
const PIPE_DEPTH: usize = 8;

impl CoordinatorClient {
    /// Uploads an artifact file for one job
    ///
    /// Local precondition violations (missing file, directory as source)
    /// fail fast without any network round trip.
    pub async fn upload_artifacts(
        &self,
        credentials: &JobCredentials,
        artifact_path: &Path,
    ) -> UploadState {
        let metadata = match tokio::fs::metadata(artifact_path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                error!(job_id = credentials.job_id, path = %artifact_path.display(), error = %err,
                    "Uploading artifacts to coordinator... error");
                return UploadState::Failed;
            }
        };
        if metadata.is_dir() {
            error!(job_id = credentials.job_id, path = %artifact_path.display(),
                "Uploading artifacts to coordinator... cannot upload directories");
            return UploadState::Failed;
        }

        let file = match tokio::fs::File::open(artifact_path).await {
            Ok(file) => file,
            Err(err) => {
                error!(job_id = credentials.job_id, path = %artifact_path.display(), error = %err,
                    "Uploading artifacts to coordinator... error");
                return UploadState::Failed;
            }
        };

        let base_name = artifact_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifacts".to_string());

        self.upload_artifact_stream(credentials, file, &base_name)
            .await
    }

    /// Uploads an arbitrary byte source as a multipart artifact
    ///
    /// The source is pumped through a bounded pipe by a concurrent producer
    /// task: a read error on the source aborts the request, and a dropped
    /// request unblocks the producer.
    pub async fn upload_artifact_stream<R>(
        &self,
        credentials: &JobCredentials,
        source: R,
        file_name: &str,
    ) -> UploadState
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let identity = credentials.as_runner_identity();
        let transport = match self.transport(&identity) {
            Ok(transport) => transport,
            Err(err) => {
                error!(job_id = credentials.job_id, error = %err,
                    "Uploading artifacts to coordinator... error");
                return UploadState::Failed;
            }
        };

        let (tx, rx) = futures::channel::mpsc::channel::<std::io::Result<Bytes>>(PIPE_DEPTH);
        tokio::spawn(pump_source(source, tx));

        let part = reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(rx))
            .file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut headers = HeaderMap::new();
        match credentials.token.parse() {
            Ok(value) => {
                headers.insert(JOB_TOKEN_HEADER, value);
            }
            Err(_) => {
                error!(job_id = credentials.job_id,
                    "Uploading artifacts to coordinator... job token is not a valid header value");
                return UploadState::Failed;
            }
        }

        let path = self.api_path(&format!("jobs/{}/artifacts", credentials.job_id));
        let response = match transport.multipart_exchange(&path, headers, form).await {
            Ok(response) => response,
            Err(err) => {
                error!(job_id = credentials.job_id, error = %err,
                    "Uploading artifacts to coordinator... error");
                return UploadState::Failed;
            }
        };

        let outcome = classify_upload(response.status().as_u16());
        match outcome {
            UploadState::Succeeded => {
                info!(job_id = credentials.job_id, "Uploading artifacts to coordinator... ok");
            }
            UploadState::Forbidden => {
                error!(job_id = credentials.job_id, "Uploading artifacts to coordinator... forbidden");
            }
            UploadState::TooLarge => {
                error!(job_id = credentials.job_id, "Uploading artifacts to coordinator... too large archive");
            }
            UploadState::Failed => {
                warn!(job_id = credentials.job_id, status = response.status().as_u16(),
                    "Uploading artifacts to coordinator... failed");
            }
        }
        outcome
    }

    /// Downloads a job's artifact archive to `target`
    ///
    /// All-or-nothing: any failure while writing deletes the partial file.
    /// A directory as target is rejected before the network call.
    pub async fn download_artifacts(
        &self,
        credentials: &JobCredentials,
        target: &Path,
    ) -> DownloadState {
        if target.is_dir() {
            error!(job_id = credentials.job_id, path = %target.display(),
                "Downloading artifacts from coordinator... target is a directory");
            return DownloadState::Failed;
        }

        let identity = credentials.as_runner_identity();
        let transport = match self.transport(&identity) {
            Ok(transport) => transport,
            Err(err) => {
                error!(job_id = credentials.job_id, error = %err,
                    "Downloading artifacts from coordinator... error");
                return DownloadState::Failed;
            }
        };

        let mut headers = HeaderMap::new();
        match credentials.token.parse() {
            Ok(value) => {
                headers.insert(JOB_TOKEN_HEADER, value);
            }
            Err(_) => {
                error!(job_id = credentials.job_id,
                    "Downloading artifacts from coordinator... job token is not a valid header value");
                return DownloadState::Failed;
            }
        }

        let path = self.api_path(&format!("jobs/{}/artifacts", credentials.job_id));
        let response = match transport
            .raw_exchange(Method::GET, &path, headers, None, None)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(job_id = credentials.job_id, error = %err,
                    "Downloading artifacts from coordinator... error");
                return DownloadState::Failed;
            }
        };

        let status = response.status().as_u16();
        let outcome = classify_download(status);
        match outcome {
            DownloadState::Succeeded => {
                if let Err(err) = persist_body(response, target).await {
                    error!(job_id = credentials.job_id, error = %err,
                        "Downloading artifacts from coordinator... error");
                    let _ = tokio::fs::remove_file(target).await;
                    return DownloadState::Failed;
                }
                info!(job_id = credentials.job_id, "Downloading artifacts from coordinator... ok");
                DownloadState::Succeeded
            }
            DownloadState::Forbidden => {
                error!(job_id = credentials.job_id, "Downloading artifacts from coordinator... forbidden");
                outcome
            }
            DownloadState::NotFound => {
                error!(job_id = credentials.job_id, "Downloading artifacts from coordinator... not found");
                outcome
            }
            DownloadState::Failed => {
                warn!(job_id = credentials.job_id, status,
                    "Downloading artifacts from coordinator... failed");
                outcome
            }
        }
    }
}

/// Producer side of the upload pipe
///
/// Reads the source in fixed chunks and feeds them to the transport. A read
/// error is forwarded through the pipe so the request aborts instead of
/// hanging; a closed pipe (request dropped or finished) stops the pump.
async fn pump_source<R>(mut source: R, mut tx: futures::channel::mpsc::Sender<std::io::Result<Bytes>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
        match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                buf.truncate(n);
                if tx.send(Ok(Bytes::from(buf))).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                break;
            }
        }
    }
}

async fn persist_body(response: reqwest::Response, target: &Path) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(target).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(std::io::Error::other)?;
        file.write_all(&chunk).await?;
    }
    file.flush().await
}
