//! Real-time transcoding through an external encoder process.
//!
//! Each request spawns one encoder that reads the selected file on stdin and
//! writes fragmented MP4 to stdout, which becomes the response body. The job
//! owning the process is released when the body is dropped: on normal
//! completion, on encoder exit, and when the client disconnects. Release
//! kills the encoder and stops the upstream read before returning.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, stream};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{StreamingConfig, TranscodeConfig};
use crate::engine::InfoHash;
use crate::error::{GatewayError, GatewayResult};
use crate::media_info::TRANSCODED_CONTENT_TYPE;
use crate::selection::{FileSelector, select_file};
use crate::session::{Session, SessionState};
use crate::streaming::FileReader;

/// How long a finished stdout waits for the encoder to exit before release.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the encoder to exit.
const EXIT_POLL: Duration = Duration::from_millis(10);

/// Live encoder jobs, keyed by job id, with their process ids.
#[derive(Default)]
struct ActiveJobs {
    jobs: Mutex<HashMap<Uuid, Option<u32>>>,
}

/// Spawns and supervises encoder processes.
pub struct TranscodePipeline {
    config: TranscodeConfig,
    streaming: StreamingConfig,
    active: Arc<ActiveJobs>,
}

impl TranscodePipeline {
    pub fn new(config: &TranscodeConfig, streaming: &StreamingConfig) -> Self {
        Self {
            config: config.clone(),
            streaming: streaming.clone(),
            active: Arc::new(ActiveJobs::default()),
        }
    }

    /// Number of encoder processes currently owned by live responses.
    pub fn active_jobs(&self) -> usize {
        self.active.jobs.lock().len()
    }

    /// Process ids of the live encoders.
    pub fn active_pids(&self) -> Vec<u32> {
        self.active.jobs.lock().values().flatten().copied().collect()
    }

    /// Starts a transcode of the selected file from its first byte.
    ///
    /// Never waits for metadata: transcoding is offered only once a session
    /// is already streamable.
    ///
    /// # Errors
    /// - `GatewayError::NotReady` - Session has no metadata yet
    /// - `GatewayError::NoPlayableFile` - Nothing matches the selector
    /// - `GatewayError::EncoderSpawnFailed` - Encoder could not be started
    pub async fn transcode(
        &self,
        session: &Session,
        selector: &FileSelector,
    ) -> GatewayResult<Response> {
        if session.state() != SessionState::Ready {
            return Err(GatewayError::NotReady);
        }

        let files = session.files();
        let file = select_file(&files, selector)?.clone();
        session.set_selected_file(file.clone());

        let reader = FileReader::new(
            session.handle().clone(),
            &file,
            0,
            file.length,
            &self.streaming,
        );
        let (job, stdout) = self.spawn_job(session.info_hash(), reader)?;
        info!(
            "Transcoding {} ({} bytes) for {} as job {}",
            file.name,
            file.length,
            session.info_hash(),
            job.id
        );

        let body = Body::from_stream(job.into_stream(stdout, self.config.output_chunk_size));

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, TRANSCODED_CONTENT_TYPE)
            .header(header::CACHE_CONTROL, "no-cache")
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
    }

    /// Builds the encoder command with all three standard streams piped.
    fn encoder_command(&self) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Spawns the encoder and wires the file reader into its stdin.
    fn spawn_job(
        &self,
        info_hash: InfoHash,
        reader: FileReader,
    ) -> GatewayResult<(TranscodeJob, ChildStdout)> {
        let mut child = self.encoder_command().spawn().map_err(|e| {
            error!(
                "Failed to spawn encoder {}: {}",
                self.config.program.display(),
                e
            );
            GatewayError::EncoderSpawnFailed(e)
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            // kill_on_drop releases the half-wired process
            return Err(GatewayError::EncoderSpawnFailed(std::io::Error::other(
                "encoder pipes were not captured",
            )));
        };

        let id = Uuid::new_v4();
        let pid = child.id();
        let child = Arc::new(Mutex::new(child));
        let pump = spawn_input_pump(id, reader, stdin, child.clone());
        let stderr_drain = spawn_stderr_reader(id, stderr);
        self.active.jobs.lock().insert(id, pid);

        let job = TranscodeJob {
            id,
            info_hash,
            child,
            pump,
            stderr_drain,
            active: self.active.clone(),
        };
        Ok((job, stdout))
    }
}

/// Feeds the file into the encoder's stdin.
///
/// Reads one chunk at a time and waits for the encoder to accept it before
/// reading the next, so a slow client throttles the torrent read. An upstream
/// failure kills the encoder so the response ends promptly.
fn spawn_input_pump(
    id: Uuid,
    mut reader: FileReader,
    mut stdin: ChildStdin,
    child: Arc<Mutex<Child>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match reader.next_chunk().await {
                Ok(Some(bytes)) => {
                    if let Err(e) = stdin.write_all(&bytes).await {
                        debug!("Job {} encoder closed stdin: {}", id, e);
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Job {} fed {} bytes to encoder", id, reader.position());
                    break;
                }
                Err(e) => {
                    warn!("Job {}: {}", id, GatewayError::UpstreamRead(e));
                    if let Err(e) = child.lock().start_kill() {
                        debug!("Job {} encoder already gone: {}", id, e);
                    }
                    break;
                }
            }
        }

        // Closing stdin signals EOF to the encoder
        let _ = stdin.shutdown().await;
    })
}

/// Drains encoder stderr so it never blocks on a full pipe.
fn spawn_stderr_reader(id: Uuid, mut stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let mut reader = BufReader::new(&mut stderr);
        let mut line = String::new();

        while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
            if !line.trim().is_empty() {
                warn!("Job {} encoder stderr: {}", id, line.trim());
            }
            line.clear();
        }
    })
}

/// One encoder process bound to one HTTP response.
struct TranscodeJob {
    id: Uuid,
    info_hash: InfoHash,
    child: Arc<Mutex<Child>>,
    pump: JoinHandle<()>,
    stderr_drain: JoinHandle<()>,
    active: Arc<ActiveJobs>,
}

impl TranscodeJob {
    /// Turns encoder stdout into the response body.
    ///
    /// The job travels with the stream, so dropping the body at any point
    /// releases the encoder.
    fn into_stream(
        self,
        stdout: ChildStdout,
        chunk_size: usize,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        let chunk_size = chunk_size.max(1);
        stream::unfold(Some((stdout, self)), move |state| async move {
            let (mut stdout, job) = state?;
            let mut buffer = vec![0u8; chunk_size];
            match stdout.read(&mut buffer).await {
                Ok(0) => {
                    job.wait_for_exit(EXIT_GRACE).await;
                    None
                }
                Ok(n) => {
                    buffer.truncate(n);
                    Some((Ok(Bytes::from(buffer)), Some((stdout, job))))
                }
                Err(e) => {
                    warn!("Job {} failed reading encoder output: {}", job.id, e);
                    Some((Err(e), None))
                }
            }
        })
    }

    /// Gives an encoder that closed stdout a moment to exit on its own.
    async fn wait_for_exit(&self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let exited = self.child.lock().try_wait();
            if !matches!(exited, Ok(None)) || tokio::time::Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }
}

impl Drop for TranscodeJob {
    fn drop(&mut self) {
        self.pump.abort();

        let mut child = self.child.lock();
        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                info!("Job {} for {} finished", self.id, self.info_hash);
            }
            Ok(Some(status)) => {
                let crashed = GatewayError::EncoderCrashed {
                    status: status.to_string(),
                };
                warn!("Job {} for {}: {}", self.id, self.info_hash, crashed);
            }
            Ok(None) => match child.start_kill() {
                Ok(()) => info!(
                    "Job {} for {} released, encoder terminated",
                    self.id, self.info_hash
                ),
                Err(e) => warn!("Job {} failed to kill encoder: {}", self.id, e),
            },
            Err(e) => warn!("Job {} could not query encoder: {}", self.id, e),
        }
        drop(child);

        self.stderr_drain.abort();
        self.active.jobs.lock().remove(&self.id);
    }
}
