//! Spawning and supervising `hugo server`.
//!
//! One supervisor task owns the child process. Reader tasks forward raw
//! output chunks; the supervisor relays them to an [`OutputSink`], splits
//! them into lines per stream and drives the [`OutputAnalyser`]:
//!
//! ```text
//! stdout reader --+
//!                 +--> chunks --> Supervisor --> Ready/MissingUrl --> start result
//! stderr reader --+                  |   ^
//!                                    |   +-- kill switch (HugoServer::shutdown)
//!                                    +------ Rebuilt / Terminated --> HugoServer
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc, oneshot};

use super::output::{LineBuffer, OutputAnalyser, Signal};
use super::{HugoServer, ServerError};
use crate::config::HugoConfig;
use crate::embed::{PAYLOAD_JS, PayloadVars};

/// How long to keep reading output after the process exited.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Read buffer size for each output stream.
const CHUNK_SIZE: usize = 8 * 1024;

// ============================================================================
// Output sink
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives Hugo's output verbatim, independent of parsing.
pub trait OutputSink: Send + Sync {
    fn relay(&self, stream: Stream, chunk: &[u8]);

    /// Supervisor's own messages (exit status, missing URL).
    fn notice(&self, message: &str);
}

/// Relays everything to our stderr; stdout belongs to the host channel.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn relay(&self, _stream: Stream, chunk: &[u8]) {
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(chunk).ok();
        stderr.flush().ok();
    }

    fn notice(&self, message: &str) {
        crate::log!("hugo"; "{}", message);
    }
}

/// Discards output (`[hugo] relay_output = false`).
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn relay(&self, _stream: Stream, _chunk: &[u8]) {}

    fn notice(&self, message: &str) {
        crate::debug!("hugo"; "{}", message);
    }
}

// ============================================================================
// Launcher
// ============================================================================

pub type StartResult = Result<Arc<HugoServer>, ServerError>;

/// Starts a server for an embedding origin.
pub trait Launcher: Send + Sync {
    /// Resolves once the server announced its URLs, or failed trying.
    fn launch(&self, origin: &str) -> BoxFuture<'static, StartResult>;
}

/// Launches the real `hugo` binary in the site root.
pub struct HugoLauncher {
    root: PathBuf,
    hugo: HugoConfig,
    sink: Arc<dyn OutputSink>,
}

impl HugoLauncher {
    pub fn new(root: PathBuf, hugo: HugoConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self { root, hugo, sink }
    }

    fn spawn(&self, origin: &str) -> Result<Child, ServerError> {
        let program = which::which(&self.hugo.command)
            .map_err(|_| ServerError::NotFound(self.hugo.command.clone()))?;

        let script = PAYLOAD_JS.render(&PayloadVars {
            embedder_origin: origin.to_string(),
        });

        crate::debug!("hugo"; "starting {} {}", program.display(), self.hugo.args.join(" "));
        Command::new(&program)
            .args(&self.hugo.args)
            .current_dir(&self.root)
            .env(&self.hugo.script_env, STANDARD.encode(script))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ServerError::Spawn {
                program: program.display().to_string(),
                err,
            })
    }
}

impl Launcher for HugoLauncher {
    fn launch(&self, origin: &str) -> BoxFuture<'static, StartResult> {
        let spawned = self.spawn(origin);
        let sink = Arc::clone(&self.sink);
        async move { supervise(spawned?, sink).await }.boxed()
    }
}

// ============================================================================
// Supervision
// ============================================================================

/// Take ownership of a spawned child and wait for it to become ready.
///
/// The child keeps being supervised after this returns; the returned
/// handle reports rebuilds and termination.
pub(crate) async fn supervise(mut child: Child, sink: Arc<dyn OutputSink>) -> StartResult {
    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_stream(stdout, Stream::Stdout, chunk_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_stream(stderr, Stream::Stderr, chunk_tx));
    }

    let (ready_tx, ready_rx) = oneshot::channel();
    let supervisor = Supervisor {
        sink,
        analyser: OutputAnalyser::new(),
        stdout: LineBuffer::new(),
        stderr: LineBuffer::new(),
        kill: Arc::new(Notify::new()),
        server: None,
        ready: Some(ready_tx),
    };
    tokio::spawn(supervisor.run(child, chunk_rx));

    ready_rx
        .await
        .unwrap_or_else(|_| Err(ServerError::Exited("Hugo supervisor stopped".to_string())))
}

async fn read_stream<R>(mut reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, Vec<u8>)>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send((stream, buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                crate::debug!("hugo"; "{:?} read error: {}", stream, e);
                break;
            }
        }
    }
}

struct Supervisor {
    sink: Arc<dyn OutputSink>,
    analyser: OutputAnalyser,
    stdout: LineBuffer,
    stderr: LineBuffer,
    kill: Arc<Notify>,
    server: Option<Arc<HugoServer>>,
    ready: Option<oneshot::Sender<StartResult>>,
}

impl Supervisor {
    async fn run(mut self, mut child: Child, mut chunks: mpsc::UnboundedReceiver<(Stream, Vec<u8>)>) {
        let kill = Arc::clone(&self.kill);
        let mut streams_open = true;

        let status = loop {
            tokio::select! {
                chunk = chunks.recv(), if streams_open => match chunk {
                    Some((stream, bytes)) => self.on_chunk(stream, &bytes),
                    None => streams_open = false,
                },
                _ = kill.notified() => {
                    crate::debug!("hugo"; "killing hugo server");
                    if let Err(e) = child.start_kill() {
                        crate::debug!("hugo"; "kill failed: {}", e);
                    }
                }
                status = child.wait() => break status,
            }
        };

        // Output written right before exit may still be in flight
        while let Ok(Some((stream, bytes))) = tokio::time::timeout(DRAIN_TIMEOUT, chunks.recv()).await {
            self.on_chunk(stream, &bytes);
        }
        for line in [self.stdout.finish(), self.stderr.finish()].into_iter().flatten() {
            self.on_line(&line);
        }

        let message = match status {
            Ok(status) => describe_exit(status),
            Err(e) => format!("Failed to wait for Hugo process: {e}"),
        };
        self.sink.notice(&format!("{message}."));
        self.on_exit(ServerError::Exited(message));
    }

    fn on_chunk(&mut self, stream: Stream, bytes: &[u8]) {
        self.sink.relay(stream, bytes);
        let lines = match stream {
            Stream::Stdout => self.stdout.push(bytes),
            Stream::Stderr => self.stderr.push(bytes),
        };
        for line in lines {
            self.on_line(&line);
        }
    }

    fn on_line(&mut self, line: &str) {
        match self.analyser.feed_line(line) {
            Some(Signal::Ready { urls, errors }) => {
                let server = Arc::new(HugoServer::new(urls, errors, Arc::clone(&self.kill)));
                crate::debug!("hugo"; "server ready at {}", server.origins().join(", "));
                self.server = Some(Arc::clone(&server));
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(Ok(server));
                }
            }
            Some(Signal::MissingUrl) => {
                let err = ServerError::MissingUrl;
                self.sink.notice(&format!("{err}.\nTerminating Hugo server."));
                self.kill.notify_one();
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(Err(err));
                }
            }
            Some(Signal::Rebuilt { errors }) => {
                if let Some(server) = &self.server {
                    crate::debug!("hugo"; "rebuilt ({} errors)", errors.len());
                    server.notify_rebuilt(errors);
                }
            }
            None => {}
        }
    }

    fn on_exit(&mut self, err: ServerError) {
        self.analyser.terminate();
        if let Some(server) = &self.server {
            server.terminate(Arc::new(err));
        } else if let Some(ready) = self.ready.take() {
            let _ = ready.send(Err(err));
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Hugo process terminated with exit code: {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Hugo process killed by signal: {signal}");
        }
    }

    format!("Hugo process terminated: {status}")
}

// ============================================================================
// Tests
// ============================================================================
