use std::{collections::VecDeque, sync::Arc};

use futures_util::{StreamExt, stream::BoxStream};
use idler_core::{ActivityClassifier, ActivitySignal};
use tokio_util::sync::CancellationToken;

use crate::runtime::{BackendError, ContainerBackend, LogChunks};

pub type ActivityStream = BoxStream<'static, Result<ActivitySignal, StreamError>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("container not found: {0}")]
    ResourceNotFound(String),
    #[error("log stream connection failed: {0}")]
    Connection(String),
}

impl From<BackendError> for StreamError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::NotFound(name) => StreamError::ResourceNotFound(name),
            other => StreamError::Connection(other.to_string()),
        }
    }
}

/// Longest unterminated line kept before it is handed on as-is.
const MAX_PARTIAL_BYTES: usize = 64 * 1024;

/// Reassembles lines from arbitrarily split byte chunks. Decoding happens
/// once per complete line, so UTF-8 sequences split across chunks survive.
#[derive(Debug, Default)]
struct LineBuffer {
    partial: Vec<u8>,
}

fn decode_line(mut raw: Vec<u8>) -> String {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        let mut scan_from = self.partial.len();
        self.partial.extend_from_slice(chunk);
        while let Some(off) = self.partial[scan_from..].iter().position(|b| *b == b'\n') {
            let pos = scan_from + off;
            let mut line: Vec<u8> = self.partial.drain(..=pos).collect();
            line.pop();
            out.push(decode_line(line));
            scan_from = 0;
        }

        if self.partial.len() > MAX_PARTIAL_BYTES {
            tracing::debug!(bytes = self.partial.len(), "log line too long, splitting");
            out.push(decode_line(std::mem::take(&mut self.partial)));
        }
    }

    fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(decode_line(std::mem::take(&mut self.partial)))
        }
    }
}

struct Tail {
    chunks: LogChunks,
    lines: LineBuffer,
    pending: VecDeque<ActivitySignal>,
    classifier: Arc<ActivityClassifier>,
    done: bool,
}

impl Tail {
    fn classify_all(&mut self, lines: &[String]) {
        for line in lines {
            let before = self.pending.len();
            self.pending.extend(self.classifier.classify(line));
            if self.pending.len() > before {
                tracing::debug!(line = %line, "activity line");
            }
        }
    }

    async fn next_signal(&mut self) -> Option<Result<ActivitySignal, StreamError>> {
        let mut lines = Vec::new();
        loop {
            if let Some(signal) = self.pending.pop_front() {
                return Some(Ok(signal));
            }
            if self.done {
                return None;
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => {
                    lines.clear();
                    self.lines.push(&chunk, &mut lines);
                    self.classify_all(&lines);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(StreamError::Connection(e.to_string())));
                }
                None => {
                    self.done = true;
                    if let Some(rest) = self.lines.finish() {
                        self.classify_all(&[rest]);
                    }
                }
            }
        }
    }
}

/// Live activity signals from a container's log output.
///
/// Does not reconnect: a transport failure ends the stream after yielding
/// one [`StreamError::Connection`]. Reconnecting is the caller's decision.
#[derive(Clone)]
pub struct LogActivityStream {
    backend: Arc<dyn ContainerBackend>,
    classifier: Arc<ActivityClassifier>,
}

impl LogActivityStream {
    pub fn new(backend: Arc<dyn ContainerBackend>, classifier: ActivityClassifier) -> Self {
        Self {
            backend,
            classifier: Arc::new(classifier),
        }
    }

    /// Follows logs produced from now on; earlier history is never replayed.
    /// The stream ends promptly once `cancel` fires.
    pub async fn subscribe(
        &self,
        name: &str,
        cancel: CancellationToken,
    ) -> Result<ActivityStream, StreamError> {
        let since = chrono::Utc::now().timestamp();

        let containers = self.backend.list_containers().await?;
        let found = containers
            .iter()
            .any(|c| c.name.trim_start_matches('/') == name);
        if !found {
            tracing::error!(container = %name, "container not found");
            return Err(StreamError::ResourceNotFound(name.to_string()));
        }

        let tail = Tail {
            chunks: self.backend.logs(name, since),
            lines: LineBuffer::default(),
            pending: VecDeque::new(),
            classifier: self.classifier.clone(),
            done: false,
        };
        tracing::info!(container = %name, since, "following container logs");

        let signals = futures_util::stream::unfold(tail, |mut tail| async move {
            let item = tail.next_signal().await?;
            Some((item, tail))
        });
        Ok(signals.take_until(cancel.cancelled_owned()).boxed())
    }
}
