//! Interleaving of subprocess output streams
//!
//! Two reader threads pull bytes from the child's stdout and stderr as they
//! become available and push timestamped chunks into a shared queue. A
//! draining consumer on the calling thread echoes every chunk to the user
//! the moment it is observed and retains the full interleaved log for later
//! packaging. The captured log and the live echo see chunks in the same
//! order.

use crate::error::{Error, Result};
use crate::ui::UI;
use chrono::{DateTime, Utc};
use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

const READ_BUF_SIZE: usize = 8192;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    // Error output wins ties so failures surface promptly.
    fn rank(self) -> u8 {
        match self {
            StreamSource::Stderr => 0,
            StreamSource::Stdout => 1,
        }
    }
}

/// One unit of captured output
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub source: StreamSource,
    pub timestamp: DateTime<Utc>,
    pub bytes: Vec<u8>,
}

impl OutputChunk {
    pub fn new(source: StreamSource, bytes: Vec<u8>) -> Self {
        OutputChunk {
            source,
            timestamp: Utc::now(),
            bytes,
        }
    }
}

/// Order a batch of chunks that arrived close together: chronological by
/// observed millisecond, stderr before stdout on ties. The sort is stable,
/// so chunks from the same stream keep their arrival order.
pub fn order_batch(batch: &mut [OutputChunk]) {
    batch.sort_by_key(|chunk| (chunk.timestamp.timestamp_millis(), chunk.source.rank()));
}

/// Merges two byte streams into one ordered, echoed, captured log
pub struct StreamMultiplexer {
    rx: Receiver<OutputChunk>,
    readers: Vec<JoinHandle<std::io::Result<()>>>,
}

impl StreamMultiplexer {
    /// Start one reader thread per stream.
    pub fn start<O, E>(stdout: O, stderr: E) -> Self
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let readers = vec![
            spawn_reader(StreamSource::Stdout, stdout, tx.clone()),
            spawn_reader(StreamSource::Stderr, stderr, tx),
        ];

        StreamMultiplexer { rx, readers }
    }

    /// Drain until both streams have closed and the queue is empty,
    /// returning the captured log. `tick` runs at least once per poll
    /// interval, so the caller can watch for interrupts without blocking
    /// indefinitely even while the child stays chatty.
    pub fn drain<F>(self, ui: &mut dyn UI, mut tick: F) -> Result<Vec<u8>>
    where
        F: FnMut() -> Result<()>,
    {
        let mut captured = Vec::new();

        loop {
            tick()?;

            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(first) => {
                    // Gather the burst of chunks observed together before
                    // ordering them.
                    let mut batch = vec![first];
                    while let Ok(chunk) = self.rx.try_recv() {
                        batch.push(chunk);
                    }
                    order_batch(&mut batch);

                    for chunk in &batch {
                        ui.output_bytes(&chunk.bytes)?;
                        captured.extend_from_slice(&chunk.bytes);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Both senders gone and nothing buffered: the streams are done.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for reader in self.readers {
            match reader.join() {
                Ok(result) => result?,
                Err(_) => {
                    return Err(Error::CommandExecution(
                        "output reader thread panicked".to_string(),
                    ))
                }
            }
        }

        Ok(captured)
    }
}

fn spawn_reader<R>(
    source: StreamSource,
    mut stream: R,
    tx: Sender<OutputChunk>,
) -> JoinHandle<std::io::Result<()>>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    // Partial reads are valid chunks; forward them as-is.
                    if tx.send(OutputChunk::new(source, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                // A low-level EOF mid-read is graceful completion, not an
                // error; any bytes before it have already been forwarded.
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
}
