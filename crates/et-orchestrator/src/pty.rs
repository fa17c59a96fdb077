//! Session processes on a pseudo-terminal
//!
//! The session manager is run attached to a PTY, the way an operator would
//! run it from a shell. A reader thread keeps draining the PTY for the whole
//! life of the process so the plugin never blocks on a full terminal. Lines
//! go to a bounded queue that sheds its oldest entry when full; the newest
//! line, which is where the ready marker shows up, is always kept.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtyPair, PtySize};
use tokio::sync::Notify;

use et_core::traits::{ProcessSpawner, ProcessSpec, SpawnedProcess};

/// Lines kept for a reader that is not keeping up
const OUTPUT_BUFFER_LINES: usize = 256;

/// Spawns processes on a fresh PTY each
#[derive(Debug, Clone)]
pub struct PtySpawner {
    size: PtySize,
}

impl PtySpawner {
    /// Create a spawner with a wide terminal so output lines do not wrap
    pub fn new() -> Self {
        Self {
            size: PtySize {
                rows: 24,
                cols: 200,
                pixel_width: 0,
                pixel_height: 0,
            },
        }
    }
}

impl Default for PtySpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self, spec: &ProcessSpec) -> io::Result<Box<dyn SpawnedProcess>> {
        let PtyPair { master, slave } = native_pty_system()
            .openpty(self.size)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("openpty: {}", e)))?;

        // CommandBuilder starts from the current environment; overrides win
        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = slave
            .spawn_command(cmd)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        // Only the child holds the slave side now, so its exit closes our reader
        drop(slave);

        let pid = child.process_id();
        tracing::debug!("Spawned {:?} with PID {:?}", spec.program, pid);

        let reader = master
            .try_clone_reader()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let output = Arc::new(OutputQueue::new(OUTPUT_BUFFER_LINES));
        let pump_queue = Arc::clone(&output);
        std::thread::Builder::new()
            .name(format!("session-output-{}", pid.unwrap_or(0)))
            .spawn(move || pump_output(pid, reader, &pump_queue))?;

        Ok(Box::new(PtyProcess {
            pid,
            child,
            _master: master,
            writer,
            output,
        }))
    }
}

/// Read PTY output line by line until the terminal closes
fn pump_output(pid: Option<u32>, reader: Box<dyn Read + Send>, output: &OutputQueue) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                tracing::trace!("[pid {:?}] {}", pid, line);
                if output.push(line) {
                    tracing::trace!("Output queue of PID {:?} full, oldest line dropped", pid);
                }
            }
            // Linux reports EIO once the slave side is gone
            Err(e) => {
                tracing::trace!("Output of PID {:?} closed: {}", pid, e);
                break;
            }
        }
    }

    output.close();
}

/// Bounded line queue between the PTY reader thread and async readers
struct OutputQueue {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    closed: AtomicBool,
    ready: Notify,
}

impl OutputQueue {
    fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            ready: Notify::new(),
        }
    }

    /// Queue a line, dropping the oldest one when full. Returns whether a
    /// line was dropped.
    fn push(&self, line: String) -> bool {
        let dropped = {
            let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
            let dropped = lines.len() >= self.capacity;
            if dropped {
                lines.pop_front();
            }
            lines.push_back(line);
            dropped
        };
        self.ready.notify_one();
        dropped
    }

    fn pop(&self) -> Option<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Mark the output as finished; queued lines stay readable
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready.notify_one();
    }

    /// Next line, or `None` once the output is closed and drained
    async fn next(&self) -> Option<String> {
        loop {
            if let Some(line) = self.pop() {
                return Some(line);
            }
            if self.closed.load(Ordering::SeqCst) {
                // A last line may have landed between the pop and the close
                return self.pop();
            }
            self.ready.notified().await;
        }
    }
}

/// A process running on a PTY
pub struct PtyProcess {
    pid: Option<u32>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    output: Arc<OutputQueue>,
}

#[async_trait]
impl SpawnedProcess for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.output.next().await)
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.child.kill();
        }
    }
}
