//! Spawned process traits

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

/// What to spawn: program, arguments and environment overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Resolved executable path
    pub program: PathBuf,
    /// Arguments (without the program itself)
    pub args: Vec<String>,
    /// Variables layered over the inherited environment
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    /// Render the command line for logging
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// A live interactive process
///
/// `read_line` yields the process output line by line and returns `None`
/// once the output is closed (the process exited).
#[async_trait]
pub trait SpawnedProcess: Send {
    /// OS process id, if known
    fn pid(&self) -> Option<u32>;

    /// Write bytes to the process input
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read the next line of output
    async fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Whether the process is still running
    fn is_alive(&mut self) -> bool;

    /// Ask the process to terminate without waiting for it
    fn terminate(&mut self) -> io::Result<()>;
}

/// Spawns interactive processes
pub trait ProcessSpawner: Send + Sync {
    /// Spawn a process described by `spec`
    fn spawn(&self, spec: &ProcessSpec) -> io::Result<Box<dyn SpawnedProcess>>;
}
