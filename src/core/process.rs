use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::core::error::PlayerError;

/// A fully-built external command, kept as data so tests can inspect the
/// exact argument list without spawning anything.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Binary name without its directory, for log and error messages.
    pub fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }
}

/// Handle to a launched decoder/probe process. Termination is always forced:
/// a decoder blocked on a full output pipe will never exit gracefully.
pub trait ProcessHandle: Send {
    /// Force-terminate the process, tolerating one that already exited.
    fn kill(&mut self);

    /// Whether the process has already exited.
    fn has_exited(&mut self) -> bool;

    fn id(&self) -> u32;
}

/// A launched process: its stdout byte stream plus a kill handle.
pub struct LaunchedProcess {
    pub stdout: Box<dyn Read + Send>,
    pub handle: Box<dyn ProcessHandle>,
}

impl std::fmt::Debug for LaunchedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedProcess")
            .field("id", &self.handle.id())
            .finish_non_exhaustive()
    }
}

/// Capability for spawning the external decode/probe tools, injected into the
/// player so tests can substitute fake stream producers.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &CommandSpec) -> anyhow::Result<LaunchedProcess>;
}

/// Launcher backed by real OS processes.
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &CommandSpec) -> anyhow::Result<LaunchedProcess> {
        let tool = spec.tool_name();
        log::debug!("Launching {} {}", spec.program, spec.args.join(" "));

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PlayerError::ProcessLaunch {
                tool: tool.clone(),
                path: Path::new(&spec.program).to_path_buf(),
                source: e,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("{} spawned without a stdout pipe", tool))?;

        // The error pipe must be drained continuously; most decoders block
        // once it fills up. Lines go to the log, never to stdout.
        if let Some(stderr) = child.stderr.take() {
            let drain_tool = tool.clone();
            std::thread::spawn(move || {
                let reader = BufReader::new(stderr);
                for line in reader.lines() {
                    match line {
                        Ok(line) if !line.is_empty() => {
                            log::debug!("{}: {}", drain_tool, line);
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            });
        }

        log::debug!("Started {} (PID: {})", tool, child.id());

        Ok(LaunchedProcess {
            stdout: Box::new(stdout),
            handle: Box::new(SystemProcessHandle { child }),
        })
    }
}

struct SystemProcessHandle {
    child: Child,
}

impl ProcessHandle for SystemProcessHandle {
    fn kill(&mut self) {
        let pid = self.child.id();
        if let Ok(Some(status)) = self.child.try_wait() {
            log::debug!("Process {} already exited with {}", pid, status);
            return;
        }

        log::debug!("Killing process {}", pid);
        let _ = self.child.kill();

        // Wait for the process to fully terminate with a timeout so teardown
        // never hangs on a stuck child.
        let start_time = Instant::now();
        let timeout = Duration::from_millis(500);

        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => {
                    log::debug!("Process {} terminated", pid);
                    break;
                }
                Ok(None) => {
                    if start_time.elapsed() > timeout {
                        log::warn!("Process {} taking too long to terminate, force killing", pid);
                        let _ = self.child.kill();
                        let _ = self.child.wait();
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    log::warn!("Error waiting for process {}: {}", pid, e);
                    break;
                }
            }
        }
    }

    fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    fn id(&self) -> u32 {
        self.child.id()
    }
}
