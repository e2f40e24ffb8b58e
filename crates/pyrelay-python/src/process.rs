//! Deadline-bounded subprocess execution
//!
//! Output pipes are drained on reader threads while the parent polls
//! `try_wait`, so a child that fills its pipe buffer or never exits cannot
//! block the caller past the deadline. On Unix the child leads its own
//! process group, and the whole group is killed once the child is done or
//! the deadline passes, so nothing it forked outlives the call. On timeout
//! the partial output is discarded.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How long to wait for the pipes to drain after the child exited
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Cap on captured bytes per stream
const MAX_CAPTURE_BYTES: usize = 64 * 1024;

#[derive(Debug)]
pub struct BoundedOutput {
    pub pid: u32,
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl BoundedOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }
}

/// Spawn `command` and wait for it at most `timeout`
///
/// Stdin is closed; stdout and stderr are captured.
pub fn run_with_deadline(mut command: Command, timeout: Duration) -> io::Result<BoundedOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        command.process_group(0);
    }

    let mut child = command.spawn()?;
    let pid = child.id();
    debug!("Spawned pid {} with a {:?} deadline", pid, timeout);

    let stdout_rx = child.stdout.take().map(drain_in_background);
    let stderr_rx = child.stderr.take().map(drain_in_background);

    let deadline = Instant::now().checked_add(timeout);
    let (status, timed_out) = loop {
        match child.try_wait() {
            Ok(Some(status)) => break (status, false),
            Ok(None) => {}
            Err(e) => {
                kill_process_group(pid);
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_process_group(pid);
            let _ = child.kill();
            let status = child.wait()?;
            debug!("Killed process group {} after deadline", pid);
            break (status, true);
        }
        thread::sleep(POLL_INTERVAL);
    };
    // Background processes the child left behind would hold the pipes open
    if !timed_out {
        kill_process_group(pid);
    }

    let (stdout, stderr) = if timed_out {
        (Vec::new(), Vec::new())
    } else {
        (collect(stdout_rx), collect(stderr_rx))
    };

    Ok(BoundedOutput {
        pid,
        status,
        stdout,
        stderr,
        timed_out,
    })
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!("killpg({}) failed: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

fn drain_in_background<R: Read + Send + 'static>(reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let captured = read_to_end_capped(reader, MAX_CAPTURE_BYTES).unwrap_or_default();
        let _ = tx.send(captured);
    });
    rx
}

// A grandchild may inherit the pipe and keep it open, so never wait forever.
fn collect(rx: Option<Receiver<Vec<u8>>>) -> Vec<u8> {
    rx.and_then(|rx| rx.recv_timeout(DRAIN_GRACE).ok())
        .unwrap_or_default()
}

/// Read everything, keeping at most `cap` bytes
pub fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let room = cap.saturating_sub(out.len());
        out.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok(out)
}
