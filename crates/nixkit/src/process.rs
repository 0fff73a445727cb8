//! Child process helpers: bounded capture and streamed output.

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Interval between exit checks of a bounded child
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Number of stderr lines kept for error classification
const STDERR_TAIL_LINES: usize = 40;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Result of a command whose output was streamed to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Streamed {
    pub exit_code: i32,
    /// Last lines of stderr, for classification
    pub stderr_tail: String,
}

impl Streamed {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Locate an executable in PATH
pub fn find_tool(tool: &'static str) -> Result<PathBuf> {
    which::which(tool).map_err(|_| Error::ToolNotFound { tool })
}

/// Describe a command for messages (`program arg arg`)
pub fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn exit_code(status: ExitStatus) -> i32 {
    // killed by a signal
    status.code().unwrap_or(-1)
}

fn read_all(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    buf
}

/// Run a command with a hard deadline, capturing its output
///
/// The child is killed once `timeout` elapses and its pipe readers are
/// left detached.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Captured> {
    let what = describe(cmd);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out = thread::spawn(move || stdout.map(read_all).unwrap_or_default());
    let err = thread::spawn(move || stderr.map(read_all).unwrap_or_default());

    match wait_until(&mut child, Instant::now() + timeout)? {
        Some(status) => Ok(Captured {
            exit_code: exit_code(status),
            stdout: out.join().unwrap_or_default(),
            stderr: err.join().unwrap_or_default(),
        }),
        None => {
            log::debug!("Killed `{what}` after {timeout:?}");
            Err(Error::Timeout {
                command: what,
                after: timeout,
            })
        }
    }
}

/// Wait for `child` until `deadline`; kill it and return `None` on expiry
fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

enum Line {
    Out(String),
    Err(String),
}

/// Run a command to completion, streaming stdout and stderr into `sink`
pub fn run_streaming(cmd: &mut Command, sink: &mut dyn Write) -> Result<Streamed> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (tx, rx) = mpsc::channel::<Line>();

    let mut tail: Vec<String> = Vec::new();

    thread::scope(|scope| {
        let out_tx = tx.clone();
        scope.spawn(move || {
            if let Some(pipe) = stdout {
                for line in BufReader::new(pipe).lines().map_while(std::result::Result::ok) {
                    if out_tx.send(Line::Out(line)).is_err() {
                        break;
                    }
                }
            }
        });
        scope.spawn(move || {
            if let Some(pipe) = stderr {
                for line in BufReader::new(pipe).lines().map_while(std::result::Result::ok) {
                    if tx.send(Line::Err(line)).is_err() {
                        break;
                    }
                }
            }
        });

        // ends once both readers hang up
        for line in rx {
            match line {
                Line::Out(text) => {
                    let _ = writeln!(sink, "{text}");
                }
                Line::Err(text) => {
                    let _ = writeln!(sink, "{text}");
                    tail.push(text);
                    if tail.len() > STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                }
            }
        }
    });

    let status = child.wait()?;
    let _ = sink.flush();

    Ok(Streamed {
        exit_code: exit_code(status),
        stderr_tail: tail.join("\n"),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn test_run_with_timeout_captures_output() {
        let out = run_with_timeout(&mut sh("echo hi; echo oops >&2; exit 3"), Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, b"hi\n");
        assert_eq!(out.stderr_str(), "oops\n");
        assert!(!out.success());
    }

    #[test]
    fn test_run_with_timeout_kills_slow_child() {
        let started = Instant::now();
        let err = run_with_timeout(&mut sh("exec sleep 5"), Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_run_streaming_writes_both_streams() {
        let mut sink: Vec<u8> = Vec::new();
        let result = run_streaming(&mut sh("echo building; echo 'error: boom' >&2; exit 1"), &mut sink)
            .unwrap();

        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("building"));
        assert!(text.contains("error: boom"));
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr_tail, "error: boom");
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let mut sink: Vec<u8> = Vec::new();
        let result = run_streaming(
            &mut sh("i=0; while [ $i -lt 100 ]; do echo line$i >&2; i=$((i+1)); done"),
            &mut sink,
        )
        .unwrap();
        assert!(result.success());
        assert_eq!(result.stderr_tail.lines().count(), STDERR_TAIL_LINES);
        assert!(result.stderr_tail.ends_with("line99"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&sh("true")), "sh -c true");
    }

    #[test]
    fn test_find_tool_missing() {
        assert!(matches!(
            find_tool("definitely-not-a-real-tool-xyz"),
            Err(Error::ToolNotFound { .. })
        ));
    }
}
