//! In-memory [`EnvironmentRuntime`] for tests.
//!
//! Interprets a tiny subset of shell so that exec output goes through the
//! real frame encoding:
//!
//! - `echo <text>` writes `<text>\n` to stdout, exit 0
//! - `echo <text> >&2` writes `<text>\n` to stderr, exit 0
//! - `exit <n>` exits with `n`
//! - `sleep <secs>` produces nothing for `secs` seconds, exit 0
//! - anything else writes `sh: 1: <cmd>: not found` to stderr, exit 127
//!
//! Output is split into small chunks that do not line up with frame
//! boundaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use shellbox_core::{encode_frame, EnvironmentId, ExecId, StreamKind};
use tokio::sync::mpsc;

use crate::backend::{ContainerSpec, EnvironmentRuntime, ExecAttachment};
use crate::ExecutorError;

const CHUNK_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerState {
    Created,
    Running,
    Exited,
    Removed,
}

#[derive(Debug)]
struct Container {
    spec: ContainerSpec,
    state: ContainerState,
    execs: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    containers: HashMap<EnvironmentId, Container>,
    exit_codes: HashMap<ExecId, i64>,
}

/// In-memory container runtime.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
    create_delay: Duration,
    creates: AtomicUsize,
    removes: AtomicUsize,
    fail_create: AtomicBool,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    fail_remove: AtomicBool,
    fail_stream: AtomicBool,
}

impl FakeRuntime {
    /// Create an empty runtime where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create` call sleep first, widening race windows.
    #[must_use]
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    /// Make `create` fail.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make `start` fail.
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make `stop` fail.
    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make `remove` fail.
    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Make exec output streams error after their first chunk.
    pub fn fail_stream(&self, fail: bool) {
        self.fail_stream.store(fail, Ordering::SeqCst);
    }

    /// Number of `create` calls that produced a container.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of successful `remove` calls.
    #[must_use]
    pub fn remove_calls(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    /// Number of containers not yet removed.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.with_state(|s| {
            s.containers
                .values()
                .filter(|c| c.state != ContainerState::Removed)
                .count()
        })
    }

    /// Returns `true` if the container exists and is running.
    #[must_use]
    pub fn is_running(&self, id: &EnvironmentId) -> bool {
        self.state_of(id) == Some(ContainerState::Running)
    }

    /// Returns `true` if the container existed and has been removed.
    #[must_use]
    pub fn is_removed(&self, id: &EnvironmentId) -> bool {
        self.state_of(id) == Some(ContainerState::Removed)
    }

    /// Name the container was created with.
    #[must_use]
    pub fn name_of(&self, id: &EnvironmentId) -> Option<String> {
        self.with_state(|s| s.containers.get(id).map(|c| c.spec.name.clone()))
    }

    /// Every argv exec'd in the container, oldest first.
    #[must_use]
    pub fn exec_argv(&self, id: &EnvironmentId) -> Vec<Vec<String>> {
        self.with_state(|s| s.containers.get(id).map(|c| c.execs.clone()).unwrap_or_default())
    }

    fn state_of(&self, id: &EnvironmentId) -> Option<ContainerState> {
        self.with_state(|s| s.containers.get(id).map(|c| c.state))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let mut state = self.state.lock().expect("fake runtime lock poisoned");
        f(&mut state)
    }

    fn not_found(path: String) -> ExecutorError {
        ExecutorError::ApiStatus {
            status: 404,
            path,
            message: "No such container".to_owned(),
        }
    }

    fn injected(path: &str) -> ExecutorError {
        ExecutorError::ApiStatus {
            status: 500,
            path: path.to_owned(),
            message: "injected failure".to_owned(),
        }
    }
}

/// What the fake shell does with one command line.
struct Script {
    frames: Vec<u8>,
    exit_code: i64,
    hang: Option<Duration>,
}

fn interpret(command: &str) -> Script {
    let command = command.trim();
    let (program, rest) = command.split_once(' ').unwrap_or((command, ""));
    let done = |kind: StreamKind, text: String, exit_code: i64| Script {
        frames: if text.is_empty() { Vec::new() } else { encode_frame(kind, text.as_bytes()) },
        exit_code,
        hang: None,
    };
    match program {
        "" => done(StreamKind::Stdout, String::new(), 0),
        "echo" => match rest.strip_suffix(">&2") {
            Some(text) => done(StreamKind::Stderr, format!("{}\n", text.trim_end()), 0),
            None => done(StreamKind::Stdout, format!("{rest}\n"), 0),
        },
        "exit" => done(StreamKind::Stdout, String::new(), rest.trim().parse().unwrap_or(2)),
        "sleep" => Script {
            frames: Vec::new(),
            exit_code: 0,
            hang: Some(Duration::from_secs(rest.trim().parse().unwrap_or(1))),
        },
        other => done(StreamKind::Stderr, format!("sh: 1: {other}: not found\n"), 127),
    }
}

#[async_trait]
impl EnvironmentRuntime for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<EnvironmentId, ExecutorError> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::injected("/containers/create"));
        }
        let id = self.with_state(|s| {
            s.next_id += 1;
            let id = EnvironmentId::new(format!("{:064x}", s.next_id));
            s.containers.insert(
                id.clone(),
                Container {
                    spec: spec.clone(),
                    state: ContainerState::Created,
                    execs: Vec::new(),
                },
            );
            id
        });
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn start(&self, id: &EnvironmentId) -> Result<(), ExecutorError> {
        let path = format!("/containers/{id}/start");
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Self::injected(&path));
        }
        self.with_state(|s| match s.containers.get_mut(id) {
            Some(c) if c.state != ContainerState::Removed => {
                c.state = ContainerState::Running;
                Ok(())
            }
            _ => Err(Self::not_found(path)),
        })
    }

    async fn exec(&self, id: &EnvironmentId, argv: &[String]) -> Result<ExecAttachment, ExecutorError> {
        let path = format!("/containers/{id}/exec");
        let command = argv.last().cloned().unwrap_or_default();
        let script = interpret(&command);

        let exec_id = self.with_state(|s| {
            let container = match s.containers.get_mut(id) {
                Some(c) if c.state == ContainerState::Running => c,
                Some(_) => {
                    return Err(ExecutorError::ApiStatus {
                        status: 409,
                        path,
                        message: "container is not running".to_owned(),
                    })
                }
                None => return Err(Self::not_found(path)),
            };
            container.execs.push(argv.to_vec());
            let exec_id = ExecId::new(format!("exec-{}-{}", id.short(), container.execs.len()));
            s.exit_codes.insert(exec_id.clone(), script.exit_code);
            Ok(exec_id)
        })?;

        let fail_stream = self.fail_stream.load(Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            if let Some(delay) = script.hang {
                tokio::time::sleep(delay).await;
            }
            for chunk in script.frames.chunks(CHUNK_SIZE) {
                if tx.send(Ok(chunk.to_vec())).await.is_err() {
                    return;
                }
                if fail_stream {
                    let _ = tx
                        .send(Err(ExecutorError::ApiError("connection reset".to_owned())))
                        .await;
                    return;
                }
            }
        });

        Ok(ExecAttachment::new(exec_id, rx))
    }

    async fn exec_exit_code(&self, exec_id: &ExecId) -> Result<Option<i64>, ExecutorError> {
        self.with_state(|s| match s.exit_codes.get(exec_id) {
            Some(code) => Ok(Some(*code)),
            None => Err(Self::not_found(format!("/exec/{exec_id}/json"))),
        })
    }

    async fn stop(&self, id: &EnvironmentId, _grace: Duration) -> Result<(), ExecutorError> {
        let path = format!("/containers/{id}/stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Self::injected(&path));
        }
        self.with_state(|s| match s.containers.get_mut(id) {
            Some(c) if c.state != ContainerState::Removed => {
                c.state = ContainerState::Exited;
                Ok(())
            }
            _ => Err(Self::not_found(path)),
        })
    }

    async fn remove(&self, id: &EnvironmentId) -> Result<(), ExecutorError> {
        let path = format!("/containers/{id}");
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Self::injected(&path));
        }
        self.with_state(|s| match s.containers.get_mut(id) {
            Some(c) => {
                c.state = ContainerState::Removed;
                Ok(())
            }
            None => Err(Self::not_found(path)),
        })?;
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpret_echo_to_stderr() {
        let script = interpret("echo boom >&2");
        assert_eq!(script.frames, encode_frame(StreamKind::Stderr, b"boom\n"));
        assert_eq!(script.exit_code, 0);
    }

    #[test]
    fn interpret_unknown_command_exits_127() {
        let script = interpret("bad_cmd_xyz --flag");
        assert_eq!(script.exit_code, 127);
        assert!(script.frames.starts_with(&[2, 0, 0, 0]));
    }

    #[test]
    fn interpret_exit_uses_given_code() {
        assert_eq!(interpret("exit 3").exit_code, 3);
        assert!(interpret("exit 3").frames.is_empty());
    }
}
