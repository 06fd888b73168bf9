use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde_json::Value;
use tokio::process::Command;

use super::error::{QueryError, diagnostic};
use super::normalize::{RawForest, normalize};
use crate::model::entry::Forest;
use crate::notice::{Notice, Reporter};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Result of one `forester query`.
pub type QueryOutcome = Result<Forest, QueryError>;

/// A single run of the forester executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a process ended. Either part may be missing: a process killed by a
/// signal has no exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub const SUCCESS: ExitInfo = ExitInfo {
        code: Some(0),
        signal: None,
    };

    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }

    fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: exit_signal(&status),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code {code}")?,
            None => write!(f, "code null")?,
        }
        match self.signal {
            Some(signal) => write!(f, " and signal {}", signal_name(signal)),
            None => write!(f, " and signal null"),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

pub fn signal_name(signal: i32) -> String {
    let name = match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        6 => "SIGABRT",
        8 => "SIGFPE",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        _ => return format!("SIG{signal}"),
    };
    name.to_string()
}

/// Everything a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit: ExitInfo,
    pub stdout: String,
    pub stderr: String,
}

/// The ability to run an external program.
///
/// Implementations must stop the process when the returned future is
/// dropped; the runner's timeout relies on it.
#[async_trait]
pub trait ProcessBackend: Send + Sync {
    async fn output(&self, invocation: &Invocation) -> io::Result<ProcessOutput>;
}

/// Spawns real processes through tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

#[async_trait]
impl ProcessBackend for SystemBackend {
    async fn output(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProcessOutput {
            exit: ExitInfo::from_status(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs forester queries with a hard time limit and turns whatever happens
/// into a [`QueryOutcome`].
#[derive(Clone)]
pub struct Runner {
    backend: Arc<dyn ProcessBackend>,
    timeout: Duration,
}

impl Runner {
    pub fn new(backend: Arc<dyn ProcessBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn run(&self, invocation: &Invocation) -> QueryOutcome {
        let started = Instant::now();
        tracing::debug!("running {invocation}");

        // Dropping the backend future on timeout kills the child.
        let output =
            match tokio::time::timeout(self.timeout, self.backend.output(invocation)).await {
                Ok(Ok(output)) => output,
                Ok(Err(err)) => {
                    return Err(QueryError::Spawn {
                        message: err.to_string(),
                    });
                }
                Err(_) => {
                    tracing::warn!("{invocation} killed after {:?}", self.timeout);
                    return Err(QueryError::Timeout {
                        secs: whole_seconds(self.timeout),
                    });
                }
            };

        tracing::debug!(
            "{invocation} finished with {} in {:?}",
            output.exit,
            started.elapsed()
        );

        if !output.exit.success() {
            return Err(QueryError::Exit {
                exit: output.exit,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        match serde_json::from_str::<Value>(&output.stdout) {
            Ok(value) => Ok(normalize(RawForest::from(value))),
            Err(_) => Err(QueryError::Parse {
                stdout: output.stdout,
                stderr: output.stderr,
            }),
        }
    }
}

fn whole_seconds(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Runs one-shot forester commands such as `new`.
///
/// There is no timeout here: these commands are started by the user and
/// are expected to finish. Problems are reported, never returned.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn ProcessBackend>,
    reporter: Arc<dyn Reporter>,
}

impl Executor {
    pub fn new(backend: Arc<dyn ProcessBackend>, reporter: Arc<dyn Reporter>) -> Self {
        Self { backend, reporter }
    }

    /// Trimmed stdout, or `None` when the command did not complete.
    pub async fn execute(&self, invocation: &Invocation) -> Option<String> {
        tracing::debug!("executing {invocation}");

        let output = match self.backend.output(invocation).await {
            Ok(output) => output,
            Err(err) => {
                self.reporter.report(Notice::critical(format!(
                    "failed to run `{invocation}`: {err}"
                )));
                return None;
            }
        };

        if !output.exit.success() {
            self.reporter.report(Notice::error(diagnostic(
                &format!("`{invocation}` failed: process exited with {}", output.exit),
                &output.stdout,
                &output.stderr,
            )));
            return None;
        }

        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            self.reporter.report(Notice::error(stderr.to_string()));
        }

        Some(output.stdout.trim().to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notice::{Notices, Severity};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Scripted backend: hands out canned results and records invocations.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub results: Mutex<Vec<io::Result<ProcessOutput>>>,
        pub calls: Mutex<Vec<Invocation>>,
        pub delay: Option<Duration>,
        pub started: AtomicUsize,
    }

    impl FakeBackend {
        pub(crate) fn replying(results: Vec<io::Result<ProcessOutput>>) -> Self {
            Self {
                results: Mutex::new(results),
                ..Self::default()
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl ProcessBackend for FakeBackend {
        async fn output(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(invocation.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(ok_output("[]"))
            } else {
                results.remove(0)
            }
        }
    }

    /// Never finishes; flags when the runner drops it.
    struct HangingBackend {
        killed: Arc<AtomicBool>,
    }

    struct KillOnDrop(Arc<AtomicBool>);

    impl Drop for KillOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ProcessBackend for HangingBackend {
        async fn output(&self, _invocation: &Invocation) -> io::Result<ProcessOutput> {
            let _child = KillOnDrop(self.killed.clone());
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    pub(crate) fn ok_output(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            exit: ExitInfo::SUCCESS,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub(crate) fn invocation(args: &[&str]) -> Invocation {
        Invocation {
            program: PathBuf::from("forester"),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: PathBuf::from("."),
        }
    }

    fn runner(backend: impl ProcessBackend + 'static) -> Runner {
        Runner::new(Arc::new(backend), DEFAULT_TIMEOUT)
    }

    #[tokio::test]
    async fn list_response_becomes_forest() {
        let backend = FakeBackend::replying(vec![Ok(ok_output(
            r#"[{"uri":"abc","title":"Hello","taxon":null,"tags":[],"route":"abc.xml","metas":{},"sourcePath":"trees/abc.tree"}]"#,
        ))]);

        let forest = runner(backend)
            .run(&invocation(&["query", "all"]))
            .await
            .unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].uri, "abc");
    }

    #[tokio::test]
    async fn keyed_response_becomes_forest() {
        let backend = FakeBackend::replying(vec![Ok(ok_output(
            r#"{"abc":{"title":"Hello"},"def":{"title":null}}"#,
        ))]);

        let forest = runner(backend)
            .run(&invocation(&["query", "all"]))
            .await
            .unwrap();
        let uris: Vec<&str> = forest.iter().map(|e| e.uri.as_str()).collect();
        assert_eq!(uris, ["abc", "def"]);
    }

    #[tokio::test]
    async fn exit_code_is_reported_with_output() {
        let backend = FakeBackend::replying(vec![Ok(ProcessOutput {
            exit: ExitInfo::code(2),
            stdout: "half".into(),
            stderr: "boom".into(),
        })]);

        let err = runner(backend)
            .run(&invocation(&["query", "all"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains('2'));
        assert_eq!(err.stdout(), "half");
        assert_eq!(err.stderr(), "boom");
        assert!(!err.is_critical());
    }

    #[tokio::test]
    async fn signal_termination_is_a_failure() {
        let backend = FakeBackend::replying(vec![Ok(ProcessOutput {
            exit: ExitInfo {
                code: None,
                signal: Some(15),
            },
            stdout: String::new(),
            stderr: String::new(),
        })]);

        let err = runner(backend)
            .run(&invocation(&["query", "all"]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "process exited with code null and signal SIGTERM"
        );
    }

    #[tokio::test]
    async fn invalid_json_keeps_raw_stdout() {
        let backend = FakeBackend::replying(vec![Ok(ok_output("Error: no forest.toml"))]);

        let err = runner(backend)
            .run(&invocation(&["query", "all"]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "didn't return a valid JSON response:\nError: no forest.toml"
        );
        assert_eq!(err.stdout(), "Error: no forest.toml");
    }

    #[tokio::test]
    async fn spawn_failure_is_critical() {
        let backend = FakeBackend::replying(vec![Err(io::Error::new(
            io::ErrorKind::NotFound,
            "No such file or directory (os error 2)",
        ))]);

        let err = runner(backend)
            .run(&invocation(&["query", "all"]))
            .await
            .unwrap_err();
        assert!(err.is_critical());
        assert_eq!(err.to_string(), "No such file or directory (os error 2)");
        assert_eq!(err.stderr(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_kills_the_process() {
        let killed = Arc::new(AtomicBool::new(false));
        let runner = runner(HangingBackend {
            killed: killed.clone(),
        });

        let err = runner
            .run(&invocation(&["query", "all"]))
            .await
            .unwrap_err();

        assert_eq!(err, QueryError::Timeout { secs: 30 });
        assert_eq!(err.to_string(), "timed out after 30s");
        assert!(killed.load(Ordering::SeqCst));
    }

    #[test]
    fn sub_second_timeouts_round_up() {
        assert_eq!(whole_seconds(Duration::from_millis(200)), 1);
        assert_eq!(whole_seconds(DEFAULT_TIMEOUT), 30);
    }

    #[tokio::test]
    async fn executor_returns_trimmed_stdout() {
        let notices = Arc::new(Notices::new());
        let executor = Executor::new(
            Arc::new(FakeBackend::replying(vec![Ok(ok_output(
                "  trees/jms-0042.tree\n",
            ))])),
            notices.clone(),
        );

        let out = executor.execute(&invocation(&["new"])).await;
        assert_eq!(out.as_deref(), Some("trees/jms-0042.tree"));
        assert!(notices.drain().is_empty());
    }

    #[tokio::test]
    async fn executor_surfaces_stderr_but_keeps_output() {
        let notices = Arc::new(Notices::new());
        let executor = Executor::new(
            Arc::new(FakeBackend::replying(vec![Ok(ProcessOutput {
                exit: ExitInfo::SUCCESS,
                stdout: "trees/a.tree\n".into(),
                stderr: "warning: template not found\n".into(),
            })])),
            notices.clone(),
        );

        let out = executor.execute(&invocation(&["new"])).await;
        assert_eq!(out.as_deref(), Some("trees/a.tree"));

        let reported = notices.drain();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].severity, Severity::Error);
        assert_eq!(reported[0].message, "warning: template not found");
    }

    #[tokio::test]
    async fn executor_failure_yields_nothing_and_a_diagnostic() {
        let notices = Arc::new(Notices::new());
        let executor = Executor::new(
            Arc::new(FakeBackend::replying(vec![Ok(ProcessOutput {
                exit: ExitInfo::code(1),
                stdout: String::new(),
                stderr: "error: prefix is required\n".into(),
            })])),
            notices.clone(),
        );

        assert_eq!(executor.execute(&invocation(&["new"])).await, None);

        let reported = notices.drain();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].message.contains("code 1"));
        assert!(reported[0].message.contains("error: prefix is required"));
    }

    #[tokio::test]
    async fn executor_spawn_failure_is_critical() {
        let notices = Arc::new(Notices::new());
        let executor = Executor::new(
            Arc::new(FakeBackend::replying(vec![Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            ))])),
            notices.clone(),
        );

        assert_eq!(executor.execute(&invocation(&["new"])).await, None);
        assert_eq!(notices.drain()[0].severity, Severity::Critical);
    }

    #[cfg(unix)]
    mod system {
        use super::*;

        fn sh(script: &str) -> Invocation {
            Invocation {
                program: PathBuf::from("sh"),
                args: vec!["-c".into(), script.into()],
                cwd: std::env::temp_dir(),
            }
        }

        #[tokio::test]
        async fn real_process_exit_code() {
            let runner = Runner::new(Arc::new(SystemBackend), DEFAULT_TIMEOUT);
            let err = runner.run(&sh("echo oops >&2; exit 2")).await.unwrap_err();

            assert_eq!(err.to_string(), "process exited with code 2 and signal null");
            assert_eq!(err.stderr().trim(), "oops");
        }

        #[tokio::test]
        async fn real_process_json() {
            let runner = Runner::new(Arc::new(SystemBackend), DEFAULT_TIMEOUT);
            let forest = runner
                .run(&sh(r#"printf '%s' '[{"uri":"x-0001","title":"X"}]'"#))
                .await
                .unwrap();
            assert_eq!(forest[0].uri, "x-0001");
        }

        #[tokio::test]
        async fn real_process_is_killed_on_timeout() {
            let runner = Runner::new(Arc::new(SystemBackend), Duration::from_millis(200));
            let started = Instant::now();
            let err = runner
                .run(&Invocation {
                    program: PathBuf::from("sleep"),
                    args: vec!["10".into()],
                    cwd: std::env::temp_dir(),
                })
                .await
                .unwrap_err();

            assert!(matches!(err, QueryError::Timeout { .. }));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn missing_executable_is_a_spawn_error() {
            let runner = Runner::new(Arc::new(SystemBackend), DEFAULT_TIMEOUT);
            let err = runner
                .run(&Invocation {
                    program: PathBuf::from("/definitely/not/forester"),
                    args: vec![],
                    cwd: std::env::temp_dir(),
                })
                .await
                .unwrap_err();
            assert!(err.is_critical());
        }

        #[tokio::test]
        async fn executor_against_real_processes() {
            let notices = Arc::new(Notices::new());
            let executor = Executor::new(Arc::new(SystemBackend), notices.clone());

            let out = executor.execute(&sh("echo '  trees/new.tree  '")).await;
            assert_eq!(out.as_deref(), Some("trees/new.tree"));
            assert!(notices.drain().is_empty());

            assert_eq!(executor.execute(&sh("exit 1")).await, None);
            assert!(!notices.drain().is_empty());
        }
    }
}
