//! 命令执行器
//!
//! 所有集群、chart、镜像仓库操作都通过外部 CLI 完成，提供统一的执行接口：
//! - 超时控制（超时后杀掉子进程）
//! - 可选 stdin 输入（manifest、密码等不出现在命令行参数里）
//! - stdout/stderr 分离

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

/// 命令描述
#[derive(Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// 写入子进程 stdin 的内容
    pub stdin: Option<String>,
    /// 额外环境变量（只作用于子进程）
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            envs: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// 完整命令行（用于日志，不含 stdin 和环境变量）
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

// stdin and envs may carry secrets, keep them out of Debug output
impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.command_line())
            .field("stdin", &self.stdin.as_ref().map(|s| s.len()))
            .field("envs", &self.envs.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// 命令执行结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    /// 退出码（被信号终止时为 None）
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 诊断文本：优先 stderr，为空时回退到 stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    /// 构造成功输出
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// 构造失败输出
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// 命令执行错误
#[derive(Debug)]
pub enum CommandError {
    /// 命令启动失败
    SpawnFailed(std::io::Error),
    /// 写入 stdin 失败
    StdinFailed(std::io::Error),
    /// 命令超时
    Timeout(Duration),
    /// 等待命令完成失败
    WaitFailed(std::io::Error),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::StdinFailed(e) => write!(f, "Failed to write command stdin: {}", e),
            CommandError::Timeout(d) => write!(f, "Command timed out after {}s", d.as_secs()),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e)
            | CommandError::StdinFailed(e)
            | CommandError::WaitFailed(e) => Some(e),
            CommandError::Timeout(_) => None,
        }
    }
}

/// 外部命令执行能力
///
/// 组件在构造时注入，测试中替换为脚本化实现
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// 基于 tokio 子进程的执行器
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %spec.command_line(), "Running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(CommandError::SpawnFailed)?;

        if let Some(ref input) = spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .await
                    .map_err(CommandError::StdinFailed)?;
                // 关闭 stdin，让子进程读到 EOF
                drop(stdin);
            }
        }

        // 超时分支会丢弃 child，kill_on_drop 负责终止进程
        tokio::select! {
            result = child.wait_with_output() => {
                let output = result.map_err(CommandError::WaitFailed)?;
                Ok(CommandOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            _ = tokio::time::sleep(spec.timeout) => {
                error!(command = %spec.program, "Command timed out after {:?}", spec.timeout);
                Err(CommandError::Timeout(spec.timeout))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_success() {
        let spec = CommandSpec::new("echo", Duration::from_secs(5)).arg("hello");
        let output = ProcessRunner.run(&spec).await.unwrap();

        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_pipes_stdin() {
        let spec = CommandSpec::new("cat", Duration::from_secs(5)).stdin("kind: Namespace\n");
        let output = ProcessRunner.run(&spec).await.unwrap();

        assert_eq!(output.stdout, "kind: Namespace\n");
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let spec = CommandSpec::new("nonexistent_command_12345", Duration::from_secs(5));
        let result = ProcessRunner.run(&spec).await;

        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(100)).arg("5");
        let result = ProcessRunner.run(&spec).await;

        assert!(matches!(result, Err(CommandError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_output_not_error() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo boom >&2; exit 3"]);
        let output = ProcessRunner.run(&spec).await.unwrap();

        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.diagnostic(), "boom");
    }

    #[test]
    fn test_debug_hides_stdin() {
        let spec = CommandSpec::new("docker", Duration::from_secs(1))
            .args(["login", "ghcr.io"])
            .stdin("hunter2");
        let printed = format!("{:?}", spec);

        assert!(printed.contains("docker login ghcr.io"));
        assert!(!printed.contains("hunter2"));
    }
}
