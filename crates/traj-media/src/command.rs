//! FFmpeg command builder and external tool runner.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file paths, in `-i` order
    inputs: Vec<PathBuf>,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before the first -i)
    input_args: Vec<String>,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input file.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Set video sync method.
    pub fn vsync(self, method: impl Into<String>) -> Self {
        self.output_arg("-vsync").output_arg(method)
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.iter().cloned());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for external conversion tools with timeout and stderr capture.
///
/// Children are spawned with `kill_on_drop`, so dropping the future of a run
/// (for example on Ctrl-C) also terminates the tool.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    /// Timeout for one invocation
    timeout: Option<Duration>,
}

impl ToolRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run_ffmpeg(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let ffmpeg = check_ffmpeg()?;
        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        self.run(&ffmpeg, &args).await
    }

    /// Run an arbitrary tool, resolving it on `PATH` when given a bare name.
    pub async fn run_tool(&self, program: impl AsRef<OsStr>, args: &[String]) -> MediaResult<()> {
        let program = program.as_ref();
        let resolved = which::which(program)
            .map_err(|_| MediaError::ToolNotFound(program.to_string_lossy().to_string()))?;
        debug!("Running {} {}", resolved.display(), args.join(" "));

        self.run(&resolved, args).await
    }

    async fn run(&self, program: &Path, args: &[String]) -> MediaResult<()> {
        let tool = program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| program.display().to_string());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::tool_failed(&tool, "stderr not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress blocks go to the debug log; everything else is kept as the error tail.
        let progress_tool = tool.clone();
        let stderr_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_line(&line) {
                    if let Some(progress) = parse_progress_line(&line, &mut current) {
                        debug!(
                            tool = %progress_tool,
                            frame = progress.frame,
                            out_time_ms = progress.out_time_ms,
                            speed = progress.speed,
                            "Conversion progress"
                        );
                    }
                    continue;
                }

                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let result = self.wait_for_completion(&tool, &mut child).await;
        let stderr_tail = stderr_handle.await.unwrap_or_default();

        match result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(MediaError::tool_failed(
                &tool,
                "exited with non-zero status",
                Some(stderr_tail).filter(|s| !s.is_empty()),
                status.code(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Wait for the child process, killing it if the timeout expires.
    async fn wait_for_completion(
        &self,
        tool: &str,
        child: &mut Child,
    ) -> MediaResult<std::process::ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait().await?);
        };

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        match waited {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!("{} timed out after {:?}, killing process", tool, timeout);
                let _ = child.kill().await;
                Err(MediaError::Timeout(timeout.as_secs()))
            }
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound("ffmpeg".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_orders_inputs() {
        let cmd = FfmpegCommand::new("/tmp/out/fused.mp4")
            .input("/tmp/left.mp4")
            .input("/tmp/right.mp4")
            .vsync("2")
            .filter_complex("hstack");

        let args = cmd.build_args();
        let left = args.iter().position(|a| a == "/tmp/left.mp4").unwrap();
        let right = args.iter().position(|a| a == "/tmp/right.mp4").unwrap();
        let filter = args.iter().position(|a| a == "-filter_complex").unwrap();

        assert_eq!(args[0], "-y");
        assert_eq!(args[left - 1], "-i");
        assert!(left < right && right < filter);
        assert_eq!(args[filter + 1], "hstack");
        assert_eq!(args.last().unwrap(), "/tmp/out/fused.mp4");
    }

    #[test]
    fn test_log_level_override() {
        let args = FfmpegCommand::new("o.mp4").log_level("warning").build_args();
        let v = args.iter().position(|a| a == "-v").unwrap();
        assert_eq!(args[v + 1], "warning");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_reports_exit_code_and_stderr() {
        let args = vec![
            "-c".to_string(),
            "echo 'bad svo header' >&2; exit 3".to_string(),
        ];
        let err = ToolRunner::new().run_tool("sh", &args).await.unwrap_err();

        match err {
            MediaError::ToolFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr.as_deref(), Some("bad svo header"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_timeout() {
        let args = vec!["5".to_string()];
        let err = ToolRunner::new()
            .with_timeout(Duration::from_millis(50))
            .run_tool("sleep", &args)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Timeout(_)));
    }

    #[test]
    fn test_missing_tool() {
        let err = tokio_test::block_on(
            ToolRunner::new().run_tool("definitely-not-a-real-exporter-binary", &[]),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(_)));
    }
}
