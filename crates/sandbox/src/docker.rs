//! Docker-backed sandbox.

use crate::error::{BuildError, RunError};
use crate::paths::PathMapper;
use crate::runtime::{Arg, CapturedOutput, Sandbox};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DockerConfig {
    pub docker_bin: String,
    pub image: String,
    /// Passed as `--platform`; the simulator library is built for amd64.
    pub platform: Option<String>,
    /// Host directory mounted into the container.
    pub host_root: PathBuf,
    pub container_root: PathBuf,
    pub include_dir: PathBuf,
    pub support_library: PathBuf,
    pub compiler: String,
    pub compiler_flags: Vec<String>,
    pub build_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            docker_bin: "docker".into(),
            image: "champsim-runner".into(),
            platform: Some("linux/amd64".into()),
            host_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            container_root: PathBuf::from("/app"),
            include_dir: PathBuf::from("ChampSim_CRC2/inc"),
            support_library: PathBuf::from("ChampSim_CRC2/lib/config1.a"),
            compiler: "g++".into(),
            compiler_flags: vec!["-Wall".into(), "--std=c++11".into()],
            build_timeout: Duration::from_secs(600),
        }
    }
}

enum Execution {
    Finished(CapturedOutput),
    SpawnFailed(std::io::Error),
    TimedOut,
}

pub struct DockerSandbox {
    config: DockerConfig,
    mapper: PathMapper,
}

impl DockerSandbox {
    pub fn new(config: DockerConfig) -> Self {
        let mapper = PathMapper::new(config.host_root.clone(), config.container_root.clone());
        Self { config, mapper }
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    pub fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// Confirm the docker CLI is reachable and return its version line.
    pub async fn check_available(&self) -> Result<String, RunError> {
        let executable = self.config.docker_bin.clone();
        let output = Command::new(&self.config.docker_bin)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|error| RunError::Spawn {
                executable: executable.clone(),
                error,
            })?;

        let captured = CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            elapsed: Duration::default(),
        };
        if !captured.success() {
            return Err(RunError::Failed {
                executable,
                failure: captured.into_failure(),
            });
        }
        Ok(captured.stdout.trim().to_string())
    }

    /// Compiler invocation as seen from inside the container.
    pub fn compile_command(&self, source: &Path, output: &Path) -> Vec<String> {
        let mut command = vec![self.config.compiler.clone()];
        command.extend(self.config.compiler_flags.iter().cloned());
        command.push("-I".into());
        command.push(self.mapper.to_container_string(&self.config.include_dir));
        command.push(self.mapper.to_container_string(source));
        command.push(self.mapper.to_container_string(&self.config.support_library));
        command.push("-o".into());
        command.push(self.mapper.to_container_string(output));
        command
    }

    pub fn run_command(&self, executable: &Path, args: &[Arg]) -> Vec<String> {
        let mut command = vec![self.mapper.to_container_string(executable)];
        command.extend(args.iter().map(|arg| match arg {
            Arg::Literal(value) => value.clone(),
            Arg::Path(path) => self.mapper.to_container_string(path),
        }));
        command
    }

    /// Full `docker` argument vector for running `command` in a fresh container.
    pub fn docker_invocation(&self, container_name: &str, command: &[String]) -> Vec<String> {
        let container_root = self.mapper.container_root().to_string_lossy().into_owned();
        let mut argv = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
        ];
        if let Some(platform) = &self.config.platform {
            argv.push("--platform".into());
            argv.push(platform.clone());
        }
        argv.push("-v".into());
        argv.push(format!(
            "{}:{}",
            self.mapper.host_root().display(),
            container_root
        ));
        argv.push("-w".into());
        argv.push(container_root);
        argv.push(self.config.image.clone());
        argv.push("bash".into());
        argv.push("-c".into());
        argv.push(
            command
                .iter()
                .map(|part| shell_quote(part))
                .collect::<Vec<_>>()
                .join(" "),
        );
        argv
    }

    async fn execute(&self, command: &[String], timeout: Duration) -> Execution {
        let container = format!("policyforge-{}", Uuid::new_v4().simple());
        let argv = self.docker_invocation(&container, command);
        debug!(container = %container, command = %command.join(" "), "starting sandbox process");

        let started = Instant::now();
        let child = Command::new(&self.config.docker_bin)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(error) => return Execution::SpawnFailed(error),
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Execution::Finished(CapturedOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                elapsed: started.elapsed(),
            }),
            Ok(Err(error)) => Execution::SpawnFailed(error),
            Err(_) => {
                // The docker client is gone with the dropped future; the container is not.
                self.kill_container(&container).await;
                Execution::TimedOut
            }
        }
    }

    async fn kill_container(&self, container: &str) {
        let result = Command::new(&self.config.docker_bin)
            .args(["kill", container])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(error) = result {
            warn!(container, error = %error, "failed to kill timed-out container");
        }
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn name(&self) -> &str {
        "docker"
    }

    async fn build(&self, source: &Path, output: &Path) -> Result<(), BuildError> {
        let source_path = source.display().to_string();
        let command = self.compile_command(source, output);
        info!(
            source = %source_path,
            output = %output.display(),
            image = %self.config.image,
            "compiling candidate in sandbox"
        );

        match self.execute(&command, self.config.build_timeout).await {
            Execution::Finished(captured) if captured.success() => Ok(()),
            Execution::Finished(captured) => Err(BuildError::Failed {
                source_path,
                failure: captured.into_failure(),
            }),
            Execution::SpawnFailed(error) => Err(BuildError::Spawn { source_path, error }),
            Execution::TimedOut => Err(BuildError::TimedOut {
                source_path,
                timeout: self.config.build_timeout,
            }),
        }
    }

    async fn run(
        &self,
        executable: &Path,
        args: &[Arg],
        timeout: Duration,
    ) -> Result<CapturedOutput, RunError> {
        let name = executable.display().to_string();
        let command = self.run_command(executable, args);

        match self.execute(&command, timeout).await {
            Execution::Finished(captured) if captured.success() => {
                info!(
                    executable = %name,
                    elapsed_s = captured.elapsed.as_secs_f64(),
                    "sandbox run finished"
                );
                Ok(captured)
            }
            Execution::Finished(captured) => Err(RunError::Failed {
                executable: name,
                failure: captured.into_failure(),
            }),
            Execution::SpawnFailed(error) => Err(RunError::Spawn {
                executable: name,
                error,
            }),
            Execution::TimedOut => Err(RunError::TimedOut {
                executable: name,
                timeout,
            }),
        }
    }
}

/// Quote one word for `bash -c`.
fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=+,@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
