use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::CompileError;

#[derive(Debug, Clone)]
pub enum EncodeMode {
    /// Cable modem binary signed with the shared secret
    Encode { keyfile: PathBuf },
    /// Packet-cable MTA file
    Produce,
}

#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: EncodeMode,
}

impl EncodeJob {
    pub fn args(&self) -> Vec<String> {
        let input = self.input.to_string_lossy().to_string();
        let output = self.output.to_string_lossy().to_string();
        match &self.mode {
            EncodeMode::Encode { keyfile } => vec![
                "-e".to_string(),
                input,
                keyfile.to_string_lossy().to_string(),
                output,
            ],
            EncodeMode::Produce => vec!["-p".to_string(), input, output],
        }
    }
}

/// Runs the encoder on a prepared input file.
///
/// Returns the diagnostic text the encoder printed. Whether the job
/// succeeded is judged by the caller from the output file.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob) -> Result<String, CompileError>;
}

/// The `docsis` command line tool
#[derive(Debug, Clone)]
pub struct DocsisEncoder {
    binary: String,
    timeout: Duration,
}

impl DocsisEncoder {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn pretty_cmd(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }
}

#[async_trait]
impl Encoder for DocsisEncoder {
    async fn encode(&self, job: &EncodeJob) -> Result<String, CompileError> {
        let args = job.args();
        tracing::info!("Running {}", self.pretty_cmd(&args));

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!("Failed to run '{}': {}", self.pretty_cmd(&args), e);
                return Err(CompileError::Compilation(format!(
                    "Failed to run encoder '{}': {}",
                    self.binary, e
                )));
            }
            Err(_) => {
                tracing::warn!(
                    "'{}' timed out after {}s",
                    self.pretty_cmd(&args),
                    self.timeout.as_secs()
                );
                return Err(CompileError::Compilation(format!(
                    "Encoder timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).to_string();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(diagnostics)
    }
}
