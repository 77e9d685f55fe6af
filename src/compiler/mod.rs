//! Validation and compilation of configfile text with the external DOCSIS encoder.
//!
//! Template markers (`{...}`) are replaced by type-appropriate dummy values,
//! the text is wrapped into a `Main { ... }` block and handed to the encoder.
//! Success is decided solely by the encoder leaving a non-empty output file.

mod encoder;

pub use encoder::{DocsisEncoder, EncodeJob, EncodeMode, Encoder};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::DeviceClass;

/// Scratch input written for every validation call
pub const SCRATCH_INPUT: &str = "dummy-validator.conf";
/// Scratch output the encoder is asked to produce
pub const SCRATCH_OUTPUT: &str = "dummy-validator.cfg";

/// Lines injected in front of the user text by [`wrap_main`]
const WRAPPER_LINES: i64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Configfile has no device class")]
    MissingDeviceClass,
    #[error("Error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Compilation(String),
}

impl CompileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Compiles configfile text for a device class
#[derive(Clone)]
pub struct ParameterCompiler {
    prov_dir: PathBuf,
    keyfile: PathBuf,
    encoder: Arc<dyn Encoder>,
}

impl ParameterCompiler {
    pub fn new(prov_dir: impl Into<PathBuf>, keyfile: impl Into<PathBuf>, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            prov_dir: prov_dir.into(),
            keyfile: keyfile.into(),
            encoder,
        }
    }

    /// Directory holding compiled files of a device class
    pub fn device_dir(&self, device: DeviceClass) -> PathBuf {
        self.prov_dir.join(device.as_str())
    }

    /// Check that `text` compiles for `device` using the scratch file pair.
    /// Empty text and customer-managed devices are always valid.
    pub async fn validate(&self, device: Option<DeviceClass>, text: &str) -> Result<(), CompileError> {
        let device = device.ok_or(CompileError::MissingDeviceClass)?;
        if device == DeviceClass::Tr069 || text.trim().is_empty() {
            return Ok(());
        }

        let dir = self.device_dir(device);
        self.run(device, text, &dir.join(SCRATCH_INPUT), &dir.join(SCRATCH_OUTPUT))
            .await
            .map(|_| ())
    }

    /// Compile `text` into `<prov_dir>/<device>/<name>.cfg`, returning the file path and size
    pub async fn build(
        &self,
        device: Option<DeviceClass>,
        name: &str,
        text: &str,
    ) -> Result<(PathBuf, u64), CompileError> {
        let device = device.ok_or(CompileError::MissingDeviceClass)?;
        let dir = self.device_dir(device);
        let output = dir.join(format!("{}.cfg", name));

        if device == DeviceClass::Tr069 {
            // customer-managed devices fetch the text as-is
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| CompileError::io(&dir, e))?;
            tokio::fs::write(&output, text)
                .await
                .map_err(|e| CompileError::io(&output, e))?;
            return Ok((output, text.len() as u64));
        }

        let input = dir.join(format!("{}.conf", name));
        let size = self.run(device, text, &input, &output).await?;
        Ok((output, size))
    }

    async fn run(&self, device: DeviceClass, text: &str, input: &Path, output: &Path) -> Result<u64, CompileError> {
        if let Some(dir) = input.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| CompileError::io(dir, e))?;
        }

        let content = wrap_main(&substitute_placeholders(text));
        tokio::fs::write(input, content)
            .await
            .map_err(|e| CompileError::io(input, e))?;

        // a stale artifact from the previous call must not count as success
        match tokio::fs::remove_file(output).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CompileError::io(output, e)),
        }

        let mode = match device {
            DeviceClass::Cm => EncodeMode::Encode {
                keyfile: self.keyfile.clone(),
            },
            _ => EncodeMode::Produce,
        };
        let job = EncodeJob {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            mode,
        };

        let diagnostics = self.encoder.encode(&job).await?;

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(meta.len()),
            _ => {
                let report = diagnostics
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(correct_line_number)
                    .unwrap_or_else(|| "Encoder produced no output".to_string());
                tracing::debug!("Encoder rejected {}: {}", input.display(), report);
                Err(CompileError::Compilation(report))
            }
        }
    }
}

/// Replace every `{marker}` with a dummy value the encoder accepts.
///
/// Lines annotated `string` get `text`, lines annotated `ipaddress` get
/// `1.1.1.1`, anything else gets `1`.
pub fn substitute_placeholders(text: &str) -> String {
    let Some(marker) = regex_lite::Regex::new(r"\{[^{}]*\}").ok() else {
        return text.to_string();
    };

    text.lines()
        .map(|line| {
            let lower = line.to_lowercase();
            let dummy = if lower.contains("string") {
                "text"
            } else if lower.contains("ipaddress") {
                "1.1.1.1"
            } else {
                "1"
            };
            marker.replace_all(line, dummy).into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text into the encoder's top-level block.
/// The user's first line ends up on line 4 of the written file.
pub fn wrap_main(text: &str) -> String {
    format!("Main\n{{\n\t\n{}\n}}", text)
}

/// Shift a trailing line number in an encoder diagnostic back to the user's numbering
pub fn correct_line_number(report: &str) -> String {
    let digits = report
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .count();
    if digits == 0 {
        return report.to_string();
    }

    let (head, tail) = report.split_at(report.len() - digits);
    match tail.parse::<i64>() {
        Ok(line) => format!("{}{}", head, line - WRAPPER_LINES),
        Err(_) => report.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Encoder double: writes the output file when `accept` is set
    pub(crate) struct FakeEncoder {
        pub accept: bool,
        pub diagnostics: String,
        pub calls: AtomicUsize,
        pub jobs: Mutex<Vec<EncodeJob>>,
    }

    impl FakeEncoder {
        pub(crate) fn accepting() -> Arc<Self> {
            Arc::new(Self {
                accept: true,
                diagnostics: String::new(),
                calls: AtomicUsize::new(0),
                jobs: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn rejecting(diagnostics: &str) -> Arc<Self> {
            Arc::new(Self {
                accept: false,
                diagnostics: diagnostics.to_string(),
                calls: AtomicUsize::new(0),
                jobs: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Encoder for FakeEncoder {
        async fn encode(&self, job: &EncodeJob) -> Result<String, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut jobs) = self.jobs.lock() {
                jobs.push(job.clone());
            }
            if self.accept {
                tokio::fs::write(&job.output, b"\x03\x01\x01")
                    .await
                    .map_err(|e| CompileError::io(&job.output, e))?;
            }
            Ok(self.diagnostics.clone())
        }
    }

    #[test]
    fn test_substitute_placeholders() {
        let text = "SnmpMibObject sysName.0 String \"{hostname}\";\n\
                    SnmpMibObject ipAddr.0 IPAddress {ip};\n\
                    MaxCPE {max_cpe};\n\
                    NetworkAccess 1;";
        assert_eq!(
            substitute_placeholders(text),
            "SnmpMibObject sysName.0 String \"text\";\n\
             SnmpMibObject ipAddr.0 IPAddress 1.1.1.1;\n\
             MaxCPE 1;\n\
             NetworkAccess 1;"
        );
    }

    #[test]
    fn test_substitute_each_marker_separately() {
        assert_eq!(substitute_placeholders("Foo {a} {b};"), "Foo 1 1;");
    }

    #[test]
    fn test_wrap_main_offsets_three_lines() {
        let wrapped = wrap_main("A 1;");
        assert_eq!(wrapped.lines().nth(3), Some("A 1;"));
        assert_eq!(wrapped, "Main\n{\n\t\nA 1;\n}");
    }

    #[test]
    fn test_correct_line_number() {
        assert_eq!(correct_line_number("syntax error at line 12"), "syntax error at line 9");
        assert_eq!(correct_line_number("unknown error"), "unknown error");
        assert_eq!(correct_line_number("line 3"), "line 0");
    }

    #[tokio::test]
    async fn test_missing_device_class_skips_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::accepting();
        let compiler = ParameterCompiler::new(dir.path(), dir.path().join("keyfile"), encoder.clone());

        let err = compiler.validate(None, "NetworkAccess 1;").await.unwrap_err();
        assert!(matches!(err, CompileError::MissingDeviceClass));
        assert_eq!(encoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_tr069_is_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::rejecting("never called");
        let compiler = ParameterCompiler::new(dir.path(), dir.path().join("keyfile"), encoder.clone());

        compiler.validate(Some(DeviceClass::Tr069), "InternetGatewayDevice.x,1").await.unwrap();
        assert_eq!(encoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_validate_writes_scratch_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::accepting();
        let compiler = ParameterCompiler::new(dir.path(), dir.path().join("keyfile"), encoder.clone());

        compiler.validate(Some(DeviceClass::Cm), "MaxCPE {n};").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("cm").join(SCRATCH_INPUT)).unwrap();
        assert_eq!(written, "Main\n{\n\t\nMaxCPE 1;\n}");
        let jobs = encoder.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(matches!(jobs[0].mode, EncodeMode::Encode { .. }));
        assert_eq!(jobs[0].output, dir.path().join("cm").join(SCRATCH_OUTPUT));
    }

    #[tokio::test]
    async fn test_mta_uses_produce_mode() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::accepting();
        let compiler = ParameterCompiler::new(dir.path(), dir.path().join("keyfile"), encoder.clone());

        compiler.validate(Some(DeviceClass::Mta), "MtaConfigDelimiter 1;").await.unwrap();
        let jobs = encoder.jobs.lock().unwrap();
        assert!(matches!(jobs[0].mode, EncodeMode::Produce));
    }

    #[tokio::test]
    async fn test_rejection_reports_corrected_line() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::rejecting("/tftpboot/cm/dummy-validator.conf: syntax error at line 12\nmore");
        let compiler = ParameterCompiler::new(dir.path(), dir.path().join("keyfile"), encoder);

        let err = compiler.validate(Some(DeviceClass::Cm), "Bogus;").await.unwrap_err();
        match err {
            CompileError::Compilation(msg) => {
                assert_eq!(msg, "/tftpboot/cm/dummy-validator.conf: syntax error at line 9")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_output_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let cm_dir = dir.path().join("cm");
        std::fs::create_dir_all(&cm_dir).unwrap();
        std::fs::write(cm_dir.join(SCRATCH_OUTPUT), b"old").unwrap();

        let compiler = ParameterCompiler::new(dir.path(), dir.path().join("keyfile"), FakeEncoder::rejecting(""));
        let err = compiler.validate(Some(DeviceClass::Cm), "Bogus;").await.unwrap_err();
        assert!(matches!(err, CompileError::Compilation(_)));
    }

    #[tokio::test]
    async fn test_unwritable_scratch_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("prov");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let encoder = FakeEncoder::accepting();
        let compiler = ParameterCompiler::new(&blocker, dir.path().join("keyfile"), encoder.clone());
        let err = compiler.validate(Some(DeviceClass::Cm), "MaxCPE 1;").await.unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
        assert_eq!(encoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_build_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = ParameterCompiler::new(dir.path(), dir.path().join("keyfile"), FakeEncoder::accepting());

        let (path, size) = compiler.build(Some(DeviceClass::Cm), "basic", "MaxCPE 1;").await.unwrap();
        assert_eq!(path, dir.path().join("cm").join("basic.cfg"));
        assert_eq!(size, 3);
    }
}
