use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Command,
};

use thiserror_no_std::Error;

use crate::{BatchSession, Config};

#[derive(Error, Debug, PartialEq, Clone)]
pub enum CollectError {
    #[error("MissingDependency: {0}")]
    MissingDependency(String),

    #[error("InvalidArguments: {0}")]
    InvalidArguments(String),

    #[error("EmptyExtraction: No command line arguments in \"{0}\"")]
    EmptyExtraction(String),

    #[error("IoError: {0}")]
    Io(String),

    #[error("JsonError: {0}")]
    Json(String),
}

impl From<std::io::Error> for CollectError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for CollectError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value.to_string())
    }
}

impl std::error::Error for CollectError {}

pub type CollectResult<T> = core::result::Result<T, CollectError>;

/// Produces the JSON description of a shortcut file.
pub trait CommandLineSource {
    fn describe(&self, sample: &Path) -> CollectResult<String>;
}

/// External LNK parser invoked once per sample, `lnkparse -j <file>` by
/// default.
#[derive(Debug, Clone)]
pub struct LnkParseTool {
    program: String,
    args: Vec<String>,
}

impl LnkParseTool {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.lnk_parser, config.lnk_parser_args.clone())
    }

    /// Fails with `MissingDependency` when the program cannot be started.
    pub fn ensure_available(&self) -> CollectResult<()> {
        match Command::new(&self.program).arg("-h").output() {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(CollectError::MissingDependency(
                format!("\"{}\" is not installed or not in PATH", self.program),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

impl CommandLineSource for LnkParseTool {
    fn describe(&self, sample: &Path) -> CollectResult<String> {
        log::trace!("{} {:?} {}", self.program, self.args, sample.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(sample)
            .output()?;
        if !output.status.success() {
            return Err(CollectError::Io(format!(
                "{} failed on \"{}\": {}",
                self.program,
                sample.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `data.command_line_arguments` of an LNK parser report, `None` when it is
/// missing or blank.
pub fn extract_command_line(json: &str) -> CollectResult<Option<String>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    Ok(value
        .pointer("/data/command_line_arguments")
        .and_then(serde_json::Value::as_str)
        .filter(|arguments| !arguments.trim().is_empty())
        .map(str::to_string))
}

/// Reads a text file, honouring UTF-16 and UTF-8 byte order marks. Anything
/// else is decoded as lossy UTF-8.
pub fn read_text<P: AsRef<Path>>(path: P) -> CollectResult<String> {
    Ok(decode_text(&fs::read(path)?))
}

pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| from_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub warnings: Vec<CollectError>,
}

/// Runs every sample of a directory through the LNK parser and the batch
/// deobfuscator, writing `original/<file>.txt` and `deobfuscated/<file>.txt`
/// under the output directory.
pub struct Collector<S: CommandLineSource> {
    source: S,
    session: BatchSession,
    output_dir: PathBuf,
}

impl<S: CommandLineSource> Collector<S> {
    pub fn new<P: Into<PathBuf>>(source: S, output_dir: P) -> Self {
        Self {
            source,
            session: BatchSession::new(),
            output_dir: output_dir.into(),
        }
    }

    pub fn with_session(mut self, session: BatchSession) -> Self {
        self.session = session;
        self
    }

    pub fn original_dir(&self) -> PathBuf {
        self.output_dir.join("original")
    }

    pub fn deobfuscated_dir(&self) -> PathBuf {
        self.output_dir.join("deobfuscated")
    }

    /// Samples that cannot be extracted are skipped with a warning; only a
    /// missing input directory or an unwritable output tree is fatal.
    pub fn collect(&self, input_dir: &Path) -> CollectResult<CollectReport> {
        if !input_dir.is_dir() {
            return Err(CollectError::InvalidArguments(format!(
                "\"{}\" is not a directory",
                input_dir.display()
            )));
        }
        fs::create_dir_all(self.original_dir())?;
        fs::create_dir_all(self.deobfuscated_dir())?;

        let mut samples = fs::read_dir(input_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect::<Vec<PathBuf>>();
        samples.sort();

        let mut report = CollectReport::default();
        for sample in samples {
            match self.collect_sample(&sample) {
                Ok(target) => report.written.push(target),
                Err(err) => {
                    log::warn!("Skipping \"{}\": {}", sample.display(), err);
                    report.warnings.push(err);
                    report.skipped.push(sample);
                }
            }
        }
        Ok(report)
    }

    fn collect_sample(&self, sample: &Path) -> CollectResult<PathBuf> {
        let file_name = sample
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CollectError::InvalidArguments(sample.display().to_string()))?;

        let json = self.source.describe(sample)?;
        let Some(arguments) = extract_command_line(&json)? else {
            return Err(CollectError::EmptyExtraction(file_name));
        };

        let report_name = format!("{}.txt", file_name);
        fs::write(self.original_dir().join(&report_name), &arguments)?;

        let result = self.session.deobfuscate(&arguments);
        for err in result.errors() {
            log::debug!("{}: {}", file_name, err);
        }
        let target = self.deobfuscated_dir().join(&report_name);
        fs::write(&target, format!("{}\n", result.output()))?;
        log::info!("{} -> {}", sample.display(), target.display());
        Ok(target)
    }
}
