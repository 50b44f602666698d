//! crunch encoder integration
//!
//! Block compression is done by the bundled `crunch` binary. This module
//! builds its command line, runs it, and turns a failed run into a
//! [`ConvertError::Compression`].
//!
//! # Command line
//!
//! ```text
//! crunch -file in.png -out out.crn -fileformat crn -DXT5 -quality 128 \
//!        -mipMode None -noprogress [-rescale 64 64]
//! ```
//!
//! - `-DXT5`: fixed block format (BC3, with alpha)
//! - `-quality`: 0-255, derived from the 0-1 quality setting
//! - `-mipMode None`: no mipmaps
//! - `-noprogress`: keeps stdout small
//! - `-rescale w h`: only in scale resize mode
//!
//! The binaries are bundled at `ex/crunch.exe` (Windows), `ex/crunch_osx`
//! (macOS) and `ex/crunch_lin` (Linux) relative to the executable.

use crate::error::ConvertError;
use crate::paths;
use crate::request::OutputFormat;

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Cap on encoder stdout + stderr. Output is read through the cap while the
/// encoder runs, and going over fails the image.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1000;

/// Directory holding the bundled encoder binaries
const BUNDLE_DIR: &str = "ex";

/// Map a 0-1 quality to the encoder's 0-255 scale
pub fn quality_byte(quality: f64) -> u8 {
    (quality * 255.0).round().clamp(0.0, 255.0) as u8
}

/// One encoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionJob {
    /// PNG the encoder reads (the source or a temp copy)
    pub input: PathBuf,
    /// Where the compressed texture is written
    pub output: PathBuf,
    /// Encoder quality, 0-255
    pub quality: u8,
    /// Output container
    pub format: OutputFormat,
    /// Rescale target for scale resize mode
    pub rescale: Option<(u32, u32)>,
}

impl CompressionJob {
    /// Encoder arguments, in the order the encoder documents them
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-file".into(),
            self.input.clone().into(),
            "-out".into(),
            self.output.clone().into(),
            "-fileformat".into(),
            self.format.name().into(),
            "-DXT5".into(),
            "-quality".into(),
            self.quality.to_string().into(),
            "-mipMode".into(),
            "None".into(),
            "-noprogress".into(),
        ];

        if let Some((width, height)) = self.rescale {
            args.push("-rescale".into());
            args.push(width.to_string().into());
            args.push(height.to_string().into());
        }

        args
    }
}

/// Anything that can turn a [`CompressionJob`] into a texture on disk
pub trait Compressor {
    fn compress(&self, job: &CompressionJob) -> Result<(), ConvertError>;
}

/// Host platform, as far as picking an encoder binary goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    /// Anything else. Uses the Linux binary.
    Other,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        }
    }

    /// Encoder binary name for this platform
    pub fn binary_name(&self) -> &'static str {
        match self {
            Platform::Windows => "crunch.exe",
            Platform::MacOs => "crunch_osx",
            Platform::Linux | Platform::Other => "crunch_lin",
        }
    }
}

/// Runs the crunch binary as a blocking subprocess
#[derive(Debug, Clone)]
pub struct CrunchEncoder {
    binary: PathBuf,
}

impl CrunchEncoder {
    /// Use a specific encoder binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Find the bundled encoder for the host OS.
    ///
    /// Looks in the following locations:
    /// 1. `ex/<binary>` relative to the executable
    /// 2. `<binary>` next to the executable
    /// 3. `ex/<binary>` relative to the current directory
    ///
    /// If none exist, the first location is used anyway and the spawn error
    /// surfaces per image.
    pub fn locate() -> Self {
        let platform = Platform::current();
        if platform == Platform::Other {
            warn!(
                "Unknown OS '{}' - trying linux crunch executable",
                std::env::consts::OS
            );
        }
        let name = platform.binary_name();

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));

        let mut candidates = Vec::new();
        if let Some(dir) = &exe_dir {
            candidates.push(dir.join(BUNDLE_DIR).join(name));
            candidates.push(dir.join(name));
        }
        candidates.push(PathBuf::from(BUNDLE_DIR).join(name));

        let binary = candidates
            .iter()
            .find(|p| p.exists())
            .or_else(|| candidates.first())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(BUNDLE_DIR).join(name));

        debug!("Using encoder {}", binary.display());
        Self { binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Compressor for CrunchEncoder {
    fn compress(&self, job: &CompressionJob) -> Result<(), ConvertError> {
        info!(
            "crunching {} to {} with quality of {}",
            paths::display_relative(&job.input),
            paths::display_relative(&job.output),
            job.quality
        );

        let args = job.args();
        debug!("{} {:?}", self.binary.display(), args);

        let compression_error = |message: String| ConvertError::Compression {
            path: job.input.clone(),
            message,
        };

        // Working directory and environment are inherited
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| compression_error(format!("Failed to run {}: {}", self.binary.display(), e)))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let (stdout, stderr) = std::thread::scope(|s| {
            let stderr_reader = s.spawn(move || read_capped(stderr_pipe));
            let stdout = read_capped(stdout_pipe);
            let stderr = stderr_reader
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stderr reader panicked")));
            (stdout, stderr)
        });

        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(compression_error(format!("Failed to read encoder output: {}", e)));
            }
        };

        let captured = stdout.len() + stderr.len();
        if captured > MAX_OUTPUT_BYTES {
            // Pipes are already closed; make sure the encoder doesn't linger
            let _ = child.kill();
            let _ = child.wait();
            return Err(compression_error(format!(
                "encoder output exceeded {} bytes",
                MAX_OUTPUT_BYTES
            )));
        }

        let status = child
            .wait()
            .map_err(|e| compression_error(format!("Failed to wait for encoder: {}", e)))?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let stdout = String::from_utf8_lossy(&stdout);
            let diagnostic = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(compression_error(format!(
                "encoder exited with {}: {}",
                status, diagnostic
            )));
        }

        Ok(())
    }
}

/// Read a child pipe, keeping at most one byte past the output cap. The pipe
/// is closed on return, so an encoder still writing gets a broken pipe.
fn read_capped<R: Read>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.take(MAX_OUTPUT_BYTES as u64 + 1).read_to_end(&mut buf)?;
    }
    Ok(buf)
}
