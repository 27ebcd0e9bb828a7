use crate::cascade::find_source;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use resound_container::{AudioFormat, codec};
use resound_store::Access;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::instrument;

/// Decides whether conversion may write to a path while a sandbox is active.
///
/// Installed by the repository when a sandbox tier is configured; the engine
/// refuses to write anywhere the guard doesn't recognise as isolated.
pub type SandboxGuard = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Limit on how much converter stderr is carried into an error.
const STDERR_LIMIT: usize = 500;

/// Handle to the external audio converter.
///
/// The converter is a black box: it is invoked with a source path, a target
/// path, and the target format's parameters, and either produces bytes at
/// the target or reports failure. Nothing here inspects sample data.
#[derive(Clone)]
pub struct Converter {
    program: PathBuf,
    sandbox: Option<SandboxGuard>,
}

impl Converter {
    /// Discover a converter executable on `PATH`.
    ///
    /// # Errors
    /// [`ErrorKind::ConverterNotFound`] when none of the known executables
    /// are installed.
    pub fn discover() -> Result<Self> {
        let executables = ["ffmpeg", "avconv"];
        for exe in executables {
            if let Ok(path) = which::which(exe) {
                tracing::debug!(program = %path.display(), "Audio converter discovered");
                return Ok(Self::at(path));
            }
        }
        tracing::info!("No audio converter found in PATH");
        exn::bail!(ErrorKind::ConverterNotFound);
    }

    /// Use an explicitly configured converter binary.
    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), sandbox: None }
    }

    /// Install the sandbox write guard. While installed, every conversion
    /// target must be recognised by the guard (and requested with write
    /// access) before the converter runs.
    pub fn with_sandbox_guard(mut self, guard: SandboxGuard) -> Self {
        self.sandbox = Some(guard);
        self
    }

    /// Transcode `source` into `target` with `format`'s parameters.
    ///
    /// The engine refuses to silently rename: `target`'s extension must be
    /// the format's canonical extension. With a sandbox guard installed, the
    /// target is checked for isolation before any filesystem write.
    #[instrument(skip(self), fields(program = %self.program.display()))]
    pub fn convert(&self, source: &Path, target: &Path, format: AudioFormat, access: Access) -> Result<()> {
        let expected = format.extension();
        let matches = target.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case(expected));
        if !matches {
            exn::bail!(ErrorKind::WrongExtension { expected, path: target.to_path_buf() });
        }
        if let Some(guard) = &self.sandbox
            && (access != Access::Write || !guard(target))
        {
            exn::bail!(ErrorKind::NotSandboxed(target.to_path_buf()));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(ErrorKind::Io)?;
        }

        let params = format.params();
        let output = Command::new(&self.program)
            .arg("-i")
            .arg(source)
            .arg("-ar")
            .arg(params.sample_rate.to_string())
            .arg("-ab")
            .arg(params.bit_rate.to_string())
            .arg("-ac")
            .arg(params.channels.to_string())
            .arg("-y")
            .arg(target)
            .output()
            .map_err(ErrorKind::Io)?;
        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.len() > STDERR_LIMIT {
                let mut end = STDERR_LIMIT;
                while !stderr.is_char_boundary(end) {
                    end -= 1;
                }
                stderr.truncate(end);
            }
            exn::bail!(ErrorKind::ConversionFailed { code: output.status.code().unwrap_or(-1), stderr });
        }
        let produced = std::fs::metadata(target).map(|m| m.len()).unwrap_or(0);
        if produced == 0 {
            exn::bail!(ErrorKind::EmptyOutput(target.to_path_buf()));
        }
        tracing::debug!(bytes = produced, "Conversion complete");
        Ok(())
    }

    /// Run the source cascade for `id` and transcode the winner into
    /// `target`.
    ///
    /// Container sources are stripped of their metadata trailer into a
    /// temporary file first, so the converter only ever sees audio bytes.
    /// Returns which format and path served as the source.
    pub fn find_source_and_convert(
        &self,
        id: &str,
        target_format: AudioFormat,
        target: &Path,
        access: Access,
        lookup: impl FnMut(AudioFormat) -> Option<PathBuf>,
    ) -> Result<(AudioFormat, PathBuf)> {
        let (source_format, source) = find_source(id, target_format, lookup)?;
        if source_format == AudioFormat::Container {
            let stripped = tempfile::Builder::new()
                .suffix(".a18")
                .tempfile()
                .map_err(ErrorKind::Io)?;
            codec::strip_and_copy(&source, stripped.path()).or_raise(|| ErrorKind::Container)?;
            self.convert(stripped.path(), target, target_format, access)?;
        } else {
            self.convert(&source, target, target_format, access)?;
        }
        Ok((source_format, source))
    }
}
