use std::{
    ffi::OsString,
    fs::File,
    io::{BufReader, ErrorKind},
    path::{Path, PathBuf},
    process::Command,
};

use serde_json::Value;
use tracing::instrument;

use crate::{Error, Result};

/// Source of raw OCR output for an image.
///
/// `Ok(None)` means the engine found nothing; it is not an error. Any closure
/// of the right signature is an engine as well, which is handy in tests.
pub trait OcrEngine {
    fn extract(&self, image_path: &Path) -> Result<Option<Value>>;
}

impl<F> OcrEngine for F
where
    F: Fn(&Path) -> Result<Option<Value>>,
{
    fn extract(&self, image_path: &Path) -> Result<Option<Value>> {
        self(image_path)
    }
}

/// With `first_page` set, treats `raw` as a per-page list the way PaddleOCR's
/// `ocr()` wraps its output and keeps page 0. Without it the output is used
/// as-is.
fn select_page(raw: Value, first_page: bool) -> Option<Value> {
    match raw {
        Value::Null => None,
        Value::Array(pages) if first_page => {
            if pages.len() > 1 {
                log::debug!("Dropping {} pages after the first", pages.len() - 1);
            }
            match pages.into_iter().next() {
                None | Some(Value::Null) => None,
                page => page,
            }
        }
        raw => Some(raw),
    }
}

/// Runs an external OCR program per image and reads its JSON from stdout.
///
/// The image path is passed as the last argument. Empty output means no
/// detections.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<OsString>,
    first_page: bool,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            first_page: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Treat the output as a list of pages and keep the first one.
    pub fn first_page(mut self, first_page: bool) -> Self {
        self.first_page = first_page;
        self
    }

    fn failure(
        &self,
        image_path: &Path,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Error {
        Error::Engine {
            path: image_path.to_path_buf(),
            message: format!("{}: {message}", self.program.display()),
            source,
        }
    }
}

impl OcrEngine for CommandEngine {
    #[instrument(level = "debug", skip(self))]
    fn extract(&self, image_path: &Path) -> Result<Option<Value>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image_path)
            .output()
            .map_err(|err| self.failure(image_path, "failed to start".into(), Some(err.into())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(
                image_path,
                format!("exited with {}: {}", output.status, stderr.trim()),
                None,
            ));
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            log::debug!("Engine printed nothing for {}", image_path.display());
            return Ok(None);
        }
        let raw = serde_json::from_slice(&output.stdout).map_err(|err| {
            self.failure(image_path, "printed invalid JSON".into(), Some(err.into()))
        })?;
        Ok(select_page(raw, self.first_page))
    }
}

/// Reads raw engine output captured earlier, stored as `<dir>/<image stem>.json`.
///
/// A missing dump means the engine found nothing for that image.
#[derive(Debug, Clone)]
pub struct RawDumpEngine {
    dir: PathBuf,
    first_page: bool,
}

impl RawDumpEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            first_page: false,
        }
    }

    /// Treat each dump as a list of pages and keep the first one.
    pub fn first_page(mut self, first_page: bool) -> Self {
        self.first_page = first_page;
        self
    }

    pub fn dump_path(&self, image_path: &Path) -> PathBuf {
        let mut name = image_path.file_stem().unwrap_or_default().to_os_string();
        name.push(".json");
        self.dir.join(name)
    }
}

impl OcrEngine for RawDumpEngine {
    #[instrument(level = "debug", skip(self))]
    fn extract(&self, image_path: &Path) -> Result<Option<Value>> {
        let path = self.dump_path(image_path);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("No raw dump at {}", path.display());
                return Ok(None);
            }
            Err(err) => return Err(Error::io(path, err)),
        };
        let raw = serde_json::from_reader(BufReader::new(file)).map_err(|err| Error::json(&path, err))?;
        Ok(select_page(raw, self.first_page))
    }
}
