//! Model identity and format detection

use std::path::{Path, PathBuf};

use super::delegate::Delegate;
use super::error::{InferenceError, InferenceResult};

/// Supported model containers, detected by file extension only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    TfLite,
    Onnx,
}

impl ModelFormat {
    /// Detect the format from the path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> InferenceResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("tflite") => Ok(ModelFormat::TfLite),
            Some("onnx") => Ok(ModelFormat::Onnx),
            _ => Err(InferenceError::UnknownFormat(path.to_path_buf())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ModelFormat::TfLite => "tflite",
            ModelFormat::Onnx => "onnx",
        }
    }
}

/// A conversion model: path, format, and the delegate it runs on
/// (`None` until benchmarked)
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    path: PathBuf,
    format: ModelFormat,
    delegate: Option<Delegate>,
}

impl Model {
    pub fn new(path: impl Into<PathBuf>) -> InferenceResult<Self> {
        let path = path.into();
        let format = ModelFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            delegate: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ModelFormat {
        self.format
    }

    pub fn delegate(&self) -> Option<Delegate> {
        self.delegate
    }

    pub(crate) fn set_delegate(&mut self, delegate: Delegate) {
        self.delegate = Some(delegate);
    }

    /// File name for log lines
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ModelFormat::from_path(Path::new("/models/voice.tflite")).unwrap(),
            ModelFormat::TfLite
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("voice.ONNX")).unwrap(),
            ModelFormat::Onnx
        );
    }

    #[test]
    fn test_unknown_formats_rejected() {
        for path in ["voice.wav", "voice", "voice.tflite.bak", ".onnx"] {
            assert!(
                matches!(
                    ModelFormat::from_path(Path::new(path)),
                    Err(InferenceError::UnknownFormat(_))
                ),
                "{} should be rejected",
                path
            );
        }
    }

    #[test]
    fn test_new_model_has_no_delegate() {
        let model = Model::new("a/b/voice.onnx").unwrap();
        assert_eq!(model.delegate(), None);
        assert_eq!(model.name(), "voice.onnx");
        assert_eq!(model.format().extension(), "onnx");
    }
}
