use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::error::SourceUnavailable;

/// Supplies shader source text by path.
pub trait ShaderSourceProvider {
    fn load_source(&self, path: &str) -> Result<String, SourceUnavailable>;
}

/// Reads sources from files under a root directory.
#[derive(Debug, Clone)]
pub struct FileShaderSource {
    root: PathBuf,
}

impl FileShaderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShaderSourceProvider for FileShaderSource {
    fn load_source(&self, path: &str) -> Result<String, SourceUnavailable> {
        let full = self.root.join(path);
        std::fs::read_to_string(&full).map_err(|e| SourceUnavailable {
            path: full,
            source: Some(e),
        })
    }
}

/// Sources compiled into the binary, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedShaderSource {
    entries: HashMap<String, &'static str>,
}

impl EmbeddedShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, source: &'static str) -> Self {
        self.entries.insert(path.into(), source);
        self
    }
}

impl ShaderSourceProvider for EmbeddedShaderSource {
    fn load_source(&self, path: &str) -> Result<String, SourceUnavailable> {
        self.entries
            .get(path)
            .map(|s| (*s).to_owned())
            .ok_or_else(|| SourceUnavailable {
                path: PathBuf::from(path),
                source: None,
            })
    }
}

/// Loads `path`, degrading to an empty source when it cannot be read.
///
/// The empty source then fails to compile, which leaves the program invalid
/// instead of aborting construction.
pub fn load_or_empty(provider: &dyn ShaderSourceProvider, path: &str) -> String {
    match provider.load_source(path) {
        Ok(source) => source,
        Err(err) => {
            log::error!("{err}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_lookup() {
        let provider = EmbeddedShaderSource::new().with("a.wgsl", "// a");
        assert_eq!(provider.load_source("a.wgsl").unwrap(), "// a");
        assert!(provider.load_source("b.wgsl").is_err());
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let provider = FileShaderSource::new("/nonexistent-shader-root");
        let err = provider.load_source("x.wgsl").unwrap_err();
        assert!(err.source.is_some());
        assert_eq!(load_or_empty(&provider, "x.wgsl"), "");
    }
}
