use pipeline_core::PipelineError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Process-lifetime cache of parsed artifact files, keyed by path and
/// invalidated by file mtime: a rewritten artifact is reloaded on the next
/// read, an untouched one is never parsed twice.
pub struct FileCache<T> {
    loader: fn(&Path) -> Result<T, PipelineError>,
    entries: HashMap<PathBuf, (SystemTime, Arc<T>)>,
}

impl<T> FileCache<T> {
    pub fn new(loader: fn(&Path) -> Result<T, PipelineError>) -> Self {
        Self {
            loader,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, path: &Path) -> Result<Arc<T>, PipelineError> {
        let mtime = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| PipelineError::CacheError(format!("{}: {}", path.display(), e)))?;

        if let Some((cached_mtime, value)) = self.entries.get(path) {
            if *cached_mtime == mtime {
                return Ok(Arc::clone(value));
            }
            tracing::debug!("artifact changed on disk, reloading {}", path.display());
        }

        let value = Arc::new((self.loader)(path)?);
        self.entries
            .insert(path.to_path_buf(), (mtime, Arc::clone(&value)));
        Ok(value)
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
