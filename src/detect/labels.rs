use std::path::Path;

use crate::error::{PipelineError, Result};

/// Newline-delimited label list, indices aligned with the model's `classes` output.
///
/// Labels are trimmed and lower-cased at load so that comparison against the
/// (equally normalised) search target is a plain string equality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
    offset: usize,
}

impl LabelMap {
    /// Build from lines. `offset` is added to every class index before lookup.
    pub fn from_lines<I, S>(lines: I, offset: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels: Vec<String> = lines
            .into_iter()
            .map(|line| normalize_label(line.as_ref()))
            .collect();
        if labels.iter().all(|label| label.is_empty()) {
            return Err(PipelineError::model_load("label list is empty"));
        }
        Ok(Self { labels, offset })
    }

    pub fn load<P: AsRef<Path>>(path: P, offset: usize) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::model_load(format!("failed to read labels {}: {}", path.display(), e))
        })?;
        let map = Self::from_lines(raw.lines(), offset)?;
        log::info!("loaded {} labels from {}", map.len(), path.display());
        Ok(map)
    }

    /// Resolve a decoded class index.
    pub fn resolve(&self, class: f32) -> Result<&str> {
        let out_of_range = |index: usize| PipelineError::LabelIndexOutOfRange {
            index,
            len: self.labels.len(),
        };
        if !class.is_finite() || class < 0.0 {
            return Err(out_of_range(usize::MAX));
        }
        let index = (class as usize).saturating_add(self.offset);
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| out_of_range(index))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Trim and lower-case a label or search term.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn offset_skips_placeholder_line() -> Result<()> {
        let labels = LabelMap::from_lines(["???", "Person", " Cup "], 1)?;
        assert_eq!(labels.resolve(0.0)?, "person");
        assert_eq!(labels.resolve(1.0)?, "cup");
        Ok(())
    }

    #[test]
    fn out_of_range_classes_are_reported() -> Result<()> {
        let labels = LabelMap::from_lines(["???", "person"], 1)?;
        assert!(matches!(
            labels.resolve(1.0),
            Err(PipelineError::LabelIndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(labels.resolve(-1.0).is_err());
        assert!(labels.resolve(f32::NAN).is_err());
        Ok(())
    }

    #[test]
    fn missing_or_empty_files_fail_to_load() -> Result<()> {
        let err = LabelMap::load("/nonexistent/labels.txt", 1).expect_err("missing file");
        assert!(err.is_fatal());

        let file = tempfile::NamedTempFile::new().map_err(|e| PipelineError::model_load(e.to_string()))?;
        let err = LabelMap::load(file.path(), 1).expect_err("empty file");
        assert!(matches!(err, PipelineError::ModelLoad(_)));
        Ok(())
    }

    #[test]
    fn loads_from_disk() -> Result<()> {
        let mut file =
            tempfile::NamedTempFile::new().map_err(|e| PipelineError::model_load(e.to_string()))?;
        writeln!(file, "???\nperson\nbicycle").map_err(|e| PipelineError::model_load(e.to_string()))?;
        let labels = LabelMap::load(file.path(), 1)?;
        assert_eq!(labels.len(), 3);
        assert!(labels.contains("bicycle"));
        Ok(())
    }
}
