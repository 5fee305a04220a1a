use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::normalize_label;
use crate::frame::{LensFacing, PixelFormat};
use crate::ingest::SourceConfig;
use crate::mapper::{ViewSize, DEFAULT_MARGIN};
use crate::pipeline::{AcceptancePolicy, DisplayGeometry, PipelineSettings, ACCURACY_THRESHOLD};
use crate::preprocess::{InputSize, Normalization};

const DEFAULT_MODEL_PATH: &str = "coco_ssd_mobilenet_v1_1.0_quant.onnx";
const DEFAULT_LABELS_PATH: &str = "coco_ssd_mobilenet_v1_1.0_labels.txt";
const DEFAULT_LABEL_OFFSET: usize = 1;
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_DISPLAY_WIDTH: f32 = 480.0;
const DEFAULT_DISPLAY_HEIGHT: f32 = 640.0;

#[derive(Debug, Deserialize, Default)]
struct SeekConfigFile {
    target_label: Option<String>,
    accuracy_threshold: Option<f32>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    model_input: Option<ModelInputFile>,
    label_offset: Option<usize>,
    normalization: Option<Normalization>,
    lens_facing: Option<LensFacing>,
    display: Option<DisplayConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelInputFile {
    height: Option<u32>,
    width: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    margin: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    rotation_degrees: Option<i32>,
    fps: Option<u32>,
    format: Option<PixelFormat>,
}

/// Settings for one search session.
#[derive(Debug, Clone)]
pub struct SeekConfig {
    /// Trimmed and lower-cased.
    pub target_label: String,
    pub accuracy_threshold: f32,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    /// Input size declared to backends that load the model from disk.
    pub model_input: InputSize,
    pub label_offset: usize,
    pub normalization: Normalization,
    pub lens_facing: LensFacing,
    pub display: DisplayGeometry,
    pub source: SourceConfig,
}

impl SeekConfig {
    /// Defaults for everything except the target.
    pub fn for_target(label: &str) -> Self {
        Self {
            target_label: normalize_label(label),
            accuracy_threshold: ACCURACY_THRESHOLD,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: PathBuf::from(DEFAULT_LABELS_PATH),
            model_input: InputSize::new(DEFAULT_MODEL_INPUT, DEFAULT_MODEL_INPUT),
            label_offset: DEFAULT_LABEL_OFFSET,
            normalization: Normalization::IDENTITY,
            lens_facing: LensFacing::default(),
            display: DisplayGeometry {
                view: ViewSize::new(DEFAULT_DISPLAY_WIDTH, DEFAULT_DISPLAY_HEIGHT),
                margin: DEFAULT_MARGIN,
            },
            source: SourceConfig::default(),
        }
    }

    /// File named by `SEEK_CONFIG` (if set), then `SEEK_*` overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SEEK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SeekConfigFile) -> Self {
        let mut cfg = Self::for_target(file.target_label.as_deref().unwrap_or_default());
        if let Some(threshold) = file.accuracy_threshold {
            cfg.accuracy_threshold = threshold;
        }
        if let Some(path) = file.model_path {
            cfg.model_path = path;
        }
        if let Some(path) = file.labels_path {
            cfg.labels_path = path;
        }
        if let Some(input) = file.model_input {
            cfg.model_input = InputSize::new(
                input.height.unwrap_or(cfg.model_input.height),
                input.width.unwrap_or(cfg.model_input.width),
            );
        }
        if let Some(offset) = file.label_offset {
            cfg.label_offset = offset;
        }
        if let Some(normalization) = file.normalization {
            cfg.normalization = normalization;
        }
        if let Some(lens_facing) = file.lens_facing {
            cfg.lens_facing = lens_facing;
        }
        if let Some(display) = file.display {
            cfg.display.view.width = display.width.unwrap_or(cfg.display.view.width);
            cfg.display.view.height = display.height.unwrap_or(cfg.display.view.height);
            cfg.display.margin = display.margin.unwrap_or(cfg.display.margin);
        }
        if let Some(source) = file.source {
            let defaults = SourceConfig::default();
            cfg.source = SourceConfig {
                url: source.url.unwrap_or(defaults.url),
                width: source.width.unwrap_or(defaults.width),
                height: source.height.unwrap_or(defaults.height),
                rotation_degrees: source.rotation_degrees.unwrap_or(defaults.rotation_degrees),
                fps: source.fps.unwrap_or(defaults.fps),
                format: source.format.unwrap_or(defaults.format),
            };
        }
        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(label) = std::env::var("SEEK_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.target_label = normalize_label(&label);
            }
        }
        if let Ok(path) = std::env::var("SEEK_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("SEEK_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.labels_path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var("SEEK_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(threshold) = std::env::var("SEEK_ACCURACY_THRESHOLD") {
            self.accuracy_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("SEEK_ACCURACY_THRESHOLD must be a number"))?;
        }
        if let Ok(facing) = std::env::var("SEEK_LENS_FACING") {
            self.lens_facing = match facing.trim().to_lowercase().as_str() {
                "front" => LensFacing::Front,
                "back" => LensFacing::Back,
                other => return Err(anyhow!("SEEK_LENS_FACING must be front or back, got '{}'", other)),
            };
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.target_label = normalize_label(&self.target_label);
        if self.target_label.is_empty() {
            return Err(anyhow!("target_label must be set (config file or SEEK_TARGET_LABEL)"));
        }
        if !(0.0..=1.0).contains(&self.accuracy_threshold) {
            return Err(anyhow!(
                "accuracy_threshold must be within [0, 1], got {}",
                self.accuracy_threshold
            ));
        }
        let view = self.display.view;
        if !(view.width > 0.0 && view.height > 0.0) {
            return Err(anyhow!("display size must be positive"));
        }
        if !(0.0..1.0).contains(&self.display.margin) {
            return Err(anyhow!("display margin must be within [0, 1)"));
        }
        if self.model_input.height == 0 || self.model_input.width == 0 {
            return Err(anyhow!("model_input dimensions must be non-zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        if self.source.fps == 0 {
            return Err(anyhow!("source fps must be greater than zero"));
        }
        crate::preprocess::quarter_turns(self.source.rotation_degrees)?;
        if !self.normalization.scale.is_finite() || self.normalization.scale == 0.0 {
            return Err(anyhow!("normalization scale must be finite and non-zero"));
        }
        Ok(())
    }

    /// Controller settings derived from this config.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            policy: AcceptancePolicy::new(&self.target_label, self.accuracy_threshold),
            lens_facing: self.lens_facing,
            normalization: self.normalization,
            display: self.display,
        }
    }
}

fn read_config_file(path: &Path) -> Result<SeekConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
