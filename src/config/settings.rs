use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::ConfigError;
use crate::models::{Channel, Dataset, Stage};
use crate::pipeline::Tool;
use crate::utils::fuzzy::closest_match;

/// Whole-batch configuration.
/// Loaded and validated once before the first dataset starts; read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub paths: PathSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub channels: ChannelSwitches,
    #[serde(default)]
    pub stages: StageSwitches,
    #[serde(default)]
    pub cleanup: CleanupSettings,
    #[serde(default)]
    pub segmentation: SegmentationSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathSettings {
    pub data_root: PathBuf,
    pub source_root: PathBuf,
    pub params_root: PathBuf,
    pub results_root: PathBuf,
    #[serde(default = "default_params_suffix")]
    pub params_suffix: String,
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
}

fn default_params_suffix() -> String {
    "_PARAMS".to_string()
}

fn default_image_extension() -> String {
    "nrrd".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolSettings {
    pub bin_dir: PathBuf,
    /// Executable name overrides keyed by tool key
    pub executables: BTreeMap<String, String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("bin"),
            executables: BTreeMap::new(),
        }
    }
}

impl ToolSettings {
    pub fn executable(&self, tool: Tool) -> PathBuf {
        let name = self
            .executables
            .get(tool.key())
            .map(String::as_str)
            .unwrap_or_else(|| tool.key());
        self.bin_dir.join(name)
    }
}

/// Global channel switches; a disabled channel is inactive in every dataset
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSwitches {
    pub cy5: bool,
    pub tritc: bool,
    pub gfp: bool,
    pub dapi: bool,
}

impl Default for ChannelSwitches {
    fn default() -> Self {
        Self { cy5: true, tritc: true, gfp: true, dapi: true }
    }
}

impl ChannelSwitches {
    pub fn enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Cy5 => self.cy5,
            Channel::Tritc => self.tritc,
            Channel::Gfp => self.gfp,
            Channel::Dapi => self.dapi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageToggle {
    pub run: bool,
    pub debug: bool,
}

impl Default for StageToggle {
    fn default() -> Self {
        Self { run: true, debug: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageSwitches {
    pub copy: StageToggle,
    pub background: StageToggle,
    pub curvelet: StageToggle,
    pub rescale: StageToggle,
    pub rescale_bit: StageToggle,
    pub segmentation: StageToggle,
    pub tracing: StageToggle,
}

impl StageSwitches {
    pub fn get(&self, stage: Stage) -> StageToggle {
        match stage {
            Stage::Copy => self.copy,
            Stage::BackgroundSubtraction => self.background,
            Stage::Curvelet => self.curvelet,
            Stage::RescaleFloat => self.rescale,
            Stage::Rescale8Bit => self.rescale_bit,
            Stage::Segmentation => self.segmentation,
            Stage::Tracing => self.tracing,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupSettings {
    pub segmentation_temp: bool,
    pub tracing_temp: bool,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self { segmentation_temp: true, tracing_temp: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Tile {
    fn is_positive(&self) -> bool {
        self.x > 0 && self.y > 0 && self.z > 0
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationSettings {
    pub tile: Tile,
    pub border: Tile,
    pub threads: u32,
    pub small_image: bool,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            tile: Tile { x: 900, y: 900, z: 450 },
            border: Tile { x: 200, y: 200, z: 100 },
            threads: 80,
            small_image: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingSettings {
    pub tile: Tile,
    pub threads: u32,
    pub small_image: bool,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            tile: Tile { x: 600, y: 600, z: 300 },
            threads: 80,
            small_image: true,
        }
    }
}

/// Work-list entry as written by the operator
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetEntry {
    pub id: String,
    /// Requested channels; all four when absent
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
    /// Raw image folder, defaults to `<source_root>/<id>`
    #[serde(default)]
    pub source: Option<PathBuf>,
}

impl PipelineConfig {
    /// Work list in configuration order
    pub fn work_list(&self) -> Vec<Dataset> {
        self.datasets.iter().map(|entry| self.dataset(entry)).collect()
    }

    fn dataset(&self, entry: &DatasetEntry) -> Dataset {
        let paths = &self.paths;
        Dataset {
            id: entry.id.clone(),
            local_root: paths.data_root.join(&entry.id),
            source_root: entry
                .source
                .clone()
                .unwrap_or_else(|| paths.source_root.join(&entry.id)),
            params_source: paths
                .params_root
                .join(format!("{}{}", entry.id, paths.params_suffix)),
            results_dest: paths.results_root.join(&entry.id),
            requested: entry
                .channels
                .clone()
                .unwrap_or_else(|| Channel::ALL.to_vec()),
        }
    }

    /// Make every relative path absolute against `base`
    pub fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.paths.data_root);
        resolve(&mut self.paths.source_root);
        resolve(&mut self.paths.params_root);
        resolve(&mut self.paths.results_root);
        resolve(&mut self.tools.bin_dir);
        for entry in &mut self.datasets {
            if let Some(source) = entry.source.as_mut() {
                resolve(source);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datasets.is_empty() {
            return Err(ConfigError::EmptyWorkList);
        }

        let mut seen = HashSet::new();
        for entry in &self.datasets {
            validate_dataset_id(&entry.id)?;
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateDataset(entry.id.clone()));
            }
            if let Some(channels) = &entry.channels {
                let mut unique = HashSet::new();
                if !channels.iter().all(|c| unique.insert(*c)) {
                    return Err(ConfigError::InvalidDataset {
                        id: entry.id.clone(),
                        reason: "channel listed more than once".to_string(),
                    });
                }
            }
        }

        let ext = &self.paths.image_extension;
        if ext.is_empty() || ext.starts_with('.') {
            return Err(ConfigError::InvalidValue {
                field: "paths.image_extension",
                reason: format!("'{}' must be a bare extension such as 'nrrd'", ext),
            });
        }

        let segm = &self.segmentation;
        if !segm.tile.is_positive() {
            return Err(ConfigError::InvalidValue {
                field: "segmentation.tile",
                reason: "tile dimensions must be greater than 0".to_string(),
            });
        }
        if segm.border.x >= segm.tile.x || segm.border.y >= segm.tile.y || segm.border.z >= segm.tile.z {
            return Err(ConfigError::InvalidValue {
                field: "segmentation.border",
                reason: "border must be smaller than the tile on every axis".to_string(),
            });
        }
        if segm.threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "segmentation.threads",
                reason: "thread count must be greater than 0".to_string(),
            });
        }
        if !self.tracing.tile.is_positive() {
            return Err(ConfigError::InvalidValue {
                field: "tracing.tile",
                reason: "tile dimensions must be greater than 0".to_string(),
            });
        }
        if self.tracing.threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tracing.threads",
                reason: "thread count must be greater than 0".to_string(),
            });
        }

        let known: Vec<&str> = Tool::ALL.iter().map(|t| t.key()).collect();
        for name in self.tools.executables.keys() {
            if !known.contains(&name.as_str()) {
                return Err(ConfigError::UnknownTool {
                    name: name.clone(),
                    suggestion: closest_match(name, &known, 3).map(str::to_string),
                });
            }
        }

        Ok(())
    }
}

/// Dataset ids become folder names: letters, digits, dots, underscores, hyphens
fn validate_dataset_id(id: &str) -> Result<(), ConfigError> {
    let reason = if id.trim().is_empty() {
        Some("dataset id cannot be empty")
    } else if !id.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_' || c == '-') {
        Some("dataset ids can only contain letters, numbers, dots, underscores, and hyphens")
    } else if id == "." || id == ".." {
        Some("dataset id cannot be a relative folder reference")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidDataset {
            id: id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
