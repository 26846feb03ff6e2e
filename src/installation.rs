//! Installation files: the persisted layout of devices and regions

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::animation::AnimationSpec;
use crate::device::Device;
use crate::error::{EngineError, EngineResult};
use crate::geometry::Placement;

/// One region as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub id: String,
    #[serde(flatten)]
    pub placement: Placement,
    pub animation: AnimationSpec,
}

/// A complete wall: base canvas, controllers, and the regions painted on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub name: String,
    pub base_width: f64,
    pub base_height: f64,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

impl Installation {
    pub fn new(name: impl Into<String>, base_width: f64, base_height: f64) -> Self {
        Self {
            name: name.into(),
            base_width,
            base_height,
            devices: Vec::new(),
            regions: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    pub fn with_region(
        mut self,
        id: impl Into<String>,
        placement: Placement,
        animation: AnimationSpec,
    ) -> Self {
        self.regions.push(RegionConfig {
            id: id.into(),
            placement,
            animation,
        });
        self
    }

    /// Save installation to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| EngineError::io(path, e))
    }

    /// Load installation from a JSON file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl Default for Installation {
    fn default() -> Self {
        Self::new("untitled", 1000.0, 1000.0)
    }
}
