//! Device tunables. Everything has a default so a partial JSON document, or
//! none at all, is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::PvrError;

/// What happens to host writes into VRAM while a render owns it
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VramWritePolicy {
    /// Queue the write and apply it when the render completes
    #[default]
    Defer,
    /// Refuse the write with `PvrError::VramBusy`
    Reject,
}

/// What happens to a render start while the previous render is in flight
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyRenderPolicy {
    #[default]
    Ignore,
    /// Remember one start and run it at completion
    Queue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvrConfig {
    /// Cycles from render start to the completion interrupts, before per-tile cost
    pub render_base_cycles: u64,
    pub render_cycles_per_tile: u64,
    /// Cycles per 32 byte block of a PVR DMA
    pub dma_cycles_per_block: u64,
    pub vram_write_policy: VramWritePolicy,
    pub busy_render_policy: BusyRenderPolicy,
    /// Region array entries walked per render before giving up on a missing last flag
    pub max_regions: u32,
}

impl Default for PvrConfig {
    fn default() -> Self {
        Self {
            render_base_cycles: 20_000,
            render_cycles_per_tile: 2_000,
            dma_cycles_per_block: 16,
            vram_write_policy: VramWritePolicy::Defer,
            busy_render_policy: BusyRenderPolicy::Ignore,
            max_regions: 8192,
        }
    }
}

impl PvrConfig {
    pub fn from_json(text: &str) -> Result<Self, PvrError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, PvrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Cycles until the completion interrupts of a render that touched `tiles`
    pub fn render_cycles(&self, tiles: u32) -> u64 {
        self.render_base_cycles + self.render_cycles_per_tile * tiles as u64
    }
}
