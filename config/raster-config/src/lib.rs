//! Output-surface and hook configuration for the scanline compositor

#[cfg(feature = "serde")]
mod file;

#[cfg(feature = "serde")]
pub use file::ConfigError;

use bincode::{Decode, Encode};
use std::cmp;

pub const NATIVE_WIDTH: u32 = 240;
pub const NATIVE_HEIGHT: u32 = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum RenderMode {
    /// Output surface is exactly the native raster
    #[default]
    Native,
    /// Native raster centered inside a larger output surface
    Letterboxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LayerToggles {
    pub bg: [bool; 4],
    pub obj: bool,
}

impl LayerToggles {
    pub const ALL: Self = Self { bg: [true; 4], obj: true };
}

impl Default for LayerToggles {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RasterConfig {
    pub output_width: u32,
    pub output_height: u32,
    pub render_mode: RenderMode,
    pub border: bool,
    pub run_hblank: bool,
    pub run_vblank: bool,
    pub layers: LayerToggles,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            output_width: NATIVE_WIDTH,
            output_height: NATIVE_HEIGHT,
            render_mode: RenderMode::default(),
            border: false,
            run_hblank: true,
            run_vblank: true,
            layers: LayerToggles::default(),
        }
    }
}

impl RasterConfig {
    /// Output surface dimensions, never smaller than the native raster. In native render mode the
    /// surface is always exactly native-sized.
    #[must_use]
    pub fn output_size(&self) -> (u32, u32) {
        match self.render_mode {
            RenderMode::Native => (NATIVE_WIDTH, NATIVE_HEIGHT),
            RenderMode::Letterboxed => (
                cmp::max(NATIVE_WIDTH, self.output_width),
                cmp::max(NATIVE_HEIGHT, self.output_height),
            ),
        }
    }

    /// Offset of the native raster's top-left corner within the output surface
    #[must_use]
    pub fn native_offset(&self) -> (u32, u32) {
        let (width, height) = self.output_size();
        ((width - NATIVE_WIDTH) / 2, (height - NATIVE_HEIGHT) / 2)
    }

    #[must_use]
    pub fn border_active(&self) -> bool {
        self.border && self.output_size() != (NATIVE_WIDTH, NATIVE_HEIGHT)
    }
}
