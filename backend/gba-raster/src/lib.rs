//! Scanline raster compositor for a 240x160 tile/sprite display with four background planes,
//! 128 sprites, two rectangular windows plus an object window, and alpha/brightness blending

pub mod affine;
pub mod bg;
pub mod frame;
pub mod handoff;
pub mod ppu;
pub mod state;
pub mod transfer;

pub use bg::BgManager;
pub use frame::{FrameAssembler, FrameBuffer, FrameHooks, Viewport};
pub use ppu::{EffectWidth, Ppu, ScanlineEffect};
pub use raster_config::RasterConfig;
