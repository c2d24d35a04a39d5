//! Frame assembly: drives the compositor line by line, runs the blanking hooks, and places the
//! native raster inside the output surface

use crate::ppu::{self, Ppu};
use raster_common::frontend::{Color, FrameSize};
use raster_config::RasterConfig;

/// Output surface and the position of the native raster within it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub surface: FrameSize,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Viewport {
    #[must_use]
    pub fn from_config(config: &RasterConfig) -> Self {
        let (width, height) = config.output_size();
        let (offset_x, offset_y) = config.native_offset();
        Self { surface: FrameSize { width, height }, offset_x, offset_y }
    }

    /// Whether a surface pixel lies inside the native raster
    #[must_use]
    pub fn contains_native(&self, x: u32, y: u32) -> bool {
        (self.offset_x..self.offset_x + ppu::SCREEN_WIDTH).contains(&x)
            && (self.offset_y..self.offset_y + ppu::SCREEN_HEIGHT).contains(&y)
    }
}

/// Finished frame in raw 15-bit BGR with the opaque bit set, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub size: FrameSize,
    pub pixels: Box<[u16]>,
}

impl FrameBuffer {
    #[must_use]
    pub fn new(size: FrameSize) -> Self {
        Self { size, pixels: vec![0; size.len()].into_boxed_slice() }
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.size.width {
            return None;
        }
        self.pixels.get((y * self.size.width + x) as usize).copied()
    }

    /// Convert to RGBA8 into `out`, replacing its contents.
    pub fn write_rgba(&self, out: &mut Vec<Color>) {
        out.clear();
        out.extend(self.pixels.iter().map(|&pixel| ppu::gba_color_to_rgb8(pixel)));
    }

    #[must_use]
    pub fn to_rgba(&self) -> Vec<Color> {
        let mut out = Vec::with_capacity(self.pixels.len());
        self.write_rgba(&mut out);
        out
    }
}

/// Callbacks invoked at fixed points of frame assembly. All default to no-ops.
pub trait FrameHooks {
    /// Decorate the area outside the native raster. Called at frame start when the output surface
    /// is larger than the native raster and borders are enabled.
    fn draw_border(&mut self, _frame: &mut FrameBuffer, _viewport: Viewport) {}

    /// Called after each line is rendered. Register changes take effect on the next line.
    fn on_scanline(&mut self, _ppu: &mut Ppu, _line: u32) {}

    /// Called with the H-blank flag raised, if enabled in DISPSTAT and in the config.
    fn on_hblank(&mut self, _ppu: &mut Ppu, _line: u32) {}

    /// Called once after the last line with the V-blank flag raised, if enabled in DISPSTAT and
    /// in the config.
    fn on_vblank(&mut self, _ppu: &mut Ppu) {}
}

impl FrameHooks for () {}

#[derive(Debug, Clone)]
pub struct FrameAssembler {
    config: RasterConfig,
    viewport: Viewport,
    frame: FrameBuffer,
    line_buffer: Box<[u16]>,
}

impl FrameAssembler {
    #[must_use]
    pub fn new(config: &RasterConfig) -> Self {
        let viewport = Viewport::from_config(config);
        Self {
            config: *config,
            viewport,
            frame: FrameBuffer::new(viewport.surface),
            line_buffer: vec![0; ppu::SCREEN_WIDTH as usize].into_boxed_slice(),
        }
    }

    pub fn reload_config(&mut self, config: &RasterConfig) {
        self.config = *config;
        self.viewport = Viewport::from_config(config);
        if self.frame.size != self.viewport.surface {
            log::info!(
                "Output surface resized to {}x{}",
                self.viewport.surface.width,
                self.viewport.surface.height
            );
            self.frame = FrameBuffer::new(self.viewport.surface);
        }
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Render every line of the native raster into the output surface and run the frame hooks.
    pub fn render_frame(&mut self, ppu: &mut Ppu, hooks: &mut impl FrameHooks) -> &FrameBuffer {
        ppu.begin_frame();

        if self.config.border_active() {
            hooks.draw_border(&mut self.frame, self.viewport);
        }

        let surface_width = self.viewport.surface.width as usize;
        let offset_x = self.viewport.offset_x as usize;

        for line in 0..ppu::SCREEN_HEIGHT {
            ppu.render_line(line, &mut self.line_buffer);
            ppu.end_line();

            ppu.run_scanline_effect();
            hooks.on_scanline(ppu, line);

            ppu.set_hblank(true);
            if self.config.run_hblank && ppu.hblank_hook_enabled() {
                hooks.on_hblank(ppu, line);
            }
            ppu.set_hblank(false);

            let row_start = (self.viewport.offset_y + line) as usize * surface_width + offset_x;
            self.frame.pixels[row_start..row_start + self.line_buffer.len()]
                .copy_from_slice(&self.line_buffer);
        }

        ppu.enter_vblank();
        if self.config.run_vblank && ppu.vblank_hook_enabled() {
            hooks.on_vblank(ppu);
        }

        log::trace!("Frame complete");

        &self.frame
    }
}
