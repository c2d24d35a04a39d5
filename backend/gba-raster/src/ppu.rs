//! Scanline compositor: VRAM, palette RAM, OAM, display registers, and per-line rendering

mod background;
mod colors;
mod compositor;
pub mod registers;
mod sprites;

pub use colors::gba_color_to_rgb8;
pub use sprites::{SpriteDescriptor, SpriteMode, SpriteShape, SpriteSize};

use crate::affine;
use crate::ppu::registers::{
    AffineOverflowBehavior, BgAffineParameters, BitsPerPixel, DISPCNT, DISPSTAT, Registers,
    ScreenSize,
};
use bincode::{Decode, Encode};
use raster_common::boxedarray::{BoxedByteArray, BoxedWordArray};
use raster_common::frontend::FrameSize;
use raster_common::num::U16Ext;
use raster_config::{LayerToggles, RasterConfig};
use std::{array, iter};

const VRAM_LEN: usize = 96 * 1024;
const VRAM_ADDR_MASK: usize = (128 * 1024) - 1;

/// BG tile and map data occupy the first 64KB of VRAM
pub const BG_VRAM_LEN: u32 = 0x10000;
pub const OBJ_VRAM_START: u32 = 0x10000;
pub const OBJ_VRAM_END: u32 = 0x18000;

const PALETTE_RAM_LEN_HALFWORDS: usize = 1024 / 2;
pub const OBJ_PALETTE_START: usize = 0x100;

const OAM_LEN_HALFWORDS: usize = 1024 / 2;
pub const NUM_SPRITES: usize = 128;
pub const NUM_SPRITE_MATRICES: usize = 32;

pub const SCREEN_HEIGHT: u32 = 160;
pub const SCREEN_WIDTH: u32 = 240;
pub const FRAME_SIZE: FrameSize = FrameSize { width: SCREEN_WIDTH, height: SCREEN_HEIGHT };

const LINE_LEN: usize = SCREEN_WIDTH as usize;

// Forced blanking displays a white screen
const FORCED_BLANK_COLOR: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct BgAffineLatch {
    pub(crate) x: [i32; 2],
    pub(crate) y: [i32; 2],
}

impl BgAffineLatch {
    // Called once per frame before the first line
    fn latch_reference_points(&mut self, registers: &Registers) {
        self.x = registers.bg_affine_parameters.map(|params| params.reference_x);
        self.y = registers.bg_affine_parameters.map(|params| params.reference_y);
    }

    // Called once per line after rendering
    fn increment_reference_latches(&mut self, registers: &Registers) {
        for (i, (x, y)) in iter::zip(&mut self.x, &mut self.y).enumerate() {
            *x += registers.bg_affine_parameters[i].b;
            *y += registers.bg_affine_parameters[i].d;
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
struct State {
    scanline: u32,
    hblank: bool,
    vblank: bool,
    bg_affine_latch: BgAffineLatch,
}

impl State {
    fn new() -> Self {
        Self { scanline: 0, hblank: false, vblank: false, bg_affine_latch: BgAffineLatch::default() }
    }
}

/// 15-bit BGR color with bit 15 as the opaque flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
struct Pixel(u16);

impl Pixel {
    const TRANSPARENT: Self = Self(0);

    fn opaque(self) -> bool {
        self.0 & 0x8000 != 0
    }

    fn red(self) -> u16 {
        self.0 & 0x1F
    }

    fn green(self) -> u16 {
        (self.0 >> 5) & 0x1F
    }

    fn blue(self) -> u16 {
        (self.0 >> 10) & 0x1F
    }

    fn new_opaque(color: u16) -> Self {
        Self(color | 0x8000)
    }

    fn new_opaque_rgb(r: u16, g: u16, b: u16) -> Self {
        Self(0x8000 | r | (g << 5) | (b << 10))
    }
}

/// Render-side flags that do not live in any hardware register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
struct BgDisplayFlags {
    hidden: bool,
    gba_compat: bool,
    map_dimensions: Option<(u32, u32)>,
}

impl Default for BgDisplayFlags {
    fn default() -> Self {
        Self { hidden: false, gba_compat: true, map_dimensions: None }
    }
}

/// Read-only view of everything the line renderer uses for one BG
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBgState {
    pub char_base_addr: u32,
    pub map_base_addr: u32,
    pub priority: u8,
    pub affine: bool,
    pub affine_parameters: BgAffineParameters,
    pub gba_compat: bool,
    pub mosaic: bool,
    pub hidden: bool,
    pub screen_size: ScreenSize,
    pub map_width: u32,
    pub map_height: u32,
    pub affine_overflow: AffineOverflowBehavior,
    pub bpp: BitsPerPixel,
    pub h_scroll: u16,
    pub v_scroll: u16,
}

/// Register write deferred until the next VBlank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
struct PendingWrite {
    offset: u32,
    value: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum EffectWidth {
    Halfword,
    Word,
}

/// Table of per-line register values, written after each rendered line
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ScanlineEffect {
    pub register: u32,
    pub width: EffectWidth,
    pub values: Vec<u32>,
    pub position: usize,
}

impl ScanlineEffect {
    #[must_use]
    pub fn new(register: u32, width: EffectWidth, values: Vec<u32>) -> Self {
        Self { register, width, values, position: 0 }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
struct ScanlineWorkingSet {
    bg_pixels: [[Pixel; LINE_LEN]; 4],
    obj_pixels: [[Pixel; LINE_LEN]; 4],
    window_mask: [u8; LINE_LEN],
    // Priority -> BGs with that priority, in BG number order
    sorted_bgs: [[u8; 4]; 4],
    sorted_bg_counts: [u8; 4],
}

impl ScanlineWorkingSet {
    fn new() -> Self {
        Self {
            bg_pixels: array::from_fn(|_| [Pixel::TRANSPARENT; LINE_LEN]),
            obj_pixels: array::from_fn(|_| [Pixel::TRANSPARENT; LINE_LEN]),
            window_mask: [0; LINE_LEN],
            sorted_bgs: [[0; 4]; 4],
            sorted_bg_counts: [0; 4],
        }
    }

    fn clear(&mut self) {
        for line in &mut self.bg_pixels {
            line.fill(Pixel::TRANSPARENT);
        }
        for line in &mut self.obj_pixels {
            line.fill(Pixel::TRANSPARENT);
        }
        self.window_mask.fill(0);
        self.sorted_bg_counts = [0; 4];
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Ppu {
    vram: BoxedByteArray<VRAM_LEN>,
    palette_ram: BoxedWordArray<PALETTE_RAM_LEN_HALFWORDS>,
    oam: BoxedWordArray<OAM_LEN_HALFWORDS>,
    registers: Registers,
    state: State,
    bg_flags: [BgDisplayFlags; 4],
    pending_writes: Vec<PendingWrite>,
    scanline_effect: Option<ScanlineEffect>,
    buffers: Box<ScanlineWorkingSet>,
    layers: LayerToggles,
}

impl Ppu {
    #[must_use]
    pub fn new(config: &RasterConfig) -> Self {
        Self {
            vram: BoxedByteArray::new(),
            palette_ram: BoxedWordArray::new(),
            oam: BoxedWordArray::new(),
            registers: Registers::new(),
            state: State::new(),
            bg_flags: [BgDisplayFlags::default(); 4],
            pending_writes: Vec::new(),
            scanline_effect: None,
            buffers: Box::new(ScanlineWorkingSet::new()),
            layers: config.layers,
        }
    }

    pub fn reload_config(&mut self, config: &RasterConfig) {
        self.layers = config.layers;
    }

    #[must_use]
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    #[must_use]
    pub fn scanline(&self) -> u32 {
        self.state.scanline
    }

    #[must_use]
    pub fn in_hblank(&self) -> bool {
        self.state.hblank
    }

    #[must_use]
    pub fn in_vblank(&self) -> bool {
        self.state.vblank
    }

    #[must_use]
    pub fn hblank_hook_enabled(&self) -> bool {
        self.registers.hblank_irq_enabled
    }

    #[must_use]
    pub fn vblank_hook_enabled(&self) -> bool {
        self.registers.vblank_irq_enabled
    }

    /// Reset per-frame state: line counter, blank flags, affine latches, scanline effect position.
    pub fn begin_frame(&mut self) {
        self.state.scanline = 0;
        self.state.hblank = false;
        self.state.vblank = false;
        self.state.bg_affine_latch.latch_reference_points(&self.registers);

        if let Some(effect) = &mut self.scanline_effect {
            effect.position = 0;
        }

        log::trace!("Frame start");
    }

    /// Render one line of the native display into `pixels`.
    ///
    /// Every pixel in the output has the opaque bit set.
    ///
    /// # Panics
    ///
    /// Panics if `pixels` is shorter than the native screen width.
    pub fn render_line(&mut self, line: u32, pixels: &mut [u16]) {
        let pixels = &mut pixels[..LINE_LEN];
        self.state.scanline = line;

        if self.registers.forced_blanking {
            pixels.fill(FORCED_BLANK_COLOR);
            return;
        }

        pixels.fill(self.backdrop_color().0 | 0x8000);

        self.buffers.clear();
        self.sort_bgs_by_priority();
        self.render_bg_layers(line);

        let windows_enabled = self.build_window_mask(line);

        if self.registers.obj_enabled && self.layers.obj {
            self.render_sprites(line, windows_enabled);
        }

        self.composite(pixels, windows_enabled);

        log::trace!("Rendered line {line}");
    }

    /// Advance the affine reference latches by one line.
    pub fn end_line(&mut self) {
        self.state.bg_affine_latch.increment_reference_latches(&self.registers);
    }

    pub fn set_hblank(&mut self, hblank: bool) {
        self.state.hblank = hblank;
    }

    /// Raise the VBlank flag and apply register writes deferred until VBlank.
    pub fn enter_vblank(&mut self) {
        self.state.vblank = true;
        self.state.scanline = SCREEN_HEIGHT;

        let pending = std::mem::take(&mut self.pending_writes);
        if !pending.is_empty() {
            log::debug!("Applying {} deferred register writes", pending.len());
        }
        for PendingWrite { offset, value } in pending {
            self.write_register(offset, value);
        }
    }

    pub fn set_scanline_effect(&mut self, effect: ScanlineEffect) {
        log::debug!(
            "Scanline effect set: register {:02X}, {:?}, {} entries",
            effect.register,
            effect.width,
            effect.values.len()
        );
        self.scanline_effect = Some(effect);
    }

    pub fn clear_scanline_effect(&mut self) {
        self.scanline_effect = None;
    }

    #[must_use]
    pub fn scanline_effect(&self) -> Option<&ScanlineEffect> {
        self.scanline_effect.as_ref()
    }

    /// Write the current scanline effect table entry to its register and advance the position.
    pub fn run_scanline_effect(&mut self) {
        let Some(effect) = &mut self.scanline_effect else { return };

        let Some(&value) = effect.values.get(effect.position) else {
            log::trace!("Scanline effect table exhausted at position {}", effect.position);
            return;
        };

        if effect.position + 1 < effect.values.len() {
            effect.position += 1;
        }

        let register = effect.register;
        match effect.width {
            EffectWidth::Halfword => self.write_register(register, value as u16),
            EffectWidth::Word => {
                self.write_register(register, value as u16);
                self.write_register(register + 2, (value >> 16) as u16);
            }
        }
    }

    fn bg_flags_mut(&mut self, bg: usize) -> Option<&mut BgDisplayFlags> {
        let flags = self.bg_flags.get_mut(bg);
        if flags.is_none() {
            log::warn!("Ignoring render flag update for invalid BG {bg}");
        }
        flags
    }

    pub fn set_bg_hidden(&mut self, bg: usize, hidden: bool) {
        let Some(flags) = self.bg_flags_mut(bg) else { return };
        flags.hidden = hidden;
    }

    pub fn set_bg_gba_compat(&mut self, bg: usize, gba_compat: bool) {
        let Some(flags) = self.bg_flags_mut(bg) else { return };
        flags.gba_compat = gba_compat;
    }

    /// Override the map pixel dimensions used when compatibility addressing is off.
    pub fn set_bg_map_dimensions(&mut self, bg: usize, dimensions: Option<(u32, u32)>) {
        let Some(flags) = self.bg_flags_mut(bg) else { return };
        flags.map_dimensions = dimensions;
    }

    /// Everything the line renderer reads for a BG; `None` for BG numbers past 3.
    #[must_use]
    pub fn render_bg_state(&self, bg: usize) -> Option<RenderBgState> {
        let control = self.registers.bg_control.get(bg)?;
        let flags = self.bg_flags.get(bg)?;
        let affine = self.registers.bg_mode.bg_is_affine(bg);

        let (map_width, map_height) = if affine {
            let dimension = control.size.affine_dimension_pixels();
            (dimension, dimension)
        } else {
            flags.map_dimensions.unwrap_or((
                control.size.text_width_pixels(),
                control.size.text_height_pixels(),
            ))
        };

        Some(RenderBgState {
            char_base_addr: control.tile_data_addr,
            map_base_addr: control.tile_map_addr,
            priority: control.priority,
            affine,
            affine_parameters: self.registers.bg_affine_parameters[bg & 1],
            gba_compat: flags.gba_compat,
            mosaic: control.mosaic,
            hidden: flags.hidden,
            screen_size: control.size,
            map_width,
            map_height,
            affine_overflow: control.affine_overflow,
            bpp: control.bpp,
            h_scroll: self.registers.bg_h_scroll[bg],
            v_scroll: self.registers.bg_v_scroll[bg],
        })
    }

    fn mask_vram_address(address: u32) -> usize {
        let vram_addr = (address as usize) & VRAM_ADDR_MASK;
        if vram_addr & 0x10000 != 0 { 0x10000 | (vram_addr & 0x7FFF) } else { vram_addr }
    }

    #[must_use]
    pub fn read_vram(&self, address: u32) -> u16 {
        let vram_addr = Self::mask_vram_address(address & !1);
        u16::from_le_bytes([self.vram[vram_addr], self.vram[vram_addr + 1]])
    }

    pub fn write_vram(&mut self, address: u32, value: u16) {
        let vram_addr = Self::mask_vram_address(address & !1);
        self.vram[vram_addr..vram_addr + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[must_use]
    pub fn read_vram_byte(&self, address: u32) -> u8 {
        self.vram[Self::mask_vram_address(address)]
    }

    pub fn write_vram_bytes(&mut self, address: u32, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let vram_addr = Self::mask_vram_address(address.wrapping_add(i as u32));
            self.vram[vram_addr] = byte;
        }
    }

    #[must_use]
    pub fn read_palette_ram(&self, address: u32) -> u16 {
        let palette_ram_addr = ((address >> 1) as usize) & (PALETTE_RAM_LEN_HALFWORDS - 1);
        self.palette_ram[palette_ram_addr]
    }

    pub fn write_palette_ram(&mut self, address: u32, value: u16) {
        let palette_ram_addr = ((address >> 1) as usize) & (PALETTE_RAM_LEN_HALFWORDS - 1);
        self.palette_ram[palette_ram_addr] = value;
    }

    pub fn write_palette_ram_bytes(&mut self, address: u32, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let byte_addr = address.wrapping_add(i as u32);
            let palette_ram_addr = ((byte_addr >> 1) as usize) & (PALETTE_RAM_LEN_HALFWORDS - 1);
            let halfword = &mut self.palette_ram[palette_ram_addr];
            if byte_addr & 1 == 0 {
                halfword.set_lsb(byte);
            } else {
                halfword.set_msb(byte);
            }
        }
    }

    #[must_use]
    pub fn read_oam(&self, address: u32) -> u16 {
        let oam_addr = ((address >> 1) as usize) & (OAM_LEN_HALFWORDS - 1);
        self.oam[oam_addr]
    }

    pub fn write_oam(&mut self, address: u32, value: u16) {
        let oam_addr = ((address >> 1) as usize) & (OAM_LEN_HALFWORDS - 1);
        self.oam[oam_addr] = value;
    }

    /// Write the three attribute words of a sprite. Out-of-range indices are ignored.
    pub fn set_sprite(&mut self, index: usize, sprite: &SpriteDescriptor) {
        if index >= NUM_SPRITES {
            log::warn!("Ignoring write to sprite {index}");
            return;
        }

        let attributes = sprite.to_attributes();
        self.oam[4 * index..4 * index + 3].copy_from_slice(&attributes);
    }

    #[must_use]
    pub fn sprite(&self, index: usize) -> Option<SpriteDescriptor> {
        if index >= NUM_SPRITES {
            return None;
        }

        let oam_addr = 4 * index;
        Some(SpriteDescriptor::parse([
            self.oam[oam_addr],
            self.oam[oam_addr + 1],
            self.oam[oam_addr + 2],
        ]))
    }

    /// Write sprite affine matrix `n` as `[pa, pb, pc, pd]`. Out-of-range matrices are ignored.
    pub fn set_sprite_matrix(&mut self, n: usize, matrix: [i16; 4]) {
        if n >= NUM_SPRITE_MATRICES {
            log::warn!("Ignoring write to sprite matrix {n}");
            return;
        }

        for (k, value) in matrix.into_iter().enumerate() {
            self.oam[16 * n + 4 * k + 3] = value as u16;
        }
    }

    /// Sprite affine matrix `n` as `[pa, pb, pc, pd]`; `None` for `n` past the last matrix.
    #[must_use]
    pub fn sprite_matrix(&self, n: usize) -> Option<[i16; 4]> {
        if n >= NUM_SPRITE_MATRICES {
            return None;
        }

        Some(array::from_fn(|k| self.oam[16 * n + 4 * k + 3] as i16))
    }

    pub fn set_sprite_matrix_from_rotation(
        &mut self,
        n: usize,
        x_scale: i16,
        y_scale: i16,
        rotation: u16,
    ) {
        let matrix = affine::obj_affine_set(x_scale, y_scale, rotation);
        self.set_sprite_matrix(n, matrix);
    }

    #[must_use]
    pub fn read_register(&self, offset: u32) -> u16 {
        log::trace!("Display register read {offset:02X}");

        match offset {
            0x00 => self.registers.read_dispcnt(),
            0x04 => self.read_dispstat(),
            0x06 => self.state.scanline as u16,
            0x08..=0x0E => {
                let bg = (offset & 7) >> 1;
                self.registers.read_bgcnt(bg as usize)
            }
            0x10..=0x1E => {
                let bg = ((offset & 0xF) >> 2) as usize;
                if offset & 2 == 0 {
                    self.registers.bg_h_scroll[bg]
                } else {
                    self.registers.bg_v_scroll[bg]
                }
            }
            0x20..=0x3E => self.registers.read_bg_affine_register(offset),
            0x40 => self.registers.read_winh(0),
            0x42 => self.registers.read_winh(1),
            0x44 => self.registers.read_winv(0),
            0x46 => self.registers.read_winv(1),
            0x48 => self.registers.read_winin(),
            0x4A => self.registers.read_winout(),
            0x4C => self.registers.read_mosaic(),
            0x50 => self.registers.read_bldcnt(),
            0x52 => self.registers.read_bldalpha(),
            0x54 => self.registers.read_bldy(),
            _ => {
                log::warn!("Unhandled display register read {offset:02X}");
                0
            }
        }
    }

    // $04: DISPSTAT (Display status)
    fn read_dispstat(&self) -> u16 {
        let v_counter_match = (self.state.scanline as u8) == self.registers.v_counter_match;

        u16::from(self.state.vblank)
            | (u16::from(self.state.hblank) << 1)
            | (u16::from(v_counter_match) << 2)
            | (u16::from(self.registers.vblank_irq_enabled) << 3)
            | (u16::from(self.registers.hblank_irq_enabled) << 4)
            | (u16::from(self.registers.v_counter_irq_enabled) << 5)
            | (u16::from(self.registers.v_counter_match) << 8)
    }

    pub fn write_register(&mut self, offset: u32, value: u16) {
        log::debug!(
            "Display register write {offset:02X} {value:04X} (line {})",
            self.state.scanline
        );

        match offset {
            DISPCNT => self.registers.write_dispcnt(value),
            DISPSTAT => self.registers.write_dispstat(value),
            0x08..=0x0E => {
                // BGxCNT
                let bg = (offset & 7) >> 1;
                self.registers.write_bgcnt(bg as usize, value);
            }
            0x10..=0x1E => {
                // BGxHOFS / BGxVOFS
                let bg = (offset & 0xF) >> 2;
                if offset & 2 == 0 {
                    self.registers.write_bghofs(bg as usize, value);
                } else {
                    self.registers.write_bgvofs(bg as usize, value);
                }
            }
            0x20..=0x3E => self.registers.write_bg_affine_register(
                offset,
                value,
                &mut self.state.bg_affine_latch,
            ),
            0x40 => self.registers.write_winh(0, value),
            0x42 => self.registers.write_winh(1, value),
            0x44 => self.registers.write_winv(0, value),
            0x46 => self.registers.write_winv(1, value),
            0x48 => self.registers.write_winin(value),
            0x4A => self.registers.write_winout(value),
            0x4C => self.registers.write_mosaic(value),
            0x50 => self.registers.write_bldcnt(value),
            0x52 => self.registers.write_bldalpha(value),
            0x54 => self.registers.write_bldy(value),
            _ => {
                log::warn!("Unhandled display register write {offset:02X} {value:04X}");
            }
        }
    }

    pub fn write_register_byte(&mut self, offset: u32, value: u8) {
        match offset {
            0x40 => self.registers.write_winh_low(0, value),
            0x41 => self.registers.write_winh_high(0, value),
            0x42 => self.registers.write_winh_low(1, value),
            0x43 => self.registers.write_winh_high(1, value),
            0x44 => self.registers.write_winv_low(0, value),
            0x45 => self.registers.write_winv_high(0, value),
            0x46 => self.registers.write_winv_low(1, value),
            0x47 => self.registers.write_winv_high(1, value),
            0x4C => self.registers.write_bg_mosaic(value),
            0x4D => self.registers.write_obj_mosaic(value),
            0x06 | 0x07 => {
                log::warn!("Ignoring byte write to VCOUNT {offset:02X} {value:02X}");
            }
            0x00..=0x55 => {
                let mut halfword = self.read_register(offset & !1);
                if offset & 1 == 0 {
                    halfword.set_lsb(value);
                } else {
                    halfword.set_msb(value);
                }
                self.write_register(offset & !1, halfword);
            }
            _ => {
                log::warn!("Unhandled display register byte write {offset:02X} {value:02X}");
            }
        }
    }

    /// Apply a register write immediately during forced blanking, otherwise defer it to VBlank.
    pub fn write_register_forced_blank(&mut self, offset: u32, value: u16) {
        if self.registers.forced_blanking {
            self.write_register(offset, value);
        } else {
            log::trace!("Deferring register write {offset:02X} {value:04X} to VBlank");
            self.pending_writes.push(PendingWrite { offset, value });
        }
    }

    #[must_use]
    pub fn pending_register_writes(&self) -> usize {
        self.pending_writes.len()
    }

    fn bg_displayed(&self, bg: usize) -> bool {
        self.registers.bg_enabled[bg] && self.registers.bg_mode.bg_active_in_mode(bg)
    }
}
