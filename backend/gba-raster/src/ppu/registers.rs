//! Typed display register file
//!
//! Offsets are relative to the start of the display I/O block.

use crate::ppu::BgAffineLatch;
use bincode::{Decode, Encode};
use raster_common::define_bit_enum;
use raster_common::num::{GetBit, U16Ext, sign_extend};
use std::array;

pub const DISPCNT: u32 = 0x00;
pub const DISPSTAT: u32 = 0x04;
pub const VCOUNT: u32 = 0x06;
pub const BG0CNT: u32 = 0x08;
pub const BG0HOFS: u32 = 0x10;
pub const BG0VOFS: u32 = 0x12;
pub const BG2PA: u32 = 0x20;
pub const BG2PB: u32 = 0x22;
pub const BG2PC: u32 = 0x24;
pub const BG2PD: u32 = 0x26;
pub const BG2X_L: u32 = 0x28;
pub const BG2X_H: u32 = 0x2A;
pub const BG2Y_L: u32 = 0x2C;
pub const BG2Y_H: u32 = 0x2E;
pub const BG3PA: u32 = 0x30;
pub const BG3X_L: u32 = 0x38;
pub const BG3X_H: u32 = 0x3A;
pub const BG3Y_L: u32 = 0x3C;
pub const BG3Y_H: u32 = 0x3E;
pub const WIN0H: u32 = 0x40;
pub const WIN1H: u32 = 0x42;
pub const WIN0V: u32 = 0x44;
pub const WIN1V: u32 = 0x46;
pub const WININ: u32 = 0x48;
pub const WINOUT: u32 = 0x4A;
pub const MOSAIC: u32 = 0x4C;
pub const BLDCNT: u32 = 0x50;
pub const BLDALPHA: u32 = 0x52;
pub const BLDY: u32 = 0x54;

#[must_use]
pub const fn bgcnt(bg: usize) -> u32 {
    BG0CNT + 2 * bg as u32
}

#[must_use]
pub const fn bghofs(bg: usize) -> u32 {
    BG0HOFS + 4 * bg as u32
}

#[must_use]
pub const fn bgvofs(bg: usize) -> u32 {
    BG0VOFS + 4 * bg as u32
}

/// Window mask bits, shared by WININ/WINOUT halves and the per-pixel window mask
pub const WINDOW_MASK_OBJ: u8 = 1 << 4;
pub const WINDOW_MASK_BLEND: u8 = 1 << 5;
pub const WINDOW_MASK_OUTSIDE: u8 = 1 << 6;

// BG0-3, OBJ, and blend bits of a WININ/WINOUT half
const WINDOW_MASK_LAYERS: u8 = 0x3F;

const AFFINE_REGISTER_NAMES: [&str; 8] = ["PA", "PB", "PC", "PD", "X_L", "X_H", "Y_L", "Y_H"];

/// Bits of DISPCNT that hold the BG mode and the four BG enable flags
pub const DISPCNT_MODE_AND_BG_BITS: u16 = 0x0F07;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum BgMode {
    #[default]
    Zero, // 4 text BGs
    One, // 2 text BGs + 1 affine BG
    Two, // 2 affine BGs
    Unsupported(u8),
}

impl BgMode {
    #[must_use]
    pub fn to_bits(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Unsupported(bits) => bits,
        }
    }

    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        match bits & 7 {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::Two,
            b => Self::Unsupported(b as u8),
        }
    }

    #[allow(clippy::manual_range_patterns)]
    #[must_use]
    pub fn bg_active_in_mode(self, bg: usize) -> bool {
        matches!((self, bg), (Self::Zero, 0..=3) | (Self::One, 0 | 1 | 2) | (Self::Two, 2 | 3))
    }

    #[must_use]
    pub fn bg_is_affine(self, bg: usize) -> bool {
        matches!((self, bg), (Self::One, 2) | (Self::Two, 2 | 3))
    }
}

define_bit_enum!(ObjVramMapDimensions, [Two, One]);
define_bit_enum!(BitsPerPixel, [Four, Eight]);

impl BitsPerPixel {
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    #[must_use]
    pub fn tile_size_bytes(self) -> u32 {
        8 * self.bits()
    }
}

define_bit_enum!(AffineOverflowBehavior, [Transparent, Wrap]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum ScreenSize {
    #[default]
    Zero = 0, // 256x256 text / 128x128 affine
    One = 1,   // 512x256 text / 256x256 affine
    Two = 2,   // 256x512 text / 512x512 affine
    Three = 3, // 512x512 text / 1024x1024 affine
}

impl ScreenSize {
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Three,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    #[must_use]
    pub fn text_width_pixels(self) -> u32 {
        match self {
            Self::Zero | Self::Two => 256,
            Self::One | Self::Three => 512,
        }
    }

    #[must_use]
    pub fn text_height_pixels(self) -> u32 {
        match self {
            Self::Zero | Self::One => 256,
            Self::Two | Self::Three => 512,
        }
    }

    #[must_use]
    pub fn affine_dimension_pixels(self) -> u32 {
        128 << (self as u32)
    }

    /// log2 of the affine map width in tiles
    #[must_use]
    pub fn affine_row_shift(self) -> u32 {
        4 + self as u32
    }
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct BgControl {
    pub priority: u8,
    pub tile_data_addr: u32,
    pub mosaic: bool,
    pub bpp: BitsPerPixel,
    pub tile_map_addr: u32,
    pub affine_overflow: AffineOverflowBehavior,
    pub size: ScreenSize,
}

impl BgControl {
    fn read(&self) -> u16 {
        u16::from(self.priority)
            | (((self.tile_data_addr >> 14) as u16) << 2)
            | (u16::from(self.mosaic) << 6)
            | ((self.bpp as u16) << 7)
            | (((self.tile_map_addr >> 11) as u16) << 8)
            | ((self.affine_overflow as u16) << 13)
            | ((self.size as u16) << 14)
    }

    fn write(&mut self, value: u16) {
        self.priority = (value & 3) as u8;
        self.tile_data_addr = u32::from((value >> 2) & 3) << 14;
        self.mosaic = value.bit(6);
        self.bpp = BitsPerPixel::from_bit(value.bit(7));
        self.tile_map_addr = u32::from((value >> 8) & 0x1F) << 11;
        self.affine_overflow = AffineOverflowBehavior::from_bit(value.bit(13));
        self.size = ScreenSize::from_bits(value >> 14);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct BgAffineParameters {
    // BG2X / BG3X, 28-bit signed 20.8
    pub reference_x: i32,
    // BG2Y / BG3Y
    pub reference_y: i32,
    // BG2PA / BG3PA, signed 8.8
    pub a: i32,
    // BG2PB / BG3PB
    pub b: i32,
    // BG2PC / BG3PC
    pub c: i32,
    // BG2PD / BG3PD
    pub d: i32,
}

impl Default for BgAffineParameters {
    fn default() -> Self {
        Self { reference_x: 0, reference_y: 0, a: 1 << 8, b: 0, c: 0, d: 1 << 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum BlendMode {
    #[default]
    None = 0,
    AlphaBlending = 1,
    BrightnessIncrease = 2,
    BrightnessDecrease = 3,
}

impl BlendMode {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::None,
            1 => Self::AlphaBlending,
            2 => Self::BrightnessIncrease,
            3 => Self::BrightnessDecrease,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }
}

/// Window regions, in the order their layer masks are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Inside0 = 0,
    Inside1 = 1,
    Outside = 2,
    InsideObj = 3,
}

/// BLDCNT target selection: bits 0-3 select BG0-3, bit 4 OBJ, bit 5 the backdrop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct BlendTargets(u8);

impl BlendTargets {
    fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3F)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn bg(self, bg: usize) -> bool {
        self.0.bit(bg as u8)
    }

    #[must_use]
    pub fn obj(self) -> bool {
        self.0.bit(4)
    }

    #[must_use]
    pub fn backdrop(self) -> bool {
        self.0.bit(5)
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Registers {
    // DISPCNT
    pub bg_mode: BgMode,
    pub dispcnt_reserved: u16,
    pub obj_vram_map_dimensions: ObjVramMapDimensions,
    pub forced_blanking: bool,
    pub bg_enabled: [bool; 4],
    pub obj_enabled: bool,
    pub window_enabled: [bool; 2],
    pub obj_window_enabled: bool,
    // DISPSTAT
    pub vblank_irq_enabled: bool,
    pub hblank_irq_enabled: bool,
    pub v_counter_irq_enabled: bool,
    pub v_counter_match: u8,
    // BGxCNT
    pub bg_control: [BgControl; 4],
    // BGxHOFS / BGxVOFS, stored as written
    pub bg_h_scroll: [u16; 4],
    pub bg_v_scroll: [u16; 4],
    // BG2/BG3 PA-PD, X, Y
    pub bg_affine_parameters: [BgAffineParameters; 2],
    // WINxH / WINxV edges; x2 and y2 are exclusive
    pub window_x1: [u8; 2],
    pub window_x2: [u8; 2],
    pub window_y1: [u8; 2],
    pub window_y2: [u8; 2],
    // WININ / WINOUT layer masks, indexed by `Window`
    pub window_masks: [u8; 4],
    // MOSAIC
    pub bg_mosaic_h_size: u8,
    pub bg_mosaic_v_size: u8,
    pub obj_mosaic_h_size: u8,
    pub obj_mosaic_v_size: u8,
    // BLDCNT
    pub blend_1st_target: BlendTargets,
    pub blend_mode: BlendMode,
    pub blend_2nd_target: BlendTargets,
    // BLDALPHA
    pub blend_alpha_a: u8,
    pub blend_alpha_b: u8,
    // BLDY
    pub blend_brightness: u8,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    // $00: DISPCNT (Display control)
    pub fn write_dispcnt(&mut self, value: u16) {
        self.bg_mode = BgMode::from_bits(value);
        self.dispcnt_reserved = value & 0x0038;
        self.obj_vram_map_dimensions = ObjVramMapDimensions::from_bit(value.bit(6));
        self.forced_blanking = value.bit(7);
        self.bg_enabled = array::from_fn(|i| value.bit((8 + i) as u8));
        self.obj_enabled = value.bit(12);
        self.window_enabled = [value.bit(13), value.bit(14)];
        self.obj_window_enabled = value.bit(15);

        log::debug!("DISPCNT write: {value:04X}");
        log::debug!("  BG mode: {:?}", self.bg_mode);
        log::debug!("  OBJ VRAM map dimensions: {:?}", self.obj_vram_map_dimensions);
        log::debug!("  Forced blanking enabled: {}", self.forced_blanking);
        log::debug!("  BGs enabled: {:?}", self.bg_enabled);
        log::debug!("  OBJ enabled: {}", self.obj_enabled);
        log::debug!("  Window 0 enabled: {}", self.window_enabled[0]);
        log::debug!("  Window 1 enabled: {}", self.window_enabled[1]);
        log::debug!("  OBJ window enabled: {}", self.obj_window_enabled);
    }

    // $00: DISPCNT (Display control)
    pub fn read_dispcnt(&self) -> u16 {
        let bg_enabled_bits = bool_array_to_bits(self.bg_enabled);

        u16::from(self.bg_mode.to_bits())
            | self.dispcnt_reserved
            | ((self.obj_vram_map_dimensions as u16) << 6)
            | (u16::from(self.forced_blanking) << 7)
            | (bg_enabled_bits << 8)
            | (u16::from(self.obj_enabled) << 12)
            | (u16::from(self.window_enabled[0]) << 13)
            | (u16::from(self.window_enabled[1]) << 14)
            | (u16::from(self.obj_window_enabled) << 15)
    }

    // $04: DISPSTAT (Display status), write-only bits
    pub fn write_dispstat(&mut self, value: u16) {
        self.vblank_irq_enabled = value.bit(3);
        self.hblank_irq_enabled = value.bit(4);
        self.v_counter_irq_enabled = value.bit(5);
        self.v_counter_match = value.msb();

        log::debug!("DISPSTAT write: {value:04X}");
        log::debug!("  VBlank hook enabled: {}", self.vblank_irq_enabled);
        log::debug!("  HBlank hook enabled: {}", self.hblank_irq_enabled);
        log::debug!("  V counter match enabled: {}", self.v_counter_irq_enabled);
        log::debug!("  V counter match target: {}", self.v_counter_match);
    }

    // $08-$0E: BG0CNT/BG1CNT/BG2CNT/BG3CNT (BG0-3 control)
    pub fn read_bgcnt(&self, index: usize) -> u16 {
        self.bg_control[index].read()
    }

    // $08-$0E: BG0CNT/BG1CNT/BG2CNT/BG3CNT (BG0-3 control)
    pub fn write_bgcnt(&mut self, index: usize, value: u16) {
        self.bg_control[index].write(value);

        log::debug!("BG{index}CNT write: {value:04X}");
        log::debug!("  Priority: {}", self.bg_control[index].priority);
        log::debug!("  Tile data base address: {:04X}", self.bg_control[index].tile_data_addr);
        log::debug!("  Mosaic enabled: {}", self.bg_control[index].mosaic);
        log::debug!("  Bits per pixel: {:?}", self.bg_control[index].bpp);
        log::debug!("  Tile map base address: {:04X}", self.bg_control[index].tile_map_addr);
        log::debug!("  Affine overflow behavior: {:?}", self.bg_control[index].affine_overflow);
        log::debug!("  Screen size: {}", self.bg_control[index].size as u8);
    }

    // $10/$14/$18/$1C: BG0HOFS-BG3HOFS (BG0-3 horizontal offset)
    pub fn write_bghofs(&mut self, index: usize, value: u16) {
        self.bg_h_scroll[index] = value;

        log::debug!("BG{index}HOFS write: {value:04X}");
    }

    // $12/$16/$1A/$1E: BG0VOFS-BG3VOFS (BG0-3 vertical offset)
    pub fn write_bgvofs(&mut self, index: usize, value: u16) {
        self.bg_v_scroll[index] = value;

        log::debug!("BG{index}VOFS write: {value:04X}");
    }

    // $20-$3E: BG2/3 affine parameter registers
    pub fn write_bg_affine_register(
        &mut self,
        address: u32,
        value: u16,
        latch: &mut BgAffineLatch,
    ) {
        let bg_idx = ((address >> 4) & 1) as usize;
        let register = ((address >> 1) & 7) as usize;
        let params = &mut self.bg_affine_parameters[bg_idx];

        log::debug!("BG{}{} write: {value:04X}", bg_idx + 2, AFFINE_REGISTER_NAMES[register]);

        let matrix_value = i32::from(value as i16);
        match register {
            0 => params.a = matrix_value,
            1 => params.b = matrix_value,
            2 => params.c = matrix_value,
            3 => params.d = matrix_value,
            4..=7 => {
                let (reference, latched) = if register < 6 {
                    (&mut params.reference_x, &mut latch.x[bg_idx])
                } else {
                    (&mut params.reference_y, &mut latch.y[bg_idx])
                };

                let raw = *reference as u32;
                let raw = if register & 1 == 0 {
                    (raw & !0xFFFF) | u32::from(value)
                } else {
                    // Bits 12-15 of the high half are dropped
                    (raw & 0xFFFF) | (u32::from(value & 0x0FFF) << 16)
                };
                *reference = sign_extend::<28>(raw);

                // Reference point writes reload the running latch
                *latched = *reference;

                log::debug!("  Reference point: {:07X}", *reference);
            }
            _ => unreachable!("register index is 3 bits"),
        }
    }

    pub fn read_bg_affine_register(&self, address: u32) -> u16 {
        let params = &self.bg_affine_parameters[((address >> 4) & 1) as usize];

        let register_value = match (address >> 1) & 7 {
            0 => params.a,
            1 => params.b,
            2 => params.c,
            3 => params.d,
            4 => params.reference_x,
            5 => (params.reference_x >> 16) & 0x0FFF,
            6 => params.reference_y,
            7 => (params.reference_y >> 16) & 0x0FFF,
            _ => unreachable!("register index is 3 bits"),
        };
        register_value as u16
    }

    // $40/$42: WIN0H/WIN1H (Window 0/1 horizontal coordinates)
    pub fn read_winh(&self, window: usize) -> u16 {
        u16::from_be_bytes([self.window_x1[window], self.window_x2[window]])
    }

    // $40/$42: WIN0H/WIN1H (Window 0/1 horizontal coordinates)
    pub fn write_winh(&mut self, window: usize, value: u16) {
        [self.window_x1[window], self.window_x2[window]] = value.to_be_bytes();

        log::debug!("WIN{window}H write: {value:04X}");
        log::debug!("  X1: {}", self.window_x1[window]);
        log::debug!("  X2: {}", self.window_x2[window]);
    }

    pub fn write_winh_low(&mut self, window: usize, value: u8) {
        self.window_x2[window] = value;

        log::debug!("WIN{window}H_L write: {value:02X}");
    }

    pub fn write_winh_high(&mut self, window: usize, value: u8) {
        self.window_x1[window] = value;

        log::debug!("WIN{window}H_H write: {value:02X}");
    }

    // $44/$46: WIN0V/WIN1V (Window 0/1 vertical coordinates)
    pub fn read_winv(&self, window: usize) -> u16 {
        u16::from_be_bytes([self.window_y1[window], self.window_y2[window]])
    }

    // $44/$46: WIN0V/WIN1V (Window 0/1 vertical coordinates)
    pub fn write_winv(&mut self, window: usize, value: u16) {
        [self.window_y1[window], self.window_y2[window]] = value.to_be_bytes();

        log::debug!("WIN{window}V write: {value:04X}");
        log::debug!("  Y1: {}", self.window_y1[window]);
        log::debug!("  Y2: {}", self.window_y2[window]);
    }

    pub fn write_winv_low(&mut self, window: usize, value: u8) {
        self.window_y2[window] = value;

        log::debug!("WIN{window}V_L write: {value:02X}");
    }

    pub fn write_winv_high(&mut self, window: usize, value: u8) {
        self.window_y1[window] = value;

        log::debug!("WIN{window}V_H write: {value:02X}");
    }

    // $48: WININ (Window inside control)
    pub fn read_winin(&self) -> u16 {
        u16::from_le_bytes([self.window_mask(Window::Inside0), self.window_mask(Window::Inside1)])
    }

    // $48: WININ (Window inside control)
    pub fn write_winin(&mut self, value: u16) {
        let [win0, win1] = value.to_le_bytes();
        self.window_masks[Window::Inside0 as usize] = win0 & WINDOW_MASK_LAYERS;
        self.window_masks[Window::Inside1 as usize] = win1 & WINDOW_MASK_LAYERS;

        log::debug!("WININ write: {value:04X}");
        log::debug!("  Window 0 layers: {:06b}", self.window_mask(Window::Inside0));
        log::debug!("  Window 1 layers: {:06b}", self.window_mask(Window::Inside1));
    }

    // $4A: WINOUT (Window outside control)
    pub fn read_winout(&self) -> u16 {
        u16::from_le_bytes([self.window_mask(Window::Outside), self.window_mask(Window::InsideObj)])
    }

    // $4A: WINOUT (Window outside control)
    pub fn write_winout(&mut self, value: u16) {
        let [outside, obj_window] = value.to_le_bytes();
        self.window_masks[Window::Outside as usize] = outside & WINDOW_MASK_LAYERS;
        self.window_masks[Window::InsideObj as usize] = obj_window & WINDOW_MASK_LAYERS;

        log::debug!("WINOUT write: {value:04X}");
        log::debug!("  Outside layers: {:06b}", self.window_mask(Window::Outside));
        log::debug!("  OBJ window layers: {:06b}", self.window_mask(Window::InsideObj));
    }

    // $4C: MOSAIC (Mosaic size)
    pub fn read_mosaic(&self) -> u16 {
        u16::from(self.bg_mosaic_h_size)
            | (u16::from(self.bg_mosaic_v_size) << 4)
            | (u16::from(self.obj_mosaic_h_size) << 8)
            | (u16::from(self.obj_mosaic_v_size) << 12)
    }

    // $4C: MOSAIC (Mosaic size)
    pub fn write_mosaic(&mut self, value: u16) {
        log::debug!("MOSAIC write: {value:04X}");

        let [bg_mosaic, obj_mosaic] = value.to_le_bytes();
        self.write_bg_mosaic(bg_mosaic);
        self.write_obj_mosaic(obj_mosaic);
    }

    pub fn write_bg_mosaic(&mut self, value: u8) {
        self.bg_mosaic_h_size = value & 0xF;
        self.bg_mosaic_v_size = value >> 4;

        log::debug!("MOSAIC low write: {value:02X}");
        log::debug!("  BG H size: {}", self.bg_mosaic_h_size);
        log::debug!("  BG V size: {}", self.bg_mosaic_v_size);
    }

    pub fn write_obj_mosaic(&mut self, value: u8) {
        self.obj_mosaic_h_size = value & 0xF;
        self.obj_mosaic_v_size = value >> 4;

        log::debug!("MOSAIC high write: {value:02X}");
        log::debug!("  OBJ H size: {}", self.obj_mosaic_h_size);
        log::debug!("  OBJ V size: {}", self.obj_mosaic_v_size);
    }

    // $50: BLDCNT (Blending control)
    pub fn read_bldcnt(&self) -> u16 {
        u16::from(self.blend_1st_target.bits())
            | ((self.blend_mode as u16) << 6)
            | (u16::from(self.blend_2nd_target.bits()) << 8)
    }

    // $50: BLDCNT (Blending control)
    pub fn write_bldcnt(&mut self, value: u16) {
        let [first, second] = value.to_le_bytes();
        self.blend_1st_target = BlendTargets::from_bits(first);
        self.blend_mode = BlendMode::from_bits(value >> 6);
        self.blend_2nd_target = BlendTargets::from_bits(second);

        log::debug!("BLDCNT write: {value:04X}");
        log::debug!("  Blend mode: {:?}", self.blend_mode);
        log::debug!("  1st targets: {:06b}", self.blend_1st_target.bits());
        log::debug!("  2nd targets: {:06b}", self.blend_2nd_target.bits());
    }

    // $52: BLDALPHA (Alpha blending coefficients)
    pub fn read_bldalpha(&self) -> u16 {
        u16::from_le_bytes([self.blend_alpha_a, self.blend_alpha_b])
    }

    // $52: BLDALPHA (Alpha blending coefficients)
    pub fn write_bldalpha(&mut self, value: u16) {
        self.blend_alpha_a = (value & 0x1F) as u8;
        self.blend_alpha_b = ((value >> 8) & 0x1F) as u8;

        log::debug!("BLDALPHA write: {value:04X}");
        log::debug!("  A: {}", self.blend_alpha_a);
        log::debug!("  B: {}", self.blend_alpha_b);
    }

    // $54: BLDY (Blending brightness coefficient)
    pub fn read_bldy(&self) -> u16 {
        self.blend_brightness.into()
    }

    // $54: BLDY (Blending brightness coefficient)
    pub fn write_bldy(&mut self, value: u16) {
        self.blend_brightness = (value & 0x1F) as u8;

        log::debug!("BLDY write: {value:04X} (coefficient = {})", self.blend_brightness);
    }

    /// Layer mask for a window region, in the per-pixel window mask layout
    #[must_use]
    pub fn window_mask(&self, window: Window) -> u8 {
        self.window_masks[window as usize]
    }

    /// Whether window 0/1 covers the given line. A top coordinate greater than the bottom
    /// coordinate wraps around the screen edge.
    pub fn window_active_on_line(&self, window: usize, line: u32) -> bool {
        self.window_enabled[window]
            && wrapping_range_contains(
                self.window_y1[window].into(),
                self.window_y2[window].into(),
                line,
            )
    }

    pub fn window_contains_x(&self, window: usize, x: u32) -> bool {
        wrapping_range_contains(self.window_x1[window].into(), self.window_x2[window].into(), x)
    }

    pub fn any_window_enabled(&self) -> bool {
        self.window_enabled[0]
            || self.window_enabled[1]
            || (self.obj_window_enabled && self.obj_enabled)
    }
}

fn wrapping_range_contains(start: u32, end: u32, value: u32) -> bool {
    if start > end { value >= start || value < end } else { (start..end).contains(&value) }
}

fn bool_array_to_bits(arr: [bool; 4]) -> u16 {
    arr.into_iter().enumerate().fold(0, |bits, (i, b)| bits | (u16::from(b) << i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bgcnt_round_trips_packed_word() {
        let mut registers = Registers::new();
        registers.write_bgcnt(1, 0xFFC7);

        let control = registers.bg_control[1];
        assert_eq!(control.priority, 3);
        assert_eq!(control.tile_data_addr, 0x4000);
        assert!(control.mosaic);
        assert_eq!(control.bpp, BitsPerPixel::Eight);
        assert_eq!(control.tile_map_addr, 0x1F << 11);
        assert_eq!(control.affine_overflow, AffineOverflowBehavior::Wrap);
        assert_eq!(control.size, ScreenSize::Three);
        assert_eq!(registers.read_bgcnt(1), 0xFFC7);
    }

    #[test]
    fn reference_point_sign_extends_from_28_bits() {
        let mut registers = Registers::new();
        let mut latch = BgAffineLatch::default();

        registers.write_bg_affine_register(BG2X_L, 0x0000, &mut latch);
        registers.write_bg_affine_register(BG2X_H, 0x0800, &mut latch);
        assert_eq!(registers.bg_affine_parameters[0].reference_x, -0x0800_0000);
        assert_eq!(latch.x[0], -0x0800_0000);

        registers.write_bg_affine_register(BG3Y_H, 0xFFFF, &mut latch);
        registers.write_bg_affine_register(BG3Y_L, 0xFF00, &mut latch);
        assert_eq!(registers.bg_affine_parameters[1].reference_y, -0x100);
        assert_eq!(latch.y[1], -0x100);
    }

    #[test]
    fn window_ranges_wrap() {
        let mut registers = Registers::new();
        registers.window_enabled[0] = true;
        registers.write_winv(0, 0x9010); // top 144, bottom 16
        registers.write_winh(0, 0x2010); // left 32, right 16

        assert!(registers.window_active_on_line(0, 0));
        assert!(registers.window_active_on_line(0, 150));
        assert!(!registers.window_active_on_line(0, 16));
        assert!(!registers.window_active_on_line(0, 80));

        assert!(registers.window_contains_x(0, 10));
        assert!(registers.window_contains_x(0, 32));
        assert!(!registers.window_contains_x(0, 20));
    }

    #[test]
    fn window_masks_follow_winin_and_winout() {
        let mut registers = Registers::new();
        registers.write_winin(0xFA25);
        assert_eq!(registers.read_winin(), 0x3A25);
        assert_eq!(registers.window_mask(Window::Inside0), 0x25);
        assert_eq!(registers.window_mask(Window::Inside1), 0x3A);

        registers.write_winout(0x1013);
        assert_eq!(registers.window_mask(Window::Outside), 0x13);
        assert_eq!(registers.window_mask(Window::InsideObj), 0x10);
    }

    #[test]
    fn bldcnt_targets() {
        let mut registers = Registers::new();
        registers.write_bldcnt(0xE6A2);

        assert_eq!(registers.blend_mode, BlendMode::BrightnessIncrease);
        assert!(registers.blend_1st_target.bg(1));
        assert!(!registers.blend_1st_target.bg(0));
        assert!(registers.blend_1st_target.backdrop());
        assert!(!registers.blend_1st_target.obj());
        assert!(registers.blend_2nd_target.bg(1));
        assert!(registers.blend_2nd_target.bg(2));
        assert!(registers.blend_2nd_target.backdrop());
        assert_eq!(registers.read_bldcnt(), 0x26A2);
    }
}
