use crate::ppu::compositor::{adjust_brightness, alpha_blend};
use crate::ppu::registers::{
    BitsPerPixel, BlendMode, ObjVramMapDimensions, WINDOW_MASK_BLEND, WINDOW_MASK_OUTSIDE, Window,
};
use crate::ppu::{
    NUM_SPRITES, OBJ_PALETTE_START, OBJ_VRAM_END, OBJ_VRAM_START, Pixel, Ppu, SCREEN_HEIGHT,
    SCREEN_WIDTH,
};
use raster_common::num::GetBit;

/// Row stride in tiles of the 2D OBJ tile mapping. This models the GBA's 2D mapping, where OBJ
/// VRAM is laid out as a 32x32 tile grid and each sprite row starts 32 tiles after the previous one.
const OBJ_2D_ROW_TILES: u32 = 32;

// [pa, pb, pc, pd] in 8.8 fixed point
const IDENTITY_MATRIX: [i32; 4] = [0x100, 0, 0, 0x100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpriteMode {
    #[default]
    Normal,
    SemiTransparent,
    ObjWindow,
    Invalid,
}

impl SpriteMode {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Normal,
            1 => Self::SemiTransparent,
            2 => Self::ObjWindow,
            3 => Self::Invalid,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            Self::Normal => 0,
            Self::SemiTransparent => 1,
            Self::ObjWindow => 2,
            Self::Invalid => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpriteSize {
    #[default]
    Zero,
    One,
    Two,
    Three,
}

impl SpriteSize {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Three,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpriteShape {
    #[default]
    Square,
    HorizontalRect,
    VerticalRect,
    Invalid,
}

impl SpriteShape {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Square,
            1 => Self::HorizontalRect,
            2 => Self::VerticalRect,
            3 => Self::Invalid,
            _ => unreachable!("value & 3 is always <= 3"),
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            Self::Square => 0,
            Self::HorizontalRect => 1,
            Self::VerticalRect => 2,
            Self::Invalid => 3,
        }
    }

    /// Width and height in pixels, or `None` for the prohibited shape
    #[must_use]
    pub fn size_pixels(self, size: SpriteSize) -> Option<(u32, u32)> {
        use SpriteShape::{HorizontalRect, Invalid, Square, VerticalRect};
        use SpriteSize::{One, Three, Two, Zero};

        let dimensions = match (self, size) {
            (Square, Zero) => (8, 8),
            (Square, One) => (16, 16),
            (Square, Two) => (32, 32),
            (Square, Three) => (64, 64),
            (HorizontalRect, Zero) => (16, 8),
            (HorizontalRect, One) => (32, 8),
            (HorizontalRect, Two) => (32, 16),
            (HorizontalRect, Three) => (64, 32),
            (VerticalRect, Zero) => (8, 16),
            (VerticalRect, One) => (8, 32),
            (VerticalRect, Two) => (16, 32),
            (VerticalRect, Three) => (32, 64),
            (Invalid, _) => return None,
        };
        Some(dimensions)
    }
}

/// One sprite attribute table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpriteDescriptor {
    pub x: u16,
    pub y: u8,
    pub affine: bool,
    // Double size for affine sprites, disable for non-affine sprites
    pub double_size_or_disabled: bool,
    pub mode: SpriteMode,
    pub mosaic: bool,
    pub bpp: BitsPerPixel,
    pub shape: SpriteShape,
    // Affine matrix index; bits 3 and 4 are the flip flags for non-affine sprites
    pub matrix_index: u8,
    pub size: SpriteSize,
    pub tile_number: u16,
    pub priority: u8,
    pub palette: u8,
}

impl SpriteDescriptor {
    #[must_use]
    pub fn parse(attributes: [u16; 3]) -> Self {
        Self {
            y: (attributes[0] & 0xFF) as u8,
            affine: attributes[0].bit(8),
            double_size_or_disabled: attributes[0].bit(9),
            mode: SpriteMode::from_bits(attributes[0] >> 10),
            mosaic: attributes[0].bit(12),
            bpp: BitsPerPixel::from_bit(attributes[0].bit(13)),
            shape: SpriteShape::from_bits(attributes[0] >> 14),
            x: attributes[1] & 0x1FF,
            matrix_index: ((attributes[1] >> 9) & 0x1F) as u8,
            size: SpriteSize::from_bits(attributes[1] >> 14),
            tile_number: attributes[2] & 0x3FF,
            priority: ((attributes[2] >> 10) & 3) as u8,
            palette: (attributes[2] >> 12) as u8,
        }
    }

    #[must_use]
    pub fn to_attributes(&self) -> [u16; 3] {
        let attr0 = u16::from(self.y)
            | (u16::from(self.affine) << 8)
            | (u16::from(self.double_size_or_disabled) << 9)
            | (self.mode.to_bits() << 10)
            | (u16::from(self.mosaic) << 12)
            | ((self.bpp as u16) << 13)
            | (self.shape.to_bits() << 14);
        let attr1 = (self.x & 0x1FF)
            | (u16::from(self.matrix_index & 0x1F) << 9)
            | (self.size.to_bits() << 14);
        let attr2 = (self.tile_number & 0x3FF)
            | (u16::from(self.priority & 3) << 10)
            | (u16::from(self.palette & 0xF) << 12);

        [attr0, attr1, attr2]
    }

    #[must_use]
    pub fn double_size(&self) -> bool {
        self.affine && self.double_size_or_disabled
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        !self.affine && self.double_size_or_disabled
    }

    #[must_use]
    pub fn h_flip(&self) -> bool {
        !self.affine && self.matrix_index.bit(3)
    }

    #[must_use]
    pub fn v_flip(&self) -> bool {
        !self.affine && self.matrix_index.bit(4)
    }
}

impl Ppu {
    // Sprites are drawn from the end of the table so that lower indices overwrite higher ones
    pub(super) fn render_sprites(&mut self, line: u32, windows_enabled: bool) {
        let blend_mode = self.registers.blend_mode;
        let obj_1st_target = self.registers.blend_1st_target.obj();
        let (eva, evb) = self.alpha_coefficients();
        let evy = self.brightness_coefficient();

        let obj_window_active = self.registers.obj_window_enabled;
        let obj_window_mask = self.registers.window_mask(Window::InsideObj);

        let mosaic_h = i32::from(self.registers.obj_mosaic_h_size) + 1;
        let mosaic_v = i32::from(self.registers.obj_mosaic_v_size) + 1;

        let line = line as i32;

        for index in (0..NUM_SPRITES).rev() {
            let Some(sprite) = self.sprite(index) else { continue };

            if sprite.disabled() {
                continue;
            }

            let Some((width, height)) = sprite.shape.size_pixels(sprite.size) else {
                // Prohibited shape
                continue;
            };
            let width = width as i32;
            let height = height as i32;

            let mut x = i32::from(sprite.x);
            let mut y = i32::from(sprite.y);
            if x >= SCREEN_WIDTH as i32 {
                x -= 512;
            }
            if y >= SCREEN_HEIGHT as i32 {
                y -= 256;
            }

            let (half_width, half_height) =
                if sprite.double_size() { (width, height) } else { (width / 2, height / 2) };
            let center_x = x + half_width;
            let center_y = y + half_height;

            if line < center_y - half_height || line >= center_y + half_height {
                // Sprite does not overlap this scanline
                continue;
            }

            let matrix: [i32; 4] = match self.sprite_matrix(sprite.matrix_index.into()) {
                Some(matrix) if sprite.affine => matrix.map(i32::from),
                _ => IDENTITY_MATRIX,
            };

            let local_y =
                if sprite.mosaic { line - line % mosaic_v - center_y } else { line - center_y };
            let h_flip = sprite.h_flip();
            let v_flip = sprite.v_flip();

            for local_x in -half_width..half_width {
                let global_x = center_x + local_x;
                if !(0..SCREEN_WIDTH as i32).contains(&global_x) {
                    continue;
                }

                // Horizontal mosaic snaps screen coordinates so that the blocks do not scroll
                let sample_x =
                    if sprite.mosaic { global_x - global_x % mosaic_h - center_x } else { local_x };

                let mut tex_x = ((matrix[0] * sample_x + matrix[1] * local_y) >> 8) + width / 2;
                let mut tex_y = ((matrix[2] * sample_x + matrix[3] * local_y) >> 8) + height / 2;
                if !(0..width).contains(&tex_x) || !(0..height).contains(&tex_y) {
                    continue;
                }

                if h_flip {
                    tex_x = width - tex_x - 1;
                }
                if v_flip {
                    tex_y = height - tex_y - 1;
                }

                let color_id = self.sample_obj_tile(&sprite, width as u32, tex_x as u32, tex_y as u32);
                if color_id == 0 {
                    continue;
                }

                let global_x = global_x as usize;
                let window_mask = self.buffers.window_mask[global_x];

                if sprite.mode == SpriteMode::ObjWindow {
                    // Only pixels still in the outside region are claimed; the first OBJ window
                    // sprite to cover a pixel wins
                    if obj_window_active && window_mask & WINDOW_MASK_OUTSIDE != 0 {
                        self.buffers.window_mask[global_x] = obj_window_mask;
                    }
                    continue;
                }

                let palette_ram_addr = match sprite.bpp {
                    BitsPerPixel::Four => {
                        OBJ_PALETTE_START + 16 * usize::from(sprite.palette) + usize::from(color_id)
                    }
                    BitsPerPixel::Eight => OBJ_PALETTE_START + usize::from(color_id),
                };
                let mut color = Pixel::new_opaque(self.palette_ram[palette_ram_addr]);

                let blend_allowed = !windows_enabled || window_mask & WINDOW_MASK_BLEND != 0;

                // Semi-transparent sprites always alpha blend regardless of blend mode and window
                if (blend_mode == BlendMode::AlphaBlending && obj_1st_target && blend_allowed)
                    || sprite.mode == SpriteMode::SemiTransparent
                {
                    if let Some(target) =
                        self.select_blend_target(sprite.priority, 0, global_x, false)
                    {
                        color = alpha_blend(color, target, eva, evb);
                    }
                } else if obj_1st_target && blend_allowed {
                    match blend_mode {
                        BlendMode::BrightnessIncrease => {
                            color = adjust_brightness::<true>(color, evy);
                        }
                        BlendMode::BrightnessDecrease => {
                            color = adjust_brightness::<false>(color, evy);
                        }
                        BlendMode::None | BlendMode::AlphaBlending => {}
                    }
                }

                self.buffers.obj_pixels[usize::from(sprite.priority)][global_x] = color;
            }
        }
    }

    fn sample_obj_tile(&self, sprite: &SpriteDescriptor, width: u32, tex_x: u32, tex_y: u32) -> u8 {
        let block_x = tex_x / 8;
        let block_y = tex_y / 8;
        let tile_col = tex_x % 8;
        let tile_row = tex_y % 8;
        let width_tiles = width / 8;
        let base_tile = u32::from(sprite.tile_number);

        // 8bpp tiles span two tile slots
        let tile_number = match (sprite.bpp, self.registers.obj_vram_map_dimensions) {
            (BitsPerPixel::Four, ObjVramMapDimensions::One) => {
                base_tile + block_y * width_tiles + block_x
            }
            (BitsPerPixel::Four, ObjVramMapDimensions::Two) => {
                base_tile + block_y * OBJ_2D_ROW_TILES + block_x
            }
            (BitsPerPixel::Eight, ObjVramMapDimensions::One) => {
                base_tile + 2 * (block_y * width_tiles + block_x)
            }
            (BitsPerPixel::Eight, ObjVramMapDimensions::Two) => {
                base_tile + block_y * OBJ_2D_ROW_TILES + 2 * block_x
            }
        } & 0x3FF;

        let tile_base_addr = OBJ_VRAM_START + tile_number * 32;
        match sprite.bpp {
            BitsPerPixel::Four => {
                let tile_addr = tile_base_addr + 4 * tile_row + (tile_col >> 1);
                let tile_byte = self.vram[tile_addr as usize];
                (tile_byte >> (4 * (tile_col & 1))) & 0xF
            }
            BitsPerPixel::Eight => {
                let tile_addr = tile_base_addr + 8 * tile_row + tile_col;
                if tile_addr < OBJ_VRAM_END {
                    self.vram[tile_addr as usize]
                } else {
                    // Odd tile numbers near the end of OBJ VRAM
                    0
                }
            }
        }
    }
}
