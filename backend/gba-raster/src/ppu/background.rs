use crate::ppu::registers::{AffineOverflowBehavior, BitsPerPixel};
use crate::ppu::{BG_VRAM_LEN, LINE_LEN, Pixel, Ppu, RenderBgState, SCREEN_WIDTH};
use raster_common::num::GetBit;

// 32x32 tile map entries of 2 bytes each
const SCREEN_BLOCK_BYTES: u32 = 0x800;
const CHAR_BLOCK_BYTES: u32 = 0x4000;

impl Ppu {
    pub(super) fn render_bg_layers(&mut self, line: u32) {
        for bg in (0..4).rev() {
            if !self.bg_displayed(bg) || !self.layers.bg[bg] || self.bg_flags[bg].hidden {
                continue;
            }

            let Some(state) = self.render_bg_state(bg) else { continue };
            if state.affine {
                self.render_affine_bg(bg, &state, line);
            } else {
                self.render_text_bg(bg, &state, line);
            }
        }
    }

    fn bg_vram_byte(&self, address: u32) -> u8 {
        if address < BG_VRAM_LEN {
            self.vram[address as usize]
        } else {
            // Reads past the BG region of VRAM are transparent
            0
        }
    }

    fn bg_vram_halfword(&self, address: u32) -> u16 {
        u16::from_le_bytes([self.bg_vram_byte(address), self.bg_vram_byte(address + 1)])
    }

    fn bg_vram_word(&self, address: u32) -> u32 {
        u32::from_le_bytes([
            self.bg_vram_byte(address),
            self.bg_vram_byte(address + 1),
            self.bg_vram_byte(address + 2),
            self.bg_vram_byte(address + 3),
        ])
    }

    fn render_text_bg(&mut self, bg: usize, state: &RenderBgState, line: u32) {
        let mosaic_h = u32::from(self.registers.bg_mosaic_h_size) + 1;
        let mosaic_v = u32::from(self.registers.bg_mosaic_v_size) + 1;
        let line = if state.mosaic { line - line % mosaic_v } else { line };

        if state.gba_compat {
            self.render_text_bg_compat(bg, state, line, mosaic_h);
        } else {
            self.render_text_bg_linear(bg, state, line, mosaic_h);
        }
    }

    // 16-bit map entries in 256x256 screen blocks, with 512-pixel wraparound
    fn render_text_bg_compat(&mut self, bg: usize, state: &RenderBgState, line: u32, mosaic_h: u32) {
        let h_scroll = u32::from(state.h_scroll & 0x1FF);
        let v_scroll = u32::from(state.v_scroll & 0x1FF);
        let wide = state.map_width > 256;
        let tall = state.map_height > 256;

        let scrolled_line = (line + v_scroll) & 0x1FF;

        for pixel in 0..SCREEN_WIDTH {
            let sample_x = if state.mosaic { pixel - pixel % mosaic_h } else { pixel };
            let x = (sample_x + h_scroll) & 0x1FF;
            let y = scrolled_line;

            let mut screen_addr = state.map_base_addr;
            if x > 255 && wide {
                screen_addr += SCREEN_BLOCK_BYTES;
            }
            if y > 255 && tall {
                // 512x512 maps skip over the two screen blocks of the top row
                screen_addr += if wide { 2 * SCREEN_BLOCK_BYTES } else { SCREEN_BLOCK_BYTES };
            }

            let x = x & 0xFF;
            let y = y & 0xFF;

            let tile_map_addr = screen_addr + 2 * ((y / 8) * 32 + x / 8);
            let entry = self.bg_vram_halfword(tile_map_addr);

            let tile_number: u32 = (entry & 0x3FF).into();
            let palette = entry >> 12;
            let tile_col = if entry.bit(10) { 7 - x % 8 } else { x % 8 };
            let tile_row = if entry.bit(11) { 7 - y % 8 } else { y % 8 };

            self.buffers.bg_pixels[bg][pixel as usize] =
                self.sample_bg_tile(state, tile_number, tile_row, tile_col, palette);
        }
    }

    // 32-bit map entries in a single plane of arbitrary size, plain modulo wraparound
    fn render_text_bg_linear(&mut self, bg: usize, state: &RenderBgState, line: u32, mosaic_h: u32) {
        let map_width = state.map_width;
        let map_height = state.map_height;
        if map_width == 0 || map_height == 0 {
            return;
        }

        let map_width_tiles = map_width / 8;
        let tiles_per_block = CHAR_BLOCK_BYTES / state.bpp.tile_size_bytes();

        let y = (line + u32::from(state.v_scroll)) % map_height;

        for pixel in 0..SCREEN_WIDTH {
            let sample_x = if state.mosaic { pixel - pixel % mosaic_h } else { pixel };
            let x = (sample_x + u32::from(state.h_scroll)) % map_width;

            let tile_map_addr = state.map_base_addr + 4 * ((y / 8) * map_width_tiles + x / 8);
            let entry = self.bg_vram_word(tile_map_addr);

            let tile_number = (entry & 0xFFFF) % tiles_per_block;
            let palette = (((entry >> 18) & 0x3FFF) % 32) as u16;
            let tile_col = if entry.bit(16) { 7 - x % 8 } else { x % 8 };
            let tile_row = if entry.bit(17) { 7 - y % 8 } else { y % 8 };

            self.buffers.bg_pixels[bg][pixel as usize] =
                self.sample_bg_tile(state, tile_number, tile_row, tile_col, palette);
        }
    }

    fn sample_bg_tile(
        &self,
        state: &RenderBgState,
        tile_number: u32,
        tile_row: u32,
        tile_col: u32,
        palette: u16,
    ) -> Pixel {
        let tile_base_addr = state.char_base_addr + tile_number * state.bpp.tile_size_bytes();
        let tile_row_addr = tile_base_addr + tile_row * state.bpp.bits();

        match state.bpp {
            BitsPerPixel::Four => {
                let tile_byte = self.bg_vram_byte(tile_row_addr + (tile_col >> 1));
                let color_id = (tile_byte >> (4 * (tile_col & 1))) & 0xF;
                if color_id == 0 {
                    return Pixel::TRANSPARENT;
                }

                let palette_ram_addr = (16 * palette + u16::from(color_id)) & 0x1FF;
                Pixel::new_opaque(self.palette_ram[palette_ram_addr as usize])
            }
            BitsPerPixel::Eight => {
                let color_id = self.bg_vram_byte(tile_row_addr + tile_col);
                if color_id == 0 {
                    return Pixel::TRANSPARENT;
                }

                Pixel::new_opaque(self.palette_ram[color_id as usize])
            }
        }
    }

    fn render_affine_bg(&mut self, bg: usize, state: &RenderBgState, line: u32) {
        let params = state.affine_parameters;
        let latch_idx = bg - 2;

        let mut x = self.state.bg_affine_latch.x[latch_idx];
        let mut y = self.state.bg_affine_latch.y[latch_idx];

        if state.mosaic {
            // Sample from the first line of the mosaic block
            let mosaic_v = u32::from(self.registers.bg_mosaic_v_size) + 1;
            let lines_back = (line % mosaic_v) as i32;
            x -= lines_back * params.b;
            y -= lines_back * params.d;
        }

        let dimension_pixels = state.map_width as i32;
        let row_shift = state.screen_size.affine_row_shift();

        for pixel in 0..LINE_LEN {
            // Affine coordinates are in 1/256 pixel units - convert to pixel
            let mut x_pixel = x >> 8;
            let mut y_pixel = y >> 8;

            x += params.a;
            y += params.c;

            if !(0..dimension_pixels).contains(&x_pixel) || !(0..dimension_pixels).contains(&y_pixel)
            {
                match state.affine_overflow {
                    AffineOverflowBehavior::Transparent => continue,
                    AffineOverflowBehavior::Wrap => {
                        x_pixel &= dimension_pixels - 1;
                        y_pixel &= dimension_pixels - 1;
                    }
                }
            }

            let x_pixel = x_pixel as u32;
            let y_pixel = y_pixel as u32;

            let tile_map_addr = state.map_base_addr + ((y_pixel >> 3) << row_shift) + (x_pixel >> 3);
            let tile_number: u32 = self.bg_vram_byte(tile_map_addr).into();

            // Affine tiles are always 8bpp
            let tile_addr =
                state.char_base_addr + (tile_number << 6) + ((y_pixel & 7) << 3) + (x_pixel & 7);
            let color_id = self.bg_vram_byte(tile_addr);
            if color_id == 0 {
                continue;
            }

            self.buffers.bg_pixels[bg][pixel] =
                Pixel::new_opaque(self.palette_ram[color_id as usize]);
        }

        let mosaic_h = usize::from(self.registers.bg_mosaic_h_size) + 1;
        if state.mosaic && mosaic_h > 1 {
            let line = &mut self.buffers.bg_pixels[bg];
            for pixel in 0..LINE_LEN {
                line[pixel] = line[pixel - pixel % mosaic_h];
            }
        }
    }
}
