//! Demo scene: a scrolling checkerboard, a blended wavy panel, and one sprite, all set up through
//! the background state manager

use crate::queue::QueuedTransfer;
use gba_raster::bg::{BgManager, BgTemplate, ScrollOp, TileRect, TilemapBuffer};
use gba_raster::frame::{FrameBuffer, FrameHooks, Viewport};
use gba_raster::ppu::registers::{BLDALPHA, BLDCNT, DISPCNT, DISPSTAT, bghofs};
use gba_raster::ppu::{self, SpriteDescriptor};
use gba_raster::{EffectWidth, Ppu, ScanlineEffect};

const CHECKER_BG: usize = 0;
const PANEL_BG: usize = 1;

// OBJ enabled, 1D OBJ tile mapping
const DISPCNT_OBJ_1D: u16 = 0x1040;

// V-blank hook enabled
const DISPSTAT_VBLANK_HOOK: u16 = 0x0008;

// Alpha blend with the panel as first target and the checkerboard as second target
const PANEL_BLEND: u16 = 0x0142;
const PANEL_ALPHA: u16 = 0x0A08;

const BG_PALETTE: [u16; 5] = [0x2400, 0x4E73, 0x2D6B, 0x7FFF, 0x03FF];

const TILE_BYTES: usize = 32;

const PANEL_RECT: TileRect = TileRect { x: 4, y: 6, width: 22, height: 8 };

const BORDER_LIGHT: u16 = 0x9CE7;
const BORDER_DARK: u16 = 0x8C63;

fn bg_tiles() -> Vec<u8> {
    let mut tiles = vec![0; 4 * TILE_BYTES];

    // Tile 1: checker quarters of colors 1 and 2
    for row in 0..8 {
        let (left, right) = if row < 4 { (0x11, 0x22) } else { (0x22, 0x11) };
        let start = TILE_BYTES + 4 * row;
        tiles[start..start + 4].copy_from_slice(&[left, left, right, right]);
    }

    // Tile 2: color 4 with a color 3 outline
    for row in 0..8 {
        let start = 2 * TILE_BYTES + 4 * row;
        let fill = if row == 0 || row == 7 { [0x33; 4] } else { [0x43, 0x44, 0x44, 0x34] };
        tiles[start..start + 4].copy_from_slice(&fill);
    }

    // Tile 3: solid color 3
    tiles[3 * TILE_BYTES..].fill(0x33);

    tiles
}

fn palette_bytes(colors: &[u16]) -> Vec<u8> {
    colors.iter().flat_map(|color| color.to_le_bytes()).collect()
}

fn panel_wave() -> Vec<u32> {
    (0..ppu::SCREEN_HEIGHT)
        .map(|line| {
            let phase = line % 32;
            let offset = if phase < 16 { phase } else { 32 - phase };
            offset.wrapping_sub(8) & 0x1FF
        })
        .collect()
}

pub struct Scene {
    manager: BgManager,
}

impl Scene {
    /// Configure both planes, queue their graphics, and place the sprite. The queued transfers
    /// must be applied before the first frame.
    pub fn build(ppu: &mut Ppu, transfer: &mut QueuedTransfer) -> Self {
        ppu.write_register(DISPCNT, DISPCNT_OBJ_1D);
        ppu.write_register(DISPSTAT, DISPSTAT_VBLANK_HOOK);

        let mut manager = BgManager::new();
        manager.init_from_templates(
            0,
            &[
                BgTemplate {
                    bg: CHECKER_BG as u8,
                    char_base: 0,
                    map_base: 31,
                    screen_size: 0,
                    palette_mode: 0,
                    priority: 2,
                    base_tile: 0,
                },
                BgTemplate {
                    bg: PANEL_BG as u8,
                    char_base: 0,
                    map_base: 30,
                    screen_size: 0,
                    palette_mode: 0,
                    priority: 0,
                    base_tile: 0,
                },
            ],
        );
        manager.show(ppu, CHECKER_BG);
        manager.show(ppu, PANEL_BG);

        manager.load_palette(CHECKER_BG, &palette_bytes(&BG_PALETTE), 0, transfer);
        manager.load_tiles(CHECKER_BG, &bg_tiles(), 0, transfer);

        manager.set_tilemap_buffer(CHECKER_BG, TilemapBuffer::new(0x800));
        manager.fill_tilemap_buffer_rect(CHECKER_BG, 1, TileRect::new(0, 0, 32, 32), 0);
        manager.copy_tilemap_buffer_to_vram(CHECKER_BG, transfer);

        manager.set_tilemap_buffer(PANEL_BG, TilemapBuffer::new(0x800));
        manager.fill_tilemap_buffer_rect(PANEL_BG, 2, PANEL_RECT, 0);
        manager.copy_tilemap_buffer_to_vram(PANEL_BG, transfer);

        ppu.write_register(BLDCNT, PANEL_BLEND);
        ppu.write_register(BLDALPHA, PANEL_ALPHA);
        ppu.set_scanline_effect(ScanlineEffect::new(
            bghofs(PANEL_BG),
            EffectWidth::Halfword,
            panel_wave(),
        ));

        // 16x16 sprite using OBJ tiles 1-4
        let obj_tiles_start = ppu::OBJ_VRAM_START + TILE_BYTES as u32;
        ppu.write_vram_bytes(obj_tiles_start, &[0x11; 4 * TILE_BYTES]);
        ppu.write_palette_ram(2 * (ppu::OBJ_PALETTE_START as u32 + 1), 0x001F);
        ppu.set_sprite(0, &SpriteDescriptor::parse([0x0040, 0x4000 | 112, 0x0001]));

        log::info!("Demo scene configured; {} transfers queued", transfer.len());

        Self { manager }
    }

    /// Scroll the checkerboard and move the panel's highlight stripe every 32 frames.
    pub fn advance(&mut self, ppu: &mut Ppu, transfer: &mut QueuedTransfer, frame: u32) {
        self.manager.change_x(ppu, CHECKER_BG, 0x100, ScrollOp::Add);
        self.manager.change_y(ppu, CHECKER_BG, 0x80, ScrollOp::Add);

        if frame % 32 == 31 {
            if self.manager.is_transfer_busy_with_bg_copy(transfer) {
                log::debug!("Frame {frame}: background transfers still pending");
                return;
            }

            let stripe = TileRect { y: PANEL_RECT.y + (frame / 32 % 8) as u16, height: 1, ..PANEL_RECT };
            self.manager.fill_tilemap_buffer_rect(PANEL_BG, 2, PANEL_RECT, 0);
            self.manager.fill_tilemap_buffer_rect(PANEL_BG, 3, stripe, 0);
            if self.manager.copy_tilemap_buffer_to_vram(PANEL_BG, transfer).is_none() {
                log::warn!("Frame {frame}: transfer queue full, panel update dropped");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DemoHooks {
    pub transfer: QueuedTransfer,
}

impl FrameHooks for DemoHooks {
    fn draw_border(&mut self, frame: &mut FrameBuffer, viewport: Viewport) {
        let width = frame.size.width;
        for (i, pixel) in frame.pixels.iter_mut().enumerate() {
            let x = i as u32 % width;
            let y = i as u32 / width;
            if viewport.contains_native(x, y) {
                continue;
            }

            *pixel = if (x / 8 + y / 8) % 2 == 0 { BORDER_LIGHT } else { BORDER_DARK };
        }
    }

    fn on_vblank(&mut self, ppu: &mut Ppu) {
        self.transfer.apply(ppu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gba_raster::FrameAssembler;
    use raster_config::RasterConfig;
    use test_log::test;

    #[test]
    fn scene_renders_once_transfers_land() {
        let config = RasterConfig::default();
        let mut ppu = Ppu::new(&config);
        let mut hooks = DemoHooks::default();

        let _scene = Scene::build(&mut ppu, &mut hooks.transfer);
        assert_eq!(hooks.transfer.len(), 4);
        hooks.transfer.apply(&mut ppu);

        let mut assembler = FrameAssembler::new(&config);
        let frame = assembler.render_frame(&mut ppu, &mut hooks);

        // Checkerboard quarters
        assert_eq!(frame.pixel(0, 0), Some(0xCE73));
        assert_eq!(frame.pixel(4, 0), Some(0xAD6B));

        // Sprite in front of the panel
        assert_eq!(frame.pixel(112, 64), Some(0x801F));
        assert_eq!(frame.pixel(127, 79), Some(0x801F));
    }

    #[test]
    fn border_fills_only_outside_native_raster() {
        let config = RasterConfig {
            output_width: 256,
            output_height: 176,
            render_mode: raster_config::RenderMode::Letterboxed,
            border: true,
            ..RasterConfig::default()
        };
        let mut ppu = Ppu::new(&config);
        let mut hooks = DemoHooks::default();
        let mut assembler = FrameAssembler::new(&config);

        let frame = assembler.render_frame(&mut ppu, &mut hooks);
        assert_eq!(frame.pixel(0, 0), Some(BORDER_LIGHT));
        assert_eq!(frame.pixel(8, 0), Some(BORDER_DARK));
        assert_eq!(frame.pixel(8, 8), Some(0x8000));
    }
}
