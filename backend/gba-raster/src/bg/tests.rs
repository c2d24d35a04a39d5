use super::*;
use crate::ppu::registers::{BG3X_L, bgcnt};
use raster_config::RasterConfig;
use std::collections::HashSet;
use test_log::test;

#[derive(Debug, Default)]
struct FakeTransfer {
    requests: Vec<(Vec<u8>, TransferDestination)>,
    free_slots: HashSet<u8>,
    full: bool,
}

impl VramTransfer for FakeTransfer {
    fn request_copy(&mut self, request: TransferRequest<'_>) -> Option<u8> {
        if self.full {
            return None;
        }

        self.requests.push((request.source.to_vec(), request.destination));
        Some((self.requests.len() - 1) as u8)
    }

    fn has_space(&self, slot: u8) -> bool {
        self.free_slots.contains(&slot)
    }
}

impl FakeTransfer {
    fn destinations(&self) -> Vec<TransferDestination> {
        self.requests.iter().map(|(_, destination)| *destination).collect()
    }
}

/// Fills the destination with the first source byte, or fails on an empty stream
struct FakeDecompressor;

impl Decompressor for FakeDecompressor {
    fn decompress(
        &mut self,
        format: CompressionFormat,
        target: DecompressTarget,
        source: &[u8],
        dest: &mut [u8],
    ) -> Result<usize, DecompressError> {
        assert_eq!(format, CompressionFormat::Lz77);
        assert_eq!(target, DecompressTarget::Linear);

        let Some(&fill) = source.first() else {
            return Err(DecompressError::UnexpectedEnd { position: 0 });
        };
        let len = dest.len().min(4);
        dest[..len].fill(fill);
        Ok(len)
    }
}

fn new_ppu() -> Ppu {
    Ppu::new(&RasterConfig::default())
}

fn text_template(bg: u8, screen_size: u8) -> BgTemplate {
    BgTemplate {
        bg,
        char_base: 1,
        map_base: 2,
        screen_size,
        palette_mode: 0,
        priority: 1,
        base_tile: 4,
    }
}

#[test]
fn invalid_plane_returns_sentinels() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer::default();

    manager.configure(4, BgControlUpdate { priority: Some(1), ..BgControlUpdate::default() });
    assert_eq!(manager.config(4), None);
    assert_eq!(manager.get_attribute(4, BgAttribute::Priority), None);
    assert_eq!(manager.get_attribute(4, BgAttribute::Metric), None);
    assert_eq!(manager.attribute_by_id(4, 7), 0xFF);
    assert_eq!(manager.attribute_by_id(4, 9), 0xFFFF);
    assert_eq!(manager.change_x(&mut ppu, 4, 0x100, ScrollOp::Set), None);
    assert_eq!(manager.x(4), None);
    assert_eq!(manager.load_tiles(4, &[0; 32], 0, &mut transfer), None);
    assert_eq!(manager.load_palette(4, &[0; 32], 0, &mut transfer), None);
    assert!(transfer.requests.is_empty());
}

#[test]
fn invalid_plane_mutators_leave_state_untouched() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer::default();
    manager.init_from_templates(0, &[text_template(0, 0), text_template(1, 0)]);
    manager.show(&mut ppu, 0);
    let buffer = TilemapBuffer::new(0x800);
    manager.set_tilemap_buffer(0, buffer.clone());

    let snapshot = |manager: &BgManager, ppu: &Ppu| {
        let configs: Vec<_> = (0..4).map(|bg| manager.config(bg).copied()).collect();
        let positions: Vec<_> = (0..4).map(|bg| (manager.x(bg), manager.y(bg))).collect();
        let registers: Vec<_> = (0..4).map(|bg| ppu.read_register(bgcnt(bg))).collect();
        let render_states: Vec<_> = (0..4).map(|bg| ppu.render_bg_state(bg)).collect();
        (
            manager.display_word(),
            manager.mode(),
            configs,
            positions,
            ppu.read_register(DISPCNT),
            registers,
            render_states,
        )
    };
    let before = snapshot(&manager, &ppu);
    let buffer_before = buffer.to_vec();

    for bg in [4, 5, usize::MAX] {
        manager.configure(bg, BgControlUpdate { priority: Some(3), ..BgControlUpdate::default() });
        manager.set_attribute(bg, BgAttribute::CharBase, 2);
        manager.set_attribute_by_id(bg, 0, 2);
        manager.show(&mut ppu, bg);
        manager.hide(&mut ppu, bg);
        manager.reset_plane(bg);
        manager.set_tilemap_buffer(bg, TilemapBuffer::new(0x800));
        manager.unset_tilemap_buffer(bg);

        assert_eq!(manager.change_x(&mut ppu, bg, 0x100, ScrollOp::Add), None);
        assert_eq!(manager.change_y(&mut ppu, bg, 0x100, ScrollOp::Sub), None);
        assert_eq!(manager.change_y_screen_off(&mut ppu, bg, 0x100, ScrollOp::Set), None);
        assert_eq!(manager.load_tiles(bg, &[1; 32], 0, &mut transfer), None);
        assert_eq!(manager.load_tilemap(bg, &[1; 2], 0, &mut transfer), None);
        assert_eq!(
            manager.load_bg_vram(bg, &[1; 2], 0, VramRegion::Tiles, &mut transfer),
            None
        );
        assert_eq!(manager.copy_tilemap_buffer_to_vram(bg, &mut transfer), None);

        manager
            .copy_to_tilemap_buffer(bg, &[1; 4], TilemapCopy::Raw(4), 0, &mut FakeDecompressor)
            .unwrap();
        manager.copy_to_tilemap_buffer_rect(bg, &[1; 4], TileRect::new(0, 0, 2, 1));
        manager.copy_to_tilemap_buffer_rect_change_palette(
            bg,
            &[1; 4],
            TileRect::new(0, 0, 2, 1),
            1,
        );
        manager.copy_rect_to_tilemap_buffer_rect(
            bg,
            &[1; 4],
            TileRect::new(0, 0, 2, 1),
            2,
            TileRect::new(0, 0, 2, 1),
            1,
            1,
        );
        manager.fill_tilemap_buffer_rect(bg, 1, TileRect::new(0, 0, 2, 2), 1);
        manager.fill_tilemap_buffer_rect_palette0(bg, 1, TileRect::new(0, 0, 2, 2));
        manager.write_sequence_to_tilemap_buffer(bg, 1, TileRect::new(0, 0, 2, 2), 1, 1);

        ppu.set_bg_hidden(bg, true);
        ppu.set_bg_gba_compat(bg, false);
        ppu.set_bg_map_dimensions(bg, Some((128, 128)));
        assert_eq!(ppu.render_bg_state(bg), None);
    }

    assert_eq!(snapshot(&manager, &ppu), before);
    assert_eq!(buffer.to_vec(), buffer_before);
    assert!(manager.tilemap_buffer(0).is_some_and(|attached| attached.ptr_eq(&buffer)));
    assert!(transfer.requests.is_empty());
    assert!(manager.dma_busy().is_empty());
}

#[test]
fn hidden_plane_rejects_queries() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer::default();

    assert_eq!(manager.get_attribute(0, BgAttribute::CharBase), None);
    assert_eq!(manager.attribute_by_id(0, 1), 0xFF);
    assert_eq!(manager.change_y(&mut ppu, 0, 5, ScrollOp::Add), None);
    assert_eq!(manager.y(0), None);
    assert_eq!(manager.load_tilemap(0, &[0; 2], 0, &mut transfer), None);

    manager.set_tilemap_buffer(0, TilemapBuffer::new(0x800));
    assert!(manager.tilemap_buffer(0).is_none());
}

#[test]
fn unchanged_update_only_sets_visibility() {
    let mut manager = BgManager::new();
    manager.init_from_template(&text_template(1, 3));
    let before = *manager.config(1).unwrap();

    manager.configure(1, BgControlUpdate::default());
    assert_eq!(manager.config(1), Some(&before));

    let mut hidden = BgManager::new();
    hidden.configure(2, BgControlUpdate::default());
    assert_eq!(hidden.config(2), Some(&BgConfig { visible: true, ..BgConfig::default() }));
}

#[test]
fn configure_masks_fields() {
    let mut manager = BgManager::new();
    manager.configure(
        0,
        BgControlUpdate {
            char_base: Some(0xFF),
            map_base: Some(0xFF),
            screen_size: Some(0xFF),
            palette_mode: Some(0xFF),
            priority: Some(0xFF),
            mosaic: Some(0xFF),
            wraparound: Some(0xFF),
        },
    );

    assert_eq!(
        manager.config(0),
        Some(&BgConfig {
            visible: true,
            char_base: 3,
            map_base: 0x1F,
            screen_size: 3,
            palette_mode: 1,
            priority: 3,
            mosaic: 1,
            wraparound: 1,
        })
    );
}

#[test]
fn show_and_hide_sync_display_registers() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    manager.configure(
        1,
        BgControlUpdate {
            char_base: Some(2),
            map_base: Some(0x1F),
            screen_size: Some(3),
            palette_mode: Some(1),
            priority: Some(2),
            mosaic: Some(1),
            wraparound: Some(1),
        },
    );

    // Unrelated DISPCNT bits survive the sync
    ppu.write_register(DISPCNT, 0x1000);
    manager.show(&mut ppu, 1);

    assert_eq!(ppu.read_register(bgcnt(1)), 0xFFCA);
    assert_eq!(ppu.read_register(DISPCNT), 0x1200);
    assert!(manager.is_shown(1));

    manager.hide(&mut ppu, 1);
    assert_eq!(ppu.read_register(DISPCNT), 0x1000);
    assert!(!manager.is_shown(1));
}

#[test]
fn mode_reaches_dispcnt_on_next_sync() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    manager.init_from_templates(1, &[text_template(2, 0)]);
    assert_eq!(manager.mode(), 1);
    assert_eq!(ppu.read_register(DISPCNT) & 7, 0);

    manager.show(&mut ppu, 2);
    assert_eq!(ppu.read_register(DISPCNT) & DISPCNT_MODE_AND_BG_BITS, 0x0401);

    manager.reset_all(&mut ppu);
    assert_eq!(ppu.read_register(DISPCNT) & DISPCNT_MODE_AND_BG_BITS, 0);
    assert_eq!(manager.mode(), 0);
    assert_eq!(manager.config(2), None);
}

#[test]
fn templates_skip_invalid_planes() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 1), text_template(7, 0)]);

    assert!(manager.config(0).is_some());
    assert_eq!(manager.get_attribute(0, BgAttribute::BaseTile), Some(4));
    assert_eq!(manager.get_attribute(0, BgAttribute::ScreenSize), Some(1));
    assert_eq!(manager.get_attribute(0, BgAttribute::Mosaic), Some(0));
    assert!(manager.config(1).is_none());
}

#[test]
fn scroll_set_add_sub_round_trip() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 0), text_template(2, 0)]);

    assert_eq!(manager.change_x(&mut ppu, 0, 0x1234, ScrollOp::Set), Some(0x1234));
    assert_eq!(manager.x(0), Some(0x1234));
    assert_eq!(ppu.registers().bg_h_scroll[0], 0x12);

    manager.change_x(&mut ppu, 0, 0x800, ScrollOp::Add);
    assert_eq!(ppu.registers().bg_h_scroll[0], 0x1A);
    assert_eq!(manager.change_x(&mut ppu, 0, 0x800, ScrollOp::Sub), Some(0x1234));

    // Text mode BG2 uses the offset registers too
    manager.change_y(&mut ppu, 2, -0x300, ScrollOp::Set);
    assert_eq!(manager.y(2), Some(-0x300));
    assert_eq!(ppu.registers().bg_v_scroll[2], 0xFFFD);

    // Unknown opcodes set
    assert_eq!(manager.change_y(&mut ppu, 2, 7, ScrollOp::from_id(9)), Some(7));
}

#[test]
fn affine_scroll_writes_reference_point() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    manager.init_from_templates(2, &[text_template(2, 0), text_template(3, 0)]);

    manager.change_x(&mut ppu, 2, 0x0001_2300, ScrollOp::Set);
    manager.change_y(&mut ppu, 3, -0x100, ScrollOp::Set);

    assert_eq!(ppu.registers().bg_affine_parameters[0].reference_x, 0x0001_2300);
    assert_eq!(ppu.registers().bg_affine_parameters[1].reference_y, -0x100);
    assert_eq!(ppu.registers().bg_h_scroll[2], 0);
}

#[test]
fn mode_1_bg3_scroll_only_stores_position() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    manager.init_from_templates(1, &[text_template(3, 0)]);

    assert_eq!(manager.change_x(&mut ppu, 3, 0x4400, ScrollOp::Set), Some(0x4400));
    assert_eq!(ppu.registers().bg_h_scroll[3], 0);
    assert_eq!(ppu.registers().bg_affine_parameters[1].reference_x, 0);
    assert_eq!(ppu.read_register(BG3X_L), 0);
}

#[test]
fn screen_off_scroll_is_deferred_to_vblank() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(1, 0)]);

    manager.change_y_screen_off(&mut ppu, 1, 0x2000, ScrollOp::Set);
    assert_eq!(ppu.pending_register_writes(), 1);
    assert_eq!(ppu.registers().bg_v_scroll[1], 0);

    ppu.enter_vblank();
    assert_eq!(ppu.pending_register_writes(), 0);
    assert_eq!(ppu.registers().bg_v_scroll[1], 0x20);

    // Applied immediately while forced blanking
    ppu.write_register(DISPCNT, 0x0080);
    manager.change_y_screen_off(&mut ppu, 1, 0x100, ScrollOp::Add);
    assert_eq!(ppu.registers().bg_v_scroll[1], 0x21);
}

#[test]
fn load_offsets_follow_plane_bases() {
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer::default();
    manager.init_from_templates(0, &[text_template(0, 0), text_template(1, 0)]);
    manager.set_attribute(1, BgAttribute::PaletteMode, 1);

    assert_eq!(manager.load_tiles(0, &[1; 32], 2, &mut transfer), Some(0));
    assert_eq!(manager.load_tiles(1, &[1; 64], 2, &mut transfer), Some(1));
    assert_eq!(manager.load_tilemap(0, &[1; 2], 3, &mut transfer), Some(2));
    assert_eq!(manager.load_palette(0, &[1; 2], 4, &mut transfer), Some(3));

    assert_eq!(
        transfer.destinations(),
        vec![
            TransferDestination::BgVram(0x4000 + 6 * 0x20),
            TransferDestination::BgVram(0x4000 + 6 * 0x40),
            TransferDestination::BgVram(0x1000 + 6),
            TransferDestination::BgPalette(8),
        ]
    );
    assert_eq!(transfer.requests[1].0.len(), 64);
    for slot in 0..4 {
        assert!(manager.dma_busy().is_marked(slot));
    }
}

#[test]
fn raw_vram_load_is_untracked_and_wraps() {
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer::default();
    manager.configure(0, BgControlUpdate { char_base: Some(3), ..BgControlUpdate::default() });

    assert_eq!(manager.load_bg_vram(0, &[0; 4], 0x5000, VramRegion::Tiles, &mut transfer), Some(0));
    assert_eq!(transfer.destinations(), vec![TransferDestination::BgVram(0x1000)]);
    assert!(manager.dma_busy().is_empty());
}

#[test]
fn full_transfer_queue_is_reported() {
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer { full: true, ..FakeTransfer::default() };
    manager.init_from_templates(0, &[text_template(0, 0)]);

    assert_eq!(manager.load_tiles(0, &[0; 32], 0, &mut transfer), None);
    assert!(manager.dma_busy().is_empty());
}

#[test]
fn busy_polling_reclaims_finished_slots() {
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer::default();
    manager.init_from_templates(0, &[text_template(0, 0)]);

    manager.load_tiles(0, &[0; 32], 0, &mut transfer);
    manager.load_tilemap(0, &[0; 2], 0, &mut transfer);

    transfer.free_slots.insert(0);
    assert!(manager.is_transfer_busy_with_bg_copy(&transfer));
    assert!(!manager.dma_busy().is_marked(0));
    assert!(manager.dma_busy().is_marked(1));

    transfer.free_slots.insert(1);
    assert!(!manager.is_transfer_busy_with_bg_copy(&transfer));
    assert!(manager.dma_busy().is_empty());

    let mut ppu = new_ppu();
    manager.load_tiles(0, &[0; 32], 0, &mut transfer);
    manager.reset_all_and_clear_dma_busy(&mut ppu);
    assert!(manager.dma_busy().is_empty());
}

#[test]
fn derived_attributes() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 3)]);
    assert_eq!(manager.get_attribute(0, BgAttribute::Metric), Some(0x2000));
    assert_eq!(manager.get_attribute(0, BgAttribute::Type), Some(0));

    manager.init_from_templates(2, &[text_template(2, 1)]);
    assert_eq!(manager.get_attribute(2, BgAttribute::Metric), Some(0x400));
    assert_eq!(manager.get_attribute(2, BgAttribute::Type), Some(1));
    assert_eq!(manager.attribute_by_id(2, 8), 0x400);

    // BG0 is not available in mode 2
    assert_eq!(manager.attribute_by_id(0, 9), 0xFFFF);
    assert_eq!(manager.get_attribute(0, BgAttribute::Metric), Some(0));
    assert_eq!(manager.attribute_by_id(2, 11), 0xFFFF);
}

#[test]
fn attributes_by_id() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(3, 0)]);

    manager.set_attribute_by_id(3, 7, 2);
    manager.set_attribute_by_id(3, 2, 0x21);
    manager.set_attribute_by_id(3, 10, 99);

    assert_eq!(manager.attribute_by_id(3, 7), 2);
    assert_eq!(manager.attribute_by_id(3, 2), 1);
    assert_eq!(manager.attribute_by_id(3, 1), 1);
    assert_eq!(manager.attribute_by_id(3, 10), 4);
}

#[test]
fn mosaic_adjustments_preserve_obj_bits() {
    let mut ppu = new_ppu();
    let manager = BgManager::new();
    ppu.write_register(MOSAIC, 0x5A00);

    assert_eq!(manager.adjust_mosaic(&mut ppu, 0x32, MosaicOp::SetBoth), 0x32);
    assert_eq!(manager.adjust_mosaic(&mut ppu, 0x0F, MosaicOp::AddH), 0x3F);
    assert_eq!(manager.adjust_mosaic(&mut ppu, 5, MosaicOp::SubV), 0x0F);
    assert_eq!(manager.adjust_mosaic(&mut ppu, 3, MosaicOp::SubH), 0x0C);
    assert_eq!(manager.adjust_mosaic(&mut ppu, 0x17, MosaicOp::SetV), 0x7C);
    assert_eq!(manager.adjust_mosaic(&mut ppu, 0x0C, MosaicOp::AddV), 0xFC);
    assert_eq!(manager.adjust_mosaic(&mut ppu, 0x09, MosaicOp::SetH), 0xF9);
    assert_eq!(ppu.read_register(MOSAIC), 0x5AF9);
    assert_eq!(MosaicOp::from_id(42), MosaicOp::SetBoth);
}

#[test]
fn set_affine_requires_affine_plane() {
    let mut ppu = new_ppu();
    let mut manager = BgManager::new();
    let source = BgAffineSource {
        tex_x: 128 << 8,
        tex_y: 128 << 8,
        screen_x: 120,
        screen_y: 80,
        x_scale: 0x100,
        y_scale: 0x100,
        rotation: 0x4000,
    };

    manager.init_from_templates(0, &[text_template(2, 0)]);
    manager.set_affine(&mut ppu, 2, &source);
    assert_eq!(ppu.read_register(BG2PA), 0x100);
    assert_eq!(ppu.read_register(BG2PB), 0);

    manager.set_mode(1);
    manager.set_affine(&mut ppu, 2, &source);
    let expected = affine::bg_affine_set(&source);
    let params = ppu.registers().bg_affine_parameters[0];
    assert_eq!(
        (params.a, params.b, params.c, params.d),
        (
            i32::from(expected.pa),
            i32::from(expected.pb),
            i32::from(expected.pc),
            i32::from(expected.pd)
        )
    );
    assert_eq!((params.reference_x, params.reference_y), (expected.start_x, expected.start_y));
}

#[test]
fn tilemap_buffer_copies() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 0)]);

    let buffer = TilemapBuffer::new(16);
    manager.set_tilemap_buffer(0, buffer.clone());
    assert!(manager.tilemap_buffer(0).is_some_and(|attached| attached.ptr_eq(&buffer)));

    manager
        .copy_to_tilemap_buffer(0, &[1, 2, 3, 4, 5], TilemapCopy::Raw(4), 1, &mut FakeDecompressor)
        .unwrap();
    assert_eq!(buffer.to_vec()[..8], [0, 0, 1, 2, 3, 4, 0, 0]);

    // Truncated at the end of the buffer
    manager
        .copy_to_tilemap_buffer(0, &[9; 8], TilemapCopy::Raw(8), 6, &mut FakeDecompressor)
        .unwrap();
    assert_eq!(buffer.to_vec()[12..], [9, 9, 9, 9]);

    manager
        .copy_to_tilemap_buffer(0, &[7], TilemapCopy::Decompress, 0, &mut FakeDecompressor)
        .unwrap();
    assert_eq!(buffer.to_vec()[..4], [7, 7, 7, 7]);

    let result =
        manager.copy_to_tilemap_buffer(0, &[], TilemapCopy::Decompress, 0, &mut FakeDecompressor);
    assert!(matches!(result, Err(DecompressError::UnexpectedEnd { position: 0 })));

    manager.unset_tilemap_buffer(0);
    assert!(manager.tilemap_buffer(0).is_none());
}

#[test]
fn tilemap_buffer_upload_size() {
    let mut manager = BgManager::new();
    let mut transfer = FakeTransfer::default();
    manager.init_from_templates(0, &[text_template(0, 1)]);

    assert_eq!(manager.copy_tilemap_buffer_to_vram(0, &mut transfer), None);

    manager.set_tilemap_buffer(0, TilemapBuffer::new(0x2000));
    assert_eq!(manager.copy_tilemap_buffer_to_vram(0, &mut transfer), Some(0));
    assert_eq!(transfer.requests[0].0.len(), 0x1000);
    assert_eq!(transfer.destinations(), vec![TransferDestination::BgVram(0x1000)]);
    assert!(manager.dma_busy().is_empty());
}

#[test]
fn write_sequence_steps_tile_numbers() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 0)]);
    let buffer = TilemapBuffer::new(0x800);
    manager.set_tilemap_buffer(0, buffer.clone());

    // Wraps horizontally within a single screen
    manager.write_sequence_to_tilemap_buffer(0, 0x0010, TileRect::new(30, 0, 4, 1), 2, 1);
    assert_eq!(buffer.read_u16(30), Some(0x2010));
    assert_eq!(buffer.read_u16(31), Some(0x2011));
    assert_eq!(buffer.read_u16(0), Some(0x2012));
    assert_eq!(buffer.read_u16(1), Some(0x2013));

    // Tile number increments wrap inside the low 10 bits
    manager.write_sequence_to_tilemap_buffer(0, 0x0BFF, TileRect::new(0, 1, 2, 1), 0xFF, 1);
    assert_eq!(buffer.read_u16(32), Some(0x0BFF));
    assert_eq!(buffer.read_u16(33), Some(0x0800));

    manager.fill_tilemap_buffer_rect(0, 0x0005, TileRect::new(4, 4, 2, 2), 1);
    for index in [4 * 32 + 4, 4 * 32 + 5, 5 * 32 + 4, 5 * 32 + 5] {
        assert_eq!(buffer.read_u16(index), Some(0x1005));
    }
}

#[test]
fn rects_near_coordinate_limit_wrap() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 0)]);
    let buffer = TilemapBuffer::new(0x800);
    manager.set_tilemap_buffer(0, buffer.clone());

    // Rows 65530..=65535 then 0..=3, masked into the 32-row screen
    manager.fill_tilemap_buffer_rect(0, 1, TileRect::new(0, 65530, 1, 10), 0);
    for row in (26..32).chain(0..4) {
        assert_eq!(buffer.read_u16(row * 32), Some(1), "row {row}");
    }
    assert_eq!(buffer.read_u16(4 * 32), Some(0));
    assert_eq!(buffer.read_u16(25 * 32), Some(0));

    // Raw fills past the end of the buffer are dropped
    manager.fill_tilemap_buffer_rect_palette0(0, 2, TileRect::new(65535, 65535, 2, 2));
    assert_eq!(buffer.read_u16(0), Some(2));
    assert_eq!(buffer.read_u16(1), Some(0));

    // Source column 65535 falls outside the source map and is skipped
    let src: Vec<u8> = [7u16, 8].iter().flat_map(|entry| entry.to_le_bytes()).collect();
    manager.copy_rect_to_tilemap_buffer_rect(
        0,
        &src,
        TileRect::new(u16::MAX, 0, 2, 1),
        2,
        TileRect::new(u16::MAX, 10, 2, 1),
        0,
        0,
    );
    assert_eq!(buffer.read_u16(10 * 32 + 31), Some(0));
    assert_eq!(buffer.read_u16(10 * 32), Some(7));
}

#[test]
fn rect_copy_resolves_screen_blocks() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 1)]);
    let buffer = TilemapBuffer::new(0x1000);
    manager.set_tilemap_buffer(0, buffer.clone());

    let src = [0x01, 0x00, 0x02, 0x0C];
    manager.copy_to_tilemap_buffer_rect_change_palette(0, &src, TileRect::new(31, 0, 2, 1), 3);
    assert_eq!(buffer.read_u16(31), Some(0x3001));
    assert_eq!(buffer.read_u16(0x400), Some(0x3C02));

    // The raw rect copy does not resolve screen blocks
    manager.copy_to_tilemap_buffer_rect(0, &src, TileRect::new(31, 0, 2, 1));
    assert_eq!(buffer.read_u16(31), Some(0x0001));
    assert_eq!(buffer.read_u16(32), Some(0x0C02));
}

#[test]
fn rect_copy_from_source_sub_rect() {
    let mut manager = BgManager::new();
    manager.init_from_templates(0, &[text_template(0, 0)]);
    let buffer = TilemapBuffer::new(0x800);
    manager.set_tilemap_buffer(0, buffer.clone());

    // 3x2 source map; copy its right column
    let src: Vec<u8> = (1..=6u16).flat_map(u16::to_le_bytes).collect();
    manager.copy_rect_to_tilemap_buffer_rect(
        0,
        &src,
        TileRect::new(2, 0, 1, 2),
        3,
        TileRect::new(10, 10, 1, 2),
        0xFF,
        0x10,
    );
    assert_eq!(buffer.read_u16(10 * 32 + 10), Some(0x0013));
    assert_eq!(buffer.read_u16(11 * 32 + 10), Some(0x0016));
}

#[test]
fn affine_buffer_writes_bytes() {
    let mut manager = BgManager::new();
    manager.init_from_templates(2, &[text_template(2, 0)]);
    let buffer = TilemapBuffer::new(0x100);
    manager.set_tilemap_buffer(2, buffer.clone());

    manager.fill_tilemap_buffer_rect_palette0(2, 0x1234, TileRect::new(1, 1, 2, 1));
    assert_eq!(buffer.read_u8(17), Some(0x34));
    assert_eq!(buffer.read_u8(18), Some(0x34));

    manager.write_sequence_to_tilemap_buffer(2, 0x0020, TileRect::new(0, 2, 3, 1), 0, 2);
    assert_eq!(buffer.to_vec()[32..35], [0x20, 0x22, 0x24]);

    manager.copy_to_tilemap_buffer_rect_change_palette(2, &[1, 2], TileRect::new(0, 3, 2, 1), 0x10);
    assert_eq!(buffer.to_vec()[48..50], [0x11, 0x12]);
}
