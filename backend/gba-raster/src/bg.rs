//! Background plane state manager: the game-facing layer that owns plane configuration, scroll
//! positions, and off-screen tilemap buffers, and mirrors them into the display registers

mod dma;
mod tilemap;

pub use dma::{DmaBusyTracker, MAX_TRACKED_SLOTS};
pub use tilemap::{
    AffineMetric, TextMetric, TilemapBuffer, affine_metric, copy_tile_map_entry,
    tile_map_index_from_coords, text_metric,
};

use crate::affine::{self, BgAffineSource};
use crate::ppu::Ppu;
use crate::ppu::registers::{
    BG2PA, BG2PB, BG2PC, BG2PD, BG2X_H, BG2X_L, BG2Y_H, BG2Y_L, BG3X_H, BG3X_L, BG3Y_H, BG3Y_L,
    DISPCNT, DISPCNT_MODE_AND_BG_BITS, MOSAIC, bgcnt, bghofs, bgvofs,
};
use crate::transfer::{
    CompressionFormat, DecompressError, DecompressTarget, Decompressor, TransferDestination,
    TransferRequest, VramTransfer,
};
use std::cmp;

pub const NUM_BGS: usize = 4;

const CHAR_BLOCK_BYTES: u16 = 0x4000;
const SCREEN_BLOCK_BYTES: u16 = 0x800;

// Tile number bits of a map entry; the rest are flip and palette bits
const TILE_NUMBER_MASK: u16 = 0x03FF;

/// Per-plane control configuration. Every field is masked to its register width on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BgConfig {
    pub visible: bool,
    pub char_base: u8,
    pub map_base: u8,
    pub screen_size: u8,
    pub palette_mode: u8,
    pub priority: u8,
    pub mosaic: u8,
    pub wraparound: u8,
}

impl BgConfig {
    fn control_word(&self) -> u16 {
        u16::from(self.priority)
            | (u16::from(self.char_base) << 2)
            | (u16::from(self.mosaic) << 6)
            | (u16::from(self.palette_mode) << 7)
            | (u16::from(self.map_base) << 8)
            | (u16::from(self.wraparound) << 13)
            | (u16::from(self.screen_size) << 14)
    }
}

#[derive(Debug, Clone, Default)]
struct BgExtendedState {
    base_tile: u16,
    base_palette: u16,
    tilemap: Option<TilemapBuffer>,
    x: i32,
    y: i32,
}

/// Partial control update; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BgControlUpdate {
    pub char_base: Option<u8>,
    pub map_base: Option<u8>,
    pub screen_size: Option<u8>,
    pub palette_mode: Option<u8>,
    pub priority: Option<u8>,
    pub mosaic: Option<u8>,
    pub wraparound: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BgTemplate {
    pub bg: u8,
    pub char_base: u8,
    pub map_base: u8,
    pub screen_size: u8,
    pub palette_mode: u8,
    pub priority: u8,
    pub base_tile: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgAttribute {
    CharBase,
    MapBase,
    ScreenSize,
    PaletteMode,
    Mosaic,
    Wraparound,
    Priority,
    /// Map size in bytes
    Metric,
    Type,
    BaseTile,
}

impl BgAttribute {
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::CharBase),
            2 => Some(Self::MapBase),
            3 => Some(Self::ScreenSize),
            4 => Some(Self::PaletteMode),
            5 => Some(Self::Mosaic),
            6 => Some(Self::Wraparound),
            7 => Some(Self::Priority),
            8 => Some(Self::Metric),
            9 => Some(Self::Type),
            10 => Some(Self::BaseTile),
            _ => None,
        }
    }

    fn is_control(self) -> bool {
        !matches!(self, Self::Metric | Self::Type | Self::BaseTile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgType {
    Text,
    Affine,
}

impl BgType {
    #[must_use]
    pub fn to_bits(self) -> u16 {
        match self {
            Self::Text => 0,
            Self::Affine => 1,
        }
    }
}

/// Whether a plane uses text or affine addressing in the given mode; `None` if the plane is not
/// available in that mode
#[must_use]
pub fn plane_type(bg: usize, mode: u8) -> Option<BgType> {
    match (bg, mode) {
        (0 | 1, 0 | 1) | (2 | 3, 0) => Some(BgType::Text),
        (2, 1 | 2) | (3, 2) => Some(BgType::Affine),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOp {
    Set,
    Add,
    Sub,
}

impl ScrollOp {
    /// Unknown opcodes behave as `Set`
    #[must_use]
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::Add,
            2 => Self::Sub,
            _ => Self::Set,
        }
    }

    fn apply(self, current: i32, value: i32) -> i32 {
        match self {
            Self::Set => value,
            Self::Add => current.wrapping_add(value),
            Self::Sub => current.wrapping_sub(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosaicOp {
    SetBoth,
    SetH,
    AddH,
    SubH,
    SetV,
    AddV,
    SubV,
}

impl MosaicOp {
    /// Unknown opcodes behave as `SetBoth`
    #[must_use]
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Self::SetH,
            2 => Self::AddH,
            3 => Self::SubH,
            4 => Self::SetV,
            5 => Self::AddV,
            6 => Self::SubV,
            _ => Self::SetBoth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VramRegion {
    Tiles,
    Tilemap,
}

/// How `copy_to_tilemap_buffer` interprets its source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilemapCopy {
    /// Copy this many bytes verbatim
    Raw(usize),
    Decompress,
}

/// Rectangle in tile units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl TileRect {
    #[must_use]
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    // Row-major tile coordinates; both axes wrap at 16 bits
    fn coords(self) -> impl Iterator<Item = (u16, u16)> {
        (0..self.height).flat_map(move |dy| {
            (0..self.width).map(move |dx| (self.x.wrapping_add(dx), self.y.wrapping_add(dy)))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegisterPath {
    Immediate,
    ForcedBlank,
}

#[derive(Debug, Clone, Default)]
pub struct BgManager {
    configs: [BgConfig; NUM_BGS],
    extended: [BgExtendedState; NUM_BGS],
    // Bits 0-2: mode, bits 8-11: BG visibility; mirrors DISPCNT
    display_word: u16,
    dma_busy: DmaBusyTracker,
}

impl BgManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_configs(&mut self) {
        self.configs = [BgConfig::default(); NUM_BGS];
    }

    /// Zero every plane configuration, select mode 0, and hide all planes in DISPCNT.
    pub fn reset_all(&mut self, ppu: &mut Ppu) {
        self.reset_configs();
        self.display_word = 0;

        let dispcnt = ppu.read_register(DISPCNT);
        ppu.write_register(DISPCNT, dispcnt & !DISPCNT_MODE_AND_BG_BITS);
    }

    pub fn reset_all_and_clear_dma_busy(&mut self, ppu: &mut Ppu) {
        self.reset_all(ppu);
        self.dma_busy.clear();
    }

    pub fn reset_plane(&mut self, bg: usize) {
        if let Some(config) = self.configs.get_mut(bg) {
            *config = BgConfig::default();
        }
    }

    /// Set the mode in the mirrored word. DISPCNT picks it up on the next show/hide.
    pub fn set_mode(&mut self, mode: u8) {
        self.display_word = (self.display_word & 0xFFF8) | u16::from(mode & 7);
    }

    #[must_use]
    pub fn mode(&self) -> u8 {
        (self.display_word & 7) as u8
    }

    #[must_use]
    pub fn display_word(&self) -> u16 {
        self.display_word
    }

    #[must_use]
    pub fn dma_busy(&self) -> &DmaBusyTracker {
        &self.dma_busy
    }

    fn apply_template(&mut self, template: &BgTemplate) {
        let bg = usize::from(template.bg);
        if bg >= NUM_BGS {
            log::warn!("Skipping BG template for invalid BG {bg}");
            return;
        }

        self.configure(
            bg,
            BgControlUpdate {
                char_base: Some(template.char_base),
                map_base: Some(template.map_base),
                screen_size: Some(template.screen_size),
                palette_mode: Some(template.palette_mode),
                priority: Some(template.priority),
                mosaic: Some(0),
                wraparound: Some(0),
            },
        );

        self.extended[bg] = BgExtendedState { base_tile: template.base_tile, ..BgExtendedState::default() };
    }

    pub fn init_from_templates(&mut self, mode: u8, templates: &[BgTemplate]) {
        self.set_mode(mode);
        self.reset_configs();

        for template in templates {
            self.apply_template(template);
        }
    }

    pub fn init_from_template(&mut self, template: &BgTemplate) {
        self.apply_template(template);
    }

    /// Apply a partial control update to a plane and mark it visible. Ignored for invalid planes.
    pub fn configure(&mut self, bg: usize, update: BgControlUpdate) {
        let Some(config) = self.configs.get_mut(bg) else {
            log::warn!("Ignoring control update for invalid BG {bg}");
            return;
        };

        if let Some(char_base) = update.char_base {
            config.char_base = char_base & 3;
        }
        if let Some(map_base) = update.map_base {
            config.map_base = map_base & 0x1F;
        }
        if let Some(screen_size) = update.screen_size {
            config.screen_size = screen_size & 3;
        }
        if let Some(palette_mode) = update.palette_mode {
            config.palette_mode = palette_mode & 1;
        }
        if let Some(priority) = update.priority {
            config.priority = priority & 3;
        }
        if let Some(mosaic) = update.mosaic {
            config.mosaic = mosaic & 1;
        }
        if let Some(wraparound) = update.wraparound {
            config.wraparound = wraparound & 1;
        }

        config.visible = true;

        log::debug!("BG{bg} configured: {config:?}");
    }

    /// Configuration of a valid, visible plane
    #[must_use]
    pub fn config(&self, bg: usize) -> Option<&BgConfig> {
        self.configs.get(bg).filter(|config| config.visible)
    }

    fn visible_extended(&self, bg: usize) -> Option<&BgExtendedState> {
        self.config(bg)?;
        self.extended.get(bg)
    }

    /// Plane addressing type under the current mode
    #[must_use]
    pub fn plane_type(&self, bg: usize) -> Option<BgType> {
        plane_type(bg, self.mode())
    }

    pub fn set_attribute(&mut self, bg: usize, attribute: BgAttribute, value: u8) {
        let update = match attribute {
            BgAttribute::CharBase => BgControlUpdate { char_base: Some(value), ..Default::default() },
            BgAttribute::MapBase => BgControlUpdate { map_base: Some(value), ..Default::default() },
            BgAttribute::ScreenSize => {
                BgControlUpdate { screen_size: Some(value), ..Default::default() }
            }
            BgAttribute::PaletteMode => {
                BgControlUpdate { palette_mode: Some(value), ..Default::default() }
            }
            BgAttribute::Mosaic => BgControlUpdate { mosaic: Some(value), ..Default::default() },
            BgAttribute::Wraparound => {
                BgControlUpdate { wraparound: Some(value), ..Default::default() }
            }
            BgAttribute::Priority => BgControlUpdate { priority: Some(value), ..Default::default() },
            BgAttribute::Metric | BgAttribute::Type | BgAttribute::BaseTile => {
                log::warn!("Attribute {attribute:?} is read-only");
                return;
            }
        };

        self.configure(bg, update);
    }

    /// Read an attribute. Control attributes are `None` for hidden planes; every attribute is
    /// `None` for invalid planes and `Type` is `None` when the plane is unavailable in this mode.
    #[must_use]
    pub fn get_attribute(&self, bg: usize, attribute: BgAttribute) -> Option<u16> {
        if bg >= NUM_BGS {
            return None;
        }

        match attribute {
            BgAttribute::Metric => Some(self.map_size_bytes(bg)),
            BgAttribute::Type => self.plane_type(bg).map(BgType::to_bits),
            BgAttribute::BaseTile => Some(self.extended[bg].base_tile),
            _ => {
                let config = self.config(bg)?;
                let value = match attribute {
                    BgAttribute::CharBase => config.char_base,
                    BgAttribute::MapBase => config.map_base,
                    BgAttribute::ScreenSize => config.screen_size,
                    BgAttribute::PaletteMode => config.palette_mode,
                    BgAttribute::Mosaic => config.mosaic,
                    BgAttribute::Wraparound => config.wraparound,
                    BgAttribute::Priority => config.priority,
                    BgAttribute::Metric | BgAttribute::Type | BgAttribute::BaseTile => {
                        unreachable!("non-control attributes handled above")
                    }
                };
                Some(value.into())
            }
        }
    }

    /// Scripting surface over numeric attribute IDs: unknown IDs read 0xFFFF, control
    /// attributes of invalid or hidden planes read 0xFF, other failed reads 0xFFFF.
    #[must_use]
    pub fn attribute_by_id(&self, bg: usize, id: u8) -> u16 {
        let Some(attribute) = BgAttribute::from_id(id) else { return 0xFFFF };

        match self.get_attribute(bg, attribute) {
            Some(value) => value,
            None if attribute.is_control() => 0xFF,
            None => 0xFFFF,
        }
    }

    pub fn set_attribute_by_id(&mut self, bg: usize, id: u8, value: u8) {
        match BgAttribute::from_id(id) {
            Some(attribute) => self.set_attribute(bg, attribute, value),
            None => log::warn!("Ignoring write to unknown BG attribute {id}"),
        }
    }

    // Text: number of screens * 0x800, affine: map bytes. 0 for hidden planes and planes the
    // current mode does not display
    fn map_size_bytes(&self, bg: usize) -> u16 {
        let Some(config) = self.config(bg) else { return 0 };

        match self.plane_type(bg) {
            Some(BgType::Text) => text_metric(config.screen_size, TextMetric::Screens) * 0x800,
            Some(BgType::Affine) => {
                (affine_metric(config.screen_size, AffineMetric::Blocks) * 0x100) as u16
            }
            None => 0,
        }
    }

    fn sync_dispcnt(&mut self, ppu: &mut Ppu) {
        self.display_word &= DISPCNT_MODE_AND_BG_BITS;

        let dispcnt = ppu.read_register(DISPCNT);
        ppu.write_register(DISPCNT, (dispcnt & !DISPCNT_MODE_AND_BG_BITS) | self.display_word);
    }

    /// Write the plane's control word to BGxCNT, set its visibility bit, and sync DISPCNT.
    pub fn show(&mut self, ppu: &mut Ppu, bg: usize) {
        let Some(config) = self.config(bg) else {
            log::warn!("Cannot show BG {bg}: invalid or not configured");
            return;
        };

        ppu.write_register(bgcnt(bg), config.control_word());
        self.display_word |= 1 << (bg + 8);
        self.sync_dispcnt(ppu);
    }

    pub fn hide(&mut self, ppu: &mut Ppu, bg: usize) {
        if bg >= NUM_BGS {
            log::warn!("Cannot hide invalid BG {bg}");
            return;
        }

        self.display_word &= !(1 << (bg + 8));
        self.sync_dispcnt(ppu);
    }

    #[must_use]
    pub fn is_shown(&self, bg: usize) -> bool {
        bg < NUM_BGS && self.display_word & (1 << (bg + 8)) != 0
    }

    fn load_bg_vram_marked(
        &mut self,
        bg: usize,
        src: &[u8],
        dest_offset: u16,
        region: VramRegion,
        transfer: &mut impl VramTransfer,
    ) -> Option<u8> {
        let slot = self.load_bg_vram(bg, src, dest_offset, region, transfer)?;
        self.dma_busy.mark(slot);
        Some(slot)
    }

    /// Queue a copy into the plane's character or screen block. Does not track the slot.
    pub fn load_bg_vram(
        &self,
        bg: usize,
        src: &[u8],
        dest_offset: u16,
        region: VramRegion,
        transfer: &mut impl VramTransfer,
    ) -> Option<u8> {
        let config = self.config(bg)?;

        let base = match region {
            VramRegion::Tiles => u16::from(config.char_base) * CHAR_BLOCK_BYTES,
            VramRegion::Tilemap => u16::from(config.map_base) * SCREEN_BLOCK_BYTES,
        };
        let offset = dest_offset.wrapping_add(base);

        let slot = transfer.request_copy(TransferRequest {
            source: src,
            destination: TransferDestination::BgVram(offset.into()),
            priority: 0,
        });
        if slot.is_none() {
            log::debug!("No transfer slot available for BG{bg} {region:?} load");
        }
        slot
    }

    /// Queue a tile graphics load at `dest_offset` tiles past the plane's base tile.
    pub fn load_tiles(
        &mut self,
        bg: usize,
        src: &[u8],
        dest_offset: u16,
        transfer: &mut impl VramTransfer,
    ) -> Option<u8> {
        let tile_bytes: u16 = match self.get_attribute(bg, BgAttribute::PaletteMode) {
            Some(0) => 0x20,
            _ => 0x40,
        };
        let base_tile = self.extended.get(bg)?.base_tile;
        let offset = base_tile.wrapping_add(dest_offset).wrapping_mul(tile_bytes);

        self.load_bg_vram_marked(bg, src, offset, VramRegion::Tiles, transfer)
    }

    /// Queue a tilemap load at `dest_offset` map entries into the plane's screen block.
    pub fn load_tilemap(
        &mut self,
        bg: usize,
        src: &[u8],
        dest_offset: u16,
        transfer: &mut impl VramTransfer,
    ) -> Option<u8> {
        self.load_bg_vram_marked(bg, src, dest_offset.wrapping_mul(2), VramRegion::Tilemap, transfer)
    }

    /// Queue a BG palette load at `dest_offset` colors past the plane's base palette. Hidden
    /// planes are allowed.
    pub fn load_palette(
        &mut self,
        bg: usize,
        src: &[u8],
        dest_offset: u16,
        transfer: &mut impl VramTransfer,
    ) -> Option<u8> {
        let extended = self.extended.get(bg)?;
        let offset = extended.base_palette.wrapping_mul(0x20).wrapping_add(dest_offset.wrapping_mul(2));

        let slot = transfer.request_copy(TransferRequest {
            source: src,
            destination: TransferDestination::BgPalette(offset.into()),
            priority: 0,
        })?;
        self.dma_busy.mark(slot);
        Some(slot)
    }

    /// Reclaim completed transfer slots; returns true if a tracked transfer is still pending.
    pub fn is_transfer_busy_with_bg_copy(&mut self, transfer: &impl VramTransfer) -> bool {
        self.dma_busy.poll(transfer)
    }

    fn change_scroll(
        &mut self,
        ppu: &mut Ppu,
        bg: usize,
        axis: Axis,
        value: i32,
        op: ScrollOp,
        path: RegisterPath,
    ) -> Option<i32> {
        self.config(bg)?;

        let extended = &mut self.extended[bg];
        let position = match axis {
            Axis::X => &mut extended.x,
            Axis::Y => &mut extended.y,
        };
        *position = op.apply(*position, value);
        let position = *position;

        self.write_scroll_registers(ppu, bg, axis, position, path);

        Some(position)
    }

    fn write_scroll_registers(
        &self,
        ppu: &mut Ppu,
        bg: usize,
        axis: Axis,
        position: i32,
        path: RegisterPath,
    ) {
        let mut write = |offset: u32, value: u16| match path {
            RegisterPath::Immediate => ppu.write_register(offset, value),
            RegisterPath::ForcedBlank => ppu.write_register_forced_blank(offset, value),
        };

        let text_offset = match axis {
            Axis::X => bghofs(bg),
            Axis::Y => bgvofs(bg),
        };
        let text_value = (position >> 8) as u16;

        let affine_registers = match (bg, self.mode()) {
            (0 | 1, _) | (2 | 3, 0) => None,
            (2, _) => Some(match axis {
                Axis::X => (BG2X_H, BG2X_L),
                Axis::Y => (BG2Y_H, BG2Y_L),
            }),
            (3, 2) => Some(match axis {
                Axis::X => (BG3X_H, BG3X_L),
                Axis::Y => (BG3Y_H, BG3Y_L),
            }),
            _ => {
                // BG3 is not displayed in mode 1; keep the stored position only
                return;
            }
        };

        match affine_registers {
            None => write(text_offset, text_value),
            Some((high, low)) => {
                write(high, (position >> 16) as u16);
                write(low, position as u16);
            }
        }
    }

    /// Update the horizontal scroll position (8 fractional bits) and write the scroll registers.
    /// Returns the new position, or `None` for an invalid or hidden plane.
    pub fn change_x(&mut self, ppu: &mut Ppu, bg: usize, value: i32, op: ScrollOp) -> Option<i32> {
        self.change_scroll(ppu, bg, Axis::X, value, op, RegisterPath::Immediate)
    }

    pub fn change_y(&mut self, ppu: &mut Ppu, bg: usize, value: i32, op: ScrollOp) -> Option<i32> {
        self.change_scroll(ppu, bg, Axis::Y, value, op, RegisterPath::Immediate)
    }

    /// As [`Self::change_y`], but registers are written through the forced-blank path.
    pub fn change_y_screen_off(
        &mut self,
        ppu: &mut Ppu,
        bg: usize,
        value: i32,
        op: ScrollOp,
    ) -> Option<i32> {
        self.change_scroll(ppu, bg, Axis::Y, value, op, RegisterPath::ForcedBlank)
    }

    #[must_use]
    pub fn x(&self, bg: usize) -> Option<i32> {
        self.visible_extended(bg).map(|extended| extended.x)
    }

    #[must_use]
    pub fn y(&self, bg: usize) -> Option<i32> {
        self.visible_extended(bg).map(|extended| extended.y)
    }

    /// Compute a rotation/scale transform and write it to the BG2 affine registers. Only legal
    /// for an affine plane under the current mode.
    pub fn set_affine(&self, ppu: &mut Ppu, bg: usize, source: &BgAffineSource) {
        if self.plane_type(bg) != Some(BgType::Affine) {
            log::warn!("Ignoring affine update for BG{bg} in mode {}", self.mode());
            return;
        }

        let matrix = affine::bg_affine_set(source);
        log::debug!("BG{bg} affine: {matrix:?}");

        ppu.write_register(BG2PA, matrix.pa as u16);
        ppu.write_register(BG2PB, matrix.pb as u16);
        ppu.write_register(BG2PC, matrix.pc as u16);
        ppu.write_register(BG2PD, matrix.pd as u16);
        ppu.write_register(BG2X_L, matrix.start_x as u16);
        ppu.write_register(BG2X_H, (matrix.start_x >> 16) as u16);
        ppu.write_register(BG2Y_L, matrix.start_y as u16);
        ppu.write_register(BG2Y_H, (matrix.start_y >> 16) as u16);
    }

    /// Adjust the BG mosaic size in MOSAIC, preserving the OBJ mosaic. Returns the new BG mosaic
    /// byte (H in bits 0-3, V in bits 4-7).
    pub fn adjust_mosaic(&self, ppu: &mut Ppu, value: u8, op: MosaicOp) -> u8 {
        let mosaic = ppu.read_register(MOSAIC);
        let obj_mosaic = mosaic & 0xFF00;
        let mut h = (mosaic & 0xF) as u8;
        let mut v = ((mosaic >> 4) & 0xF) as u8;

        match op {
            MosaicOp::SetBoth => {
                h = value & 0xF;
                v = value >> 4;
            }
            MosaicOp::SetH => h = value & 0xF,
            MosaicOp::AddH => h = cmp::min(0xF, u16::from(h) + u16::from(value)) as u8,
            MosaicOp::SubH => h = h.saturating_sub(value),
            MosaicOp::SetV => v = value & 0xF,
            MosaicOp::AddV => v = cmp::min(0xF, u16::from(v) + u16::from(value)) as u8,
            MosaicOp::SubV => v = v.saturating_sub(value),
        }

        let bg_mosaic = (v << 4) | h;
        ppu.write_register(MOSAIC, obj_mosaic | u16::from(bg_mosaic));
        bg_mosaic
    }

    pub fn set_tilemap_buffer(&mut self, bg: usize, buffer: TilemapBuffer) {
        if self.config(bg).is_none() {
            log::warn!("Cannot attach tilemap buffer to BG {bg}: invalid or not configured");
            return;
        }

        self.extended[bg].tilemap = Some(buffer);
    }

    pub fn unset_tilemap_buffer(&mut self, bg: usize) {
        if self.config(bg).is_some() {
            self.extended[bg].tilemap = None;
        }
    }

    #[must_use]
    pub fn tilemap_buffer(&self, bg: usize) -> Option<&TilemapBuffer> {
        self.visible_extended(bg)?.tilemap.as_ref()
    }

    /// Copy `src` into the plane's tilemap buffer at `dest_offset` map entries, raw or through
    /// the LZ77 decompressor. A no-op for planes without a buffer.
    ///
    /// # Errors
    ///
    /// Propagates decompression errors for malformed streams.
    pub fn copy_to_tilemap_buffer(
        &self,
        bg: usize,
        src: &[u8],
        copy: TilemapCopy,
        dest_offset: u16,
        decompressor: &mut impl Decompressor,
    ) -> Result<(), DecompressError> {
        let Some(buffer) = self.tilemap_buffer(bg) else { return Ok(()) };
        let start = 2 * usize::from(dest_offset);

        buffer.with_bytes_mut(|bytes| -> Result<(), DecompressError> {
            let buffer_len = bytes.len();
            let Some(dest) = bytes.get_mut(start..) else {
                log::warn!("Tilemap buffer copy offset {start} past end of buffer ({buffer_len} bytes)");
                return Ok(());
            };

            match copy {
                TilemapCopy::Raw(len) => {
                    let len = cmp::min(len, src.len());
                    if len > dest.len() {
                        log::warn!(
                            "Truncating tilemap buffer copy of {len} bytes to {} bytes",
                            dest.len()
                        );
                    }
                    let len = cmp::min(len, dest.len());
                    dest[..len].copy_from_slice(&src[..len]);
                }
                TilemapCopy::Decompress => {
                    let written = decompressor.decompress(
                        CompressionFormat::Lz77,
                        DecompressTarget::Linear,
                        src,
                        dest,
                    )?;
                    log::trace!("Decompressed {written} bytes into BG{bg} tilemap buffer");
                }
            }

            Ok(())
        })
    }

    /// Queue a load of the whole tilemap buffer into the plane's screen block.
    pub fn copy_tilemap_buffer_to_vram(
        &self,
        bg: usize,
        transfer: &mut impl VramTransfer,
    ) -> Option<u8> {
        let buffer = self.tilemap_buffer(bg)?;
        let size = usize::from(self.map_size_bytes(bg));

        let bytes = buffer.bytes();
        let size = cmp::min(size, bytes.len());
        self.load_bg_vram(bg, &bytes[..size], 0, VramRegion::Tilemap, transfer)
    }

    fn affine_width_tiles(&self, bg: usize) -> u16 {
        let screen_size = self.config(bg).map_or(0, |config| config.screen_size);
        affine_metric(screen_size, AffineMetric::WidthTiles) as u16
    }

    // Width and height in tiles of a text plane
    fn text_dimensions_tiles(&self, bg: usize) -> (u8, u16, u16) {
        let screen_size = self.config(bg).map_or(0, |config| config.screen_size);
        (
            screen_size,
            text_metric(screen_size, TextMetric::Width) * 32,
            text_metric(screen_size, TextMetric::Height) * 32,
        )
    }

    /// Copy a rectangle of map entries into the buffer without screen-block resolution: text
    /// entries land at `y * 32 + x`, affine entries at `y * width + x`.
    pub fn copy_to_tilemap_buffer_rect(&self, bg: usize, src: &[u8], rect: TileRect) {
        let Some(buffer) = self.tilemap_buffer(bg) else { return };

        match self.plane_type(bg) {
            Some(BgType::Text) => {
                let entries = src.chunks_exact(2).map(|entry| u16::from_le_bytes([entry[0], entry[1]]));
                for ((x, y), entry) in rect.coords().zip(entries) {
                    buffer.write_u16(usize::from(y) * 32 + usize::from(x), entry);
                }
            }
            Some(BgType::Affine) => {
                let width = usize::from(self.affine_width_tiles(bg));
                for ((x, y), &entry) in rect.coords().zip(src) {
                    buffer.write_u8(usize::from(y) * width + usize::from(x), entry);
                }
            }
            None => {}
        }
    }

    pub fn copy_to_tilemap_buffer_rect_change_palette(
        &self,
        bg: usize,
        src: &[u8],
        rect: TileRect,
        palette: i32,
    ) {
        let src_rect = TileRect::new(0, 0, rect.width, rect.height);
        self.copy_rect_to_tilemap_buffer_rect(bg, src, src_rect, rect.width, rect, palette, 0);
    }

    /// Copy `dest_rect`-sized entries read from `src_rect` of a `src_width`-wide source map.
    /// Text entries go through [`copy_tile_map_entry`] into screen-block-resolved indices; affine
    /// entries have `palette` added to the tile number.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_rect_to_tilemap_buffer_rect(
        &self,
        bg: usize,
        src: &[u8],
        src_rect: TileRect,
        src_width: u16,
        dest_rect: TileRect,
        palette: i32,
        tile_offset: i32,
    ) {
        let Some(buffer) = self.tilemap_buffer(bg) else { return };
        let Some(plane_type) = self.plane_type(bg) else { return };

        let src_index = |x: u16, y: u16| {
            usize::from(src_rect.y.wrapping_add(y)) * usize::from(src_width)
                + usize::from(src_rect.x.wrapping_add(x))
        };

        match plane_type {
            BgType::Text => {
                let (screen_size, width_tiles, height_tiles) = self.text_dimensions_tiles(bg);
                for y in 0..dest_rect.height {
                    for x in 0..dest_rect.width {
                        let i = src_index(x, y);
                        let Some(entry) = src.get(2 * i..2 * i + 2) else { continue };
                        let entry = u16::from_le_bytes([entry[0], entry[1]]);

                        let index = usize::from(tile_map_index_from_coords(
                            dest_rect.x.wrapping_add(x),
                            dest_rect.y.wrapping_add(y),
                            screen_size,
                            width_tiles,
                            height_tiles,
                        ));
                        let dest = buffer.read_u16(index).unwrap_or(0);
                        buffer.write_u16(index, copy_tile_map_entry(entry, dest, palette, tile_offset, 0));
                    }
                }
            }
            BgType::Affine => {
                let width = usize::from(self.affine_width_tiles(bg));
                for y in 0..dest_rect.height {
                    for x in 0..dest_rect.width {
                        let Some(&entry) = src.get(src_index(x, y)) else { continue };
                        let index = usize::from(dest_rect.y.wrapping_add(y)) * width
                            + usize::from(dest_rect.x.wrapping_add(x));
                        buffer.write_u8(index, entry.wrapping_add(palette as u8));
                    }
                }
            }
        }
    }

    /// Fill a rectangle with a raw map entry, without screen-block resolution.
    pub fn fill_tilemap_buffer_rect_palette0(&self, bg: usize, tile: u16, rect: TileRect) {
        let Some(buffer) = self.tilemap_buffer(bg) else { return };

        match self.plane_type(bg) {
            Some(BgType::Text) => {
                for (x, y) in rect.coords() {
                    buffer.write_u16(usize::from(y) * 32 + usize::from(x), tile);
                }
            }
            Some(BgType::Affine) => {
                let width = usize::from(self.affine_width_tiles(bg));
                for (x, y) in rect.coords() {
                    buffer.write_u8(usize::from(y) * width + usize::from(x), tile as u8);
                }
            }
            None => {}
        }
    }

    pub fn fill_tilemap_buffer_rect(&self, bg: usize, tile: u16, rect: TileRect, palette: i32) {
        self.write_sequence_to_tilemap_buffer(bg, tile, rect, palette, 0);
    }

    /// Write consecutive tiles across a rectangle in row order, stepping the tile number by
    /// `delta` after each entry. The step wraps within the 10-bit tile number.
    pub fn write_sequence_to_tilemap_buffer(
        &self,
        bg: usize,
        first_tile: u16,
        rect: TileRect,
        palette: i32,
        delta: i16,
    ) {
        let Some(buffer) = self.tilemap_buffer(bg) else { return };
        let Some(plane_type) = self.plane_type(bg) else { return };

        let next_tile =
            |tile: u16| (tile & !TILE_NUMBER_MASK) + (tile.wrapping_add_signed(delta) & TILE_NUMBER_MASK);

        let mut tile = first_tile;
        match plane_type {
            BgType::Text => {
                let (screen_size, width_tiles, height_tiles) = self.text_dimensions_tiles(bg);
                for (x, y) in rect.coords() {
                    let index = usize::from(tile_map_index_from_coords(
                        x,
                        y,
                        screen_size,
                        width_tiles,
                        height_tiles,
                    ));
                    let dest = buffer.read_u16(index).unwrap_or(0);
                    buffer.write_u16(index, copy_tile_map_entry(tile, dest, palette, 0, 0));
                    tile = next_tile(tile);
                }
            }
            BgType::Affine => {
                let width = usize::from(self.affine_width_tiles(bg));
                for (x, y) in rect.coords() {
                    buffer.write_u8(usize::from(y) * width + usize::from(x), tile as u8);
                    tile = next_tile(tile);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
