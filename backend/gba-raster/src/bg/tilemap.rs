use std::cell::{Ref, RefCell};
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// Shared handle to caller-owned off-screen tilemap storage.
///
/// The manager only holds a handle; the caller keeps its own clone and decides when the storage
/// goes away.
#[derive(Clone)]
pub struct TilemapBuffer(Rc<RefCell<Box<[u8]>>>);

impl TilemapBuffer {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self(Rc::new(RefCell::new(vec![0; len].into_boxed_slice())))
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Rc::new(RefCell::new(bytes.into_boxed_slice())))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn bytes(&self) -> Ref<'_, Box<[u8]>> {
        self.0.borrow()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.borrow().to_vec()
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    #[must_use]
    pub fn read_u8(&self, index: usize) -> Option<u8> {
        self.0.borrow().get(index).copied()
    }

    #[must_use]
    pub fn read_u16(&self, index: usize) -> Option<u16> {
        let bytes = self.0.borrow();
        let lsb = *bytes.get(2 * index)?;
        let msb = *bytes.get(2 * index + 1)?;
        Some(u16::from_le_bytes([lsb, msb]))
    }

    pub fn write_u8(&self, index: usize, value: u8) {
        match self.0.borrow_mut().get_mut(index) {
            Some(byte) => *byte = value,
            None => log::warn!("Tilemap buffer write out of bounds: byte {index}"),
        }
    }

    pub fn write_u16(&self, index: usize, value: u16) {
        let mut bytes = self.0.borrow_mut();
        match bytes.get_mut(2 * index..2 * index + 2) {
            Some(entry) => entry.copy_from_slice(&value.to_le_bytes()),
            None => log::warn!("Tilemap buffer write out of bounds: entry {index}"),
        }
    }
}

impl Debug for TilemapBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TilemapBuffer").field("len", &self.len()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMetric {
    /// Number of 256x256 screens
    Screens,
    /// Screens across
    Width,
    /// Screens down
    Height,
}

/// Screen counts for a text plane of the given size class
#[must_use]
pub fn text_metric(screen_size: u8, metric: TextMetric) -> u16 {
    match (metric, screen_size & 3) {
        (TextMetric::Screens, 0) => 1,
        (TextMetric::Screens, 1 | 2) => 2,
        (TextMetric::Screens, _) => 4,
        (TextMetric::Width, 0 | 2) | (TextMetric::Height, 0 | 1) => 1,
        (TextMetric::Width | TextMetric::Height, _) => 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffineMetric {
    /// Map size in units of 256 bytes
    Blocks,
    /// Map width in tiles
    WidthTiles,
    /// Map height in tiles
    HeightTiles,
}

#[must_use]
pub fn affine_metric(screen_size: u8, metric: AffineMetric) -> u32 {
    let screen_size = screen_size & 3;
    match metric {
        AffineMetric::Blocks => 1 << (2 * screen_size),
        AffineMetric::WidthTiles | AffineMetric::HeightTiles => 0x10 << screen_size,
    }
}

/// Index of the 16-bit map entry for tile coordinates (x, y) in a text plane.
///
/// Coordinates wrap at the map's tile dimensions. Maps wider than one screen store the right
/// screen after the whole left screen rather than interleaved by row.
#[must_use]
pub fn tile_map_index_from_coords(
    x: u16,
    y: u16,
    screen_size: u8,
    width_tiles: u16,
    height_tiles: u16,
) -> u16 {
    let mut x = x & width_tiles.wrapping_sub(1);
    let mut y = y & height_tiles.wrapping_sub(1);

    let screen_size = screen_size & 3;
    if screen_size == 3 && y >= 32 {
        y += 32;
    }
    if (screen_size == 1 || screen_size == 3) && x >= 32 {
        x -= 32;
        y += 32;
    }

    y * 32 + x
}

/// Build a map entry from a source entry.
///
/// Palettes 0-15 replace the palette bits and drop the flip bits; palette 16 keeps the
/// destination's flip and palette bits and replaces only the tile number; anything else copies
/// the source unchanged. `tile_offset` is added to the tile number, `palette_add` to the palette.
#[must_use]
pub fn copy_tile_map_entry(src: u16, dest: u16, palette: i32, tile_offset: i32, palette_add: i32) -> u16 {
    let tile = (i32::from(src) + tile_offset) as u16;
    match palette {
        0..=15 => (tile & 0xFFF).wrapping_add(((palette + palette_add) << 12) as u16),
        16 => ((dest & 0xFC00).wrapping_add((palette_add << 12) as u16)) | (tile & 0x3FF),
        _ => tile.wrapping_add((palette_add << 12) as u16),
    }
}
