use raster_common::frontend::Color;
use std::array;
use std::sync::LazyLock;

const RGB_5_TO_8: &[u8; 32] = &[
    0, 8, 16, 25, 33, 41, 49, 58, 66, 74, 82, 90, 99, 107, 115, 123, 132, 140, 148, 156, 165, 173,
    181, 189, 197, 206, 214, 222, 230, 239, 247, 255,
];

type ColorTable = [Color; 32768];

static TABLE: LazyLock<Box<ColorTable>> = LazyLock::new(|| {
    Box::new(array::from_fn(|color| {
        let r = color & 0x1F;
        let g = (color >> 5) & 0x1F;
        let b = (color >> 10) & 0x1F;
        Color::rgb(RGB_5_TO_8[r], RGB_5_TO_8[g], RGB_5_TO_8[b])
    }))
});

/// Convert a 15-bit BGR color to RGB8. The opaque bit is ignored.
#[must_use]
pub fn gba_color_to_rgb8(color: u16) -> Color {
    TABLE[(color & 0x7FFF) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn channel_extremes() {
        assert_eq!(gba_color_to_rgb8(0x8000), Color::rgb(0, 0, 0));
        assert_eq!(gba_color_to_rgb8(0xFFFF), Color::rgb(255, 255, 255));
        assert_eq!(gba_color_to_rgb8(0x001F), Color::rgb(255, 0, 0));
        assert_eq!(gba_color_to_rgb8(0x7C00), Color::rgb(0, 0, 255));
    }
}
