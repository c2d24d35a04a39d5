//! Fixed-point rotation/scale matrix setup for affine BGs and sprites

/// sin(2πi/256) in signed 2.14 fixed point
const SINE_TABLE: &[u16; 256] = &[
    0x0000, 0x0192, 0x0323, 0x04B5, 0x0645, 0x07D5, 0x0964, 0x0AF1,
    0x0C7C, 0x0E05, 0x0F8C, 0x1111, 0x1294, 0x1413, 0x158F, 0x1708,
    0x187D, 0x19EF, 0x1B5D, 0x1CC6, 0x1E2B, 0x1F8B, 0x20E7, 0x223D,
    0x238E, 0x24DA, 0x261F, 0x275F, 0x2899, 0x29CD, 0x2AFA, 0x2C21,
    0x2D41, 0x2E5A, 0x2F6B, 0x3076, 0x3179, 0x3274, 0x3367, 0x3453,
    0x3536, 0x3612, 0x36E5, 0x37AF, 0x3871, 0x392A, 0x39DA, 0x3A82,
    0x3B20, 0x3BB6, 0x3C42, 0x3CC5, 0x3D3E, 0x3DAE, 0x3E14, 0x3E71,
    0x3EC5, 0x3F0E, 0x3F4E, 0x3F84, 0x3FB1, 0x3FD3, 0x3FEC, 0x3FFB,
    0x4000, 0x3FFB, 0x3FEC, 0x3FD3, 0x3FB1, 0x3F84, 0x3F4E, 0x3F0E,
    0x3EC5, 0x3E71, 0x3E14, 0x3DAE, 0x3D3E, 0x3CC5, 0x3C42, 0x3BB6,
    0x3B20, 0x3A82, 0x39DA, 0x392A, 0x3871, 0x37AF, 0x36E5, 0x3612,
    0x3536, 0x3453, 0x3367, 0x3274, 0x3179, 0x3076, 0x2F6B, 0x2E5A,
    0x2D41, 0x2C21, 0x2AFA, 0x29CD, 0x2899, 0x275F, 0x261F, 0x24DA,
    0x238E, 0x223D, 0x20E7, 0x1F8B, 0x1E2B, 0x1CC6, 0x1B5D, 0x19EF,
    0x187D, 0x1708, 0x158F, 0x1413, 0x1294, 0x1111, 0x0F8C, 0x0E05,
    0x0C7C, 0x0AF1, 0x0964, 0x07D5, 0x0645, 0x04B5, 0x0323, 0x0192,
    0x0000, 0xFE6E, 0xFCDD, 0xFB4B, 0xF9BB, 0xF82B, 0xF69C, 0xF50F,
    0xF384, 0xF1FB, 0xF074, 0xEEEF, 0xED6C, 0xEBED, 0xEA71, 0xE8F8,
    0xE783, 0xE611, 0xE4A3, 0xE33A, 0xE1D5, 0xE075, 0xDF19, 0xDDC3,
    0xDC72, 0xDB26, 0xD9E1, 0xD8A1, 0xD767, 0xD633, 0xD506, 0xD3DF,
    0xD2BF, 0xD1A6, 0xD095, 0xCF8A, 0xCE87, 0xCD8C, 0xCC99, 0xCBAD,
    0xCACA, 0xC9EE, 0xC91B, 0xC851, 0xC78F, 0xC6D6, 0xC626, 0xC57E,
    0xC4E0, 0xC44A, 0xC3BE, 0xC33B, 0xC2C2, 0xC252, 0xC1EC, 0xC18F,
    0xC13B, 0xC0F2, 0xC0B2, 0xC07C, 0xC04F, 0xC02D, 0xC014, 0xC005,
    0xC000, 0xC005, 0xC014, 0xC02D, 0xC04F, 0xC07C, 0xC0B2, 0xC0F2,
    0xC13B, 0xC18F, 0xC1EC, 0xC252, 0xC2C2, 0xC33B, 0xC3BE, 0xC44A,
    0xC4E0, 0xC57E, 0xC626, 0xC6D6, 0xC78F, 0xC851, 0xC91B, 0xC9EE,
    0xCACA, 0xCBAD, 0xCC99, 0xCD8C, 0xCE87, 0xCF8A, 0xD095, 0xD1A6,
    0xD2BF, 0xD3DF, 0xD506, 0xD633, 0xD767, 0xD8A1, 0xD9E1, 0xDB26,
    0xDC72, 0xDDC3, 0xDF19, 0xE075, 0xE1D5, 0xE33A, 0xE4A3, 0xE611,
    0xE783, 0xE8F8, 0xEA71, 0xEBED, 0xED6C, 0xEEEF, 0xF074, 0xF1FB,
    0xF384, 0xF50F, 0xF69C, 0xF82B, 0xF9BB, 0xFB4B, 0xFCDD, 0xFE6E,
];

fn sine(index: u16) -> i32 {
    i32::from(SINE_TABLE[usize::from(index & 0xFF)] as i16)
}

/// Scale/rotation terms shared by BG and sprite matrices: `(dx, dmx, dy, dmy)`
fn rotation_terms(x_scale: i16, y_scale: i16, rotation: u16) -> (i16, i16, i16, i16) {
    let theta = rotation >> 8;
    let cos = sine(theta + 0x40);
    let sin = sine(theta);

    let x_scale = i32::from(x_scale);
    let y_scale = i32::from(y_scale);

    let dx = ((x_scale * cos) >> 14) as i16;
    let dmx = ((x_scale * sin) >> 14) as i16;
    let dy = ((y_scale * sin) >> 14) as i16;
    let dmy = ((y_scale * cos) >> 14) as i16;

    (dx, dmx, dy, dmy)
}

/// Input to [`bg_affine_set`]: the texture point that should appear at the given screen point,
/// scaled (8.8) and rotated (full circle = 0x10000) around it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BgAffineSource {
    pub tex_x: i32,
    pub tex_y: i32,
    pub screen_x: i16,
    pub screen_y: i16,
    pub x_scale: i16,
    pub y_scale: i16,
    pub rotation: u16,
}

/// BG matrix `pa..pd` (8.8) and reference point (20.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BgAffineMatrix {
    pub pa: i16,
    pub pb: i16,
    pub pc: i16,
    pub pd: i16,
    pub start_x: i32,
    pub start_y: i32,
}

#[must_use]
pub fn bg_affine_set(source: &BgAffineSource) -> BgAffineMatrix {
    let (dx, dmx, dy, dmy) = rotation_terms(source.x_scale, source.y_scale, source.rotation);

    let screen_x = i32::from(source.screen_x);
    let screen_y = i32::from(source.screen_y);

    let start_x = source
        .tex_x
        .wrapping_sub(i32::from(dx).wrapping_mul(screen_x))
        .wrapping_add(i32::from(dmx).wrapping_mul(screen_y));
    let start_y = source
        .tex_y
        .wrapping_sub(i32::from(dy).wrapping_mul(screen_x))
        .wrapping_sub(i32::from(dmy).wrapping_mul(screen_y));

    BgAffineMatrix { pa: dx, pb: dmx.wrapping_neg(), pc: dy, pd: dmy, start_x, start_y }
}

/// Sprite matrix as `[pa, pb, pc, pd]`
#[must_use]
pub fn obj_affine_set(x_scale: i16, y_scale: i16, rotation: u16) -> [i16; 4] {
    let (dx, dmx, dy, dmy) = rotation_terms(x_scale, y_scale, rotation);
    [dx, dmx.wrapping_neg(), dy, dmy]
}
