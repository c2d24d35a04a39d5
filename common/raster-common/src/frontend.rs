use bincode::{Decode, Encode};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable, Encode, Decode)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    #[must_use]
    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl Default for Color {
    #[inline]
    fn default() -> Self {
        Self::BLACK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    #[must_use]
    pub fn len(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

pub trait Renderer {
    type Err;

    /// Present a finished frame.
    ///
    /// The frame buffer must contain at least (`frame_size.width` * `frame_size.height`) colors
    /// in row-major order. Colors past that length are ignored.
    ///
    /// # Errors
    ///
    /// This method will return an error if it is unable to present the frame.
    fn render_frame(&mut self, frame_buffer: &[Color], frame_size: FrameSize)
    -> Result<(), Self::Err>;
}
