use crate::ppu::registers::{
    BlendMode, WINDOW_MASK_BLEND, WINDOW_MASK_OBJ, WINDOW_MASK_OUTSIDE, Window,
};
use crate::ppu::{Pixel, Ppu};
use std::cmp;

impl Ppu {
    pub(super) fn sort_bgs_by_priority(&mut self) {
        for bg in 0..4 {
            if self.bg_flags[bg].hidden {
                continue;
            }

            let priority = usize::from(self.registers.bg_control[bg].priority);
            let count = usize::from(self.buffers.sorted_bg_counts[priority]);
            self.buffers.sorted_bgs[priority][count] = bg as u8;
            self.buffers.sorted_bg_counts[priority] += 1;
        }
    }

    pub(super) fn alpha_coefficients(&self) -> (u16, u16) {
        let eva: u16 = cmp::min(16, self.registers.blend_alpha_a).into();
        let evb: u16 = cmp::min(16, self.registers.blend_alpha_b).into();
        (eva, evb)
    }

    pub(super) fn brightness_coefficient(&self) -> u16 {
        cmp::min(16, self.registers.blend_brightness).into()
    }

    /// Palette entry 0, with brightness effects applied if the backdrop is a 1st target
    pub(super) fn backdrop_color(&self) -> Pixel {
        let backdrop = Pixel(self.palette_ram[0]);
        if !self.registers.blend_1st_target.backdrop() {
            return backdrop;
        }

        let evy = self.brightness_coefficient();
        match self.registers.blend_mode {
            BlendMode::BrightnessIncrease => adjust_brightness::<true>(backdrop, evy),
            BlendMode::BrightnessDecrease => adjust_brightness::<false>(backdrop, evy),
            BlendMode::None | BlendMode::AlphaBlending => backdrop,
        }
    }

    /// Fill the window mask for this line. Returns whether any window is enabled; when none are,
    /// the mask is left cleared and must not be consulted.
    pub(super) fn build_window_mask(&mut self, line: u32) -> bool {
        let registers = &self.registers;
        if !registers.any_window_enabled() {
            return false;
        }

        let window_y_active = [0, 1].map(|i| registers.window_active_on_line(i, line));

        let inside_0 = registers.window_mask(Window::Inside0);
        let inside_1 = registers.window_mask(Window::Inside1);
        let outside = registers.window_mask(Window::Outside) | WINDOW_MASK_OUTSIDE;

        for (x, mask) in self.buffers.window_mask.iter_mut().enumerate() {
            let x = x as u32;
            *mask = if window_y_active[0] && registers.window_contains_x(0, x) {
                inside_0
            } else if window_y_active[1] && registers.window_contains_x(1, x) {
                inside_1
            } else {
                outside
            };
        }

        true
    }

    /// Search for the 2nd blend target beneath a pixel, starting at the given priority bucket and
    /// position within that bucket.
    ///
    /// An opaque non-target BG in a lower priority bucket ends the search. If nothing is found,
    /// the backdrop is used when it is a 2nd target.
    pub(super) fn select_blend_target(
        &self,
        priority: u8,
        first_position: usize,
        x: usize,
        obj_2nd_target: bool,
    ) -> Option<Pixel> {
        let priority = usize::from(priority);
        let mut first_position = first_position;

        for target_priority in priority..4 {
            if obj_2nd_target {
                let obj_pixel = self.buffers.obj_pixels[target_priority][x];
                if obj_pixel.opaque() {
                    return Some(obj_pixel);
                }
            }

            let count = usize::from(self.buffers.sorted_bg_counts[target_priority]);
            for position in first_position..count {
                let bg = usize::from(self.buffers.sorted_bgs[target_priority][position]);
                let bg_pixel = self.buffers.bg_pixels[bg][x];
                if !bg_pixel.opaque() || !self.bg_displayed(bg) {
                    continue;
                }

                if self.registers.blend_2nd_target.bg(bg) {
                    return Some(bg_pixel);
                }

                if target_priority != priority {
                    // Non-target layer in the way
                    return None;
                }
            }

            first_position = 0;
        }

        self.registers.blend_2nd_target.backdrop().then(|| Pixel(self.palette_ram[0]))
    }

    /// Merge BG and sprite lines into `pixels` from the lowest priority bucket to the highest.
    pub(super) fn composite(&self, pixels: &mut [u16], windows_enabled: bool) {
        let blend_mode = self.registers.blend_mode;
        let (eva, evb) = self.alpha_coefficients();
        let evy = self.brightness_coefficient();

        for priority in (0..4).rev() {
            let count = usize::from(self.buffers.sorted_bg_counts[priority]);

            // Within a bucket, lower BG numbers draw later and end up on top
            for position in (0..count).rev() {
                let bg = usize::from(self.buffers.sorted_bgs[priority][position]);
                if !self.bg_displayed(bg) {
                    continue;
                }

                for (x, output) in pixels.iter_mut().enumerate() {
                    let color = self.buffers.bg_pixels[bg][x];
                    if !color.opaque() {
                        continue;
                    }

                    let mut effects_enabled = true;
                    if windows_enabled {
                        let mask = self.buffers.window_mask[x];
                        if mask & (1 << bg) == 0 {
                            continue;
                        }
                        effects_enabled = mask & WINDOW_MASK_BLEND != 0;
                    }

                    let mut blended = color;
                    if effects_enabled && self.registers.blend_1st_target.bg(bg) {
                        match blend_mode {
                            BlendMode::None => {}
                            BlendMode::AlphaBlending => {
                                if let Some(target) = self.select_blend_target(
                                    priority as u8,
                                    position + 1,
                                    x,
                                    self.registers.blend_2nd_target.obj(),
                                ) {
                                    blended = alpha_blend(color, target, eva, evb);
                                }
                            }
                            BlendMode::BrightnessIncrease => {
                                blended = adjust_brightness::<true>(color, evy);
                            }
                            BlendMode::BrightnessDecrease => {
                                blended = adjust_brightness::<false>(color, evy);
                            }
                        }
                    }

                    *output = blended.0;
                }
            }

            // Sprites draw over BGs of the same priority
            for (x, output) in pixels.iter_mut().enumerate() {
                let color = self.buffers.obj_pixels[priority][x];
                if !color.opaque() {
                    continue;
                }

                if windows_enabled && self.buffers.window_mask[x] & WINDOW_MASK_OBJ == 0 {
                    continue;
                }

                *output = color.0;
            }
        }
    }
}

pub(super) fn alpha_blend(first: Pixel, second: Pixel, eva: u16, evb: u16) -> Pixel {
    let alpha_blend_component =
        |first: u16, second: u16| cmp::min(31, (eva * first + evb * second) >> 4);

    let r = alpha_blend_component(first.red(), second.red());
    let g = alpha_blend_component(first.green(), second.green());
    let b = alpha_blend_component(first.blue(), second.blue());

    Pixel::new_opaque_rgb(r, g, b)
}

pub(super) fn adjust_brightness<const INCREASE: bool>(color: Pixel, evy: u16) -> Pixel {
    let adjust_component = |component: u16| {
        if INCREASE {
            component + ((evy * (31 - component)) >> 4)
        } else {
            component - ((evy * component) >> 4)
        }
    };

    let r = adjust_component(color.red());
    let g = adjust_component(color.green());
    let b = adjust_component(color.blue());

    Pixel::new_opaque_rgb(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn full_weight_alpha_returns_one_input() {
        let first = Pixel(0x1234 & 0x7FFF);
        let second = Pixel::new_opaque(0x4321);

        assert_eq!(alpha_blend(first, second, 16, 0), Pixel::new_opaque(0x1234));
        assert_eq!(alpha_blend(first, second, 0, 16), Pixel::new_opaque(0x4321));
    }

    #[test]
    fn alpha_blend_clamps_each_channel() {
        let white = Pixel::new_opaque(0x7FFF);
        assert_eq!(alpha_blend(white, white, 16, 16), Pixel::new_opaque(0x7FFF));
    }

    #[test]
    fn full_brightness_adjustment_saturates() {
        let color = Pixel::new_opaque_rgb(3, 17, 29);

        assert_eq!(adjust_brightness::<true>(color, 16), Pixel::new_opaque(0x7FFF));
        assert_eq!(adjust_brightness::<false>(color, 16), Pixel::new_opaque(0x0000));
        assert_eq!(adjust_brightness::<true>(color, 0), color);
    }
}
