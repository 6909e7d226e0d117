// src/color.rs
//
// Paint colour. Hue, saturation and brightness are read back as
// synthesis parameters rather than for display.

/// An 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::from_rgb(255, 255, 255);
    pub const TRANSPARENT_BLACK: Color = Color::from_rgba(0, 0, 0, 0);

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpack `0xAARRGGBB`.
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    /// Hue in `[0, 1)`. Greys have hue 0.
    pub fn hue(&self) -> f32 {
        let (r, g, b) = self.unit_rgb();
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        if delta <= 0.0 {
            return 0.0;
        }

        let sector = if max == r {
            (g - b) / delta
        } else if max == g {
            2.0 + (b - r) / delta
        } else {
            4.0 + (r - g) / delta
        };

        let hue = sector / 6.0;
        let hue = if hue < 0.0 { hue + 1.0 } else { hue };
        if hue >= 1.0 { 0.0 } else { hue }
    }

    /// HSB saturation in `[0, 1]`.
    pub fn saturation(&self) -> f32 {
        let (r, g, b) = self.unit_rgb();
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        if max <= 0.0 { 0.0 } else { (max - min) / max }
    }

    /// HSB brightness in `[0, 1]`.
    pub fn brightness(&self) -> f32 {
        let (r, g, b) = self.unit_rgb();
        r.max(g).max(b)
    }

    #[inline]
    fn unit_rgb(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_primary_hues() {
        assert_abs_diff_eq!(Color::from_rgb(255, 0, 0).hue(), 0.0);
        assert_abs_diff_eq!(Color::from_rgb(0, 255, 0).hue(), 1.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Color::from_rgb(0, 0, 255).hue(), 2.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Color::from_rgb(255, 0, 255).hue(), 5.0 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_grey_has_no_hue_or_saturation() {
        let grey = Color::from_rgb(128, 128, 128);
        assert_eq!(grey.hue(), 0.0);
        assert_eq!(grey.saturation(), 0.0);
        assert_abs_diff_eq!(grey.brightness(), 128.0 / 255.0);
    }

    #[test]
    fn test_argb_unpacking() {
        let color = Color::from_argb(0x80FF4000);
        assert_eq!(color, Color::from_rgba(0xFF, 0x40, 0x00, 0x80));
    }
}
