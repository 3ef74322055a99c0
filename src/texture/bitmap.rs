use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;

use crate::core::{color::Color, distribution::Distribution2D};

use super::{MapJacobian, TextureT};

/// Backing storage of a bitmap: 8-bit or float texels, scalar or RGB.
#[derive(Debug)]
enum Texels {
    ScalarLdr(Vec<u8>),
    ScalarHdr(Vec<f32>),
    RgbLdr(Vec<[u8; 3]>),
    RgbHdr(Vec<Color>),
}

#[derive(Debug)]
pub struct BitmapTexture {
    texels: Texels,
    w: usize,
    h: usize,
    linear: bool,
    clamp: bool,
    min: Color,
    max: Color,
    avg: Color,
    // One importance-sampling table per jacobian, built on demand and
    // published exactly once.
    distributions: [OnceLock<Distribution2D>; 2],
}

impl BitmapTexture {
    pub fn new(texels_rgb: Vec<Color>, w: usize, h: usize, linear: bool, clamp: bool) -> Self {
        assert_eq!(texels_rgb.len(), w * h);
        Self::from_texels(Texels::RgbHdr(texels_rgb), w, h, linear, clamp)
    }

    pub fn new_scalar(texels: Vec<f32>, w: usize, h: usize, linear: bool, clamp: bool) -> Self {
        assert_eq!(texels.len(), w * h);
        Self::from_texels(Texels::ScalarHdr(texels), w, h, linear, clamp)
    }

    pub fn new_scalar_ldr(texels: Vec<u8>, w: usize, h: usize, linear: bool, clamp: bool) -> Self {
        assert_eq!(texels.len(), w * h);
        Self::from_texels(Texels::ScalarLdr(texels), w, h, linear, clamp)
    }

    /// Decodes an image file. Radiance `.hdr` and OpenEXR-float inputs keep
    /// full range; everything else is 8-bit sRGB converted to linear.
    pub fn load(path: &Path, linear: bool, clamp: bool) -> anyhow::Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode texture at '{}'", path.display()))?;
        let w = image.width() as usize;
        let h = image.height() as usize;

        let hdr = matches!(
            image.color(),
            image::ColorType::Rgb32F | image::ColorType::Rgba32F
        );
        let texels = if hdr {
            let rgb = image.to_rgb32f();
            Texels::RgbHdr(
                rgb.pixels()
                    .map(|p| Color::new(p[0], p[1], p[2]))
                    .collect(),
            )
        } else {
            let rgb = image.to_rgb8();
            Texels::RgbLdr(
                rgb.pixels()
                    .map(|p| [srgb_to_linear(p[0]), srgb_to_linear(p[1]), srgb_to_linear(p[2])])
                    .collect(),
            )
        };

        Ok(Self::from_texels(texels, w, h, linear, clamp))
    }

    fn from_texels(texels: Texels, w: usize, h: usize, linear: bool, clamp: bool) -> Self {
        let mut tex = Self {
            texels,
            w,
            h,
            linear,
            clamp,
            min: Color::BLACK,
            max: Color::BLACK,
            avg: Color::BLACK,
            distributions: [OnceLock::new(), OnceLock::new()],
        };

        let mut min = tex.get_rgb(0, 0);
        let mut max = min;
        let mut avg = Color::BLACK;
        let norm = 1.0 / (w * h) as f32;
        for y in 0..h {
            for x in 0..w {
                let c = tex.get_rgb(x, y);
                min = min.min_elementwise(c);
                max = max.max_elementwise(c);
                avg += c * norm;
            }
        }
        tex.min = min;
        tex.max = max;
        tex.avg = avg;
        tex
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn height(&self) -> usize {
        self.h
    }

    fn is_rgb(&self) -> bool {
        matches!(self.texels, Texels::RgbLdr(_) | Texels::RgbHdr(_))
    }

    fn get_scalar(&self, x: usize, y: usize) -> f32 {
        let idx = x + y * self.w;
        match &self.texels {
            Texels::ScalarLdr(t) => f32::from(t[idx]) * (1.0 / 255.0),
            Texels::ScalarHdr(t) => t[idx],
            Texels::RgbLdr(t) => {
                let [r, g, b] = t[idx];
                (f32::from(r) + f32::from(g) + f32::from(b)) * (1.0 / (3.0 * 255.0))
            }
            Texels::RgbHdr(t) => t[idx].avg(),
        }
    }

    fn get_rgb(&self, x: usize, y: usize) -> Color {
        let idx = x + y * self.w;
        match &self.texels {
            Texels::ScalarLdr(t) => Color::gray(f32::from(t[idx]) * (1.0 / 255.0)),
            Texels::ScalarHdr(t) => Color::gray(t[idx]),
            Texels::RgbLdr(t) => {
                let [r, g, b] = t[idx];
                Color::new(f32::from(r), f32::from(g), f32::from(b)) * (1.0 / 255.0)
            }
            Texels::RgbHdr(t) => t[idx],
        }
    }

    /// Luminance-like weight a texel contributes to the sampling table.
    fn weight(&self, x: usize, y: usize) -> f32 {
        if self.is_rgb() {
            self.get_rgb(x, y).max_component()
        } else {
            self.get_scalar(x, y)
        }
    }

    fn wrap(v: i32, n: usize) -> usize {
        let n = n as i32;
        (((v % n) + n) % n) as usize
    }
}

impl TextureT for BitmapTexture {
    fn lookup(&self, uv: glam::Vec2) -> Color {
        let linear = self.linear && self.w > 1 && self.h > 1;
        let mut u = uv.x * self.w as f32;
        let mut v = (1.0 - uv.y) * self.h as f32;
        let mut iu = u as i32;
        let mut iv = v as i32;
        u -= iu as f32;
        v -= iv as f32;
        if !self.clamp {
            iu = Self::wrap(iu, self.w) as i32;
            iv = Self::wrap(iv, self.h) as i32;
        }
        let (iu, iv) = if linear {
            (
                iu.clamp(0, self.w as i32 - 2) as usize,
                iv.clamp(0, self.h as i32 - 2) as usize,
            )
        } else {
            (
                iu.clamp(0, self.w as i32 - 1) as usize,
                iv.clamp(0, self.h as i32 - 1) as usize,
            )
        };

        if !linear {
            return self.get_rgb(iu, iv);
        }

        let x00 = self.get_rgb(iu, iv);
        let x01 = self.get_rgb(iu + 1, iv);
        let x10 = self.get_rgb(iu, iv + 1);
        let x11 = self.get_rgb(iu + 1, iv + 1);
        Color::lerp(Color::lerp(x00, x01, u), Color::lerp(x10, x11, u), v)
    }

    fn derivatives(&self, uv: glam::Vec2) -> glam::Vec2 {
        let mut u = uv.x * self.w as f32 - 0.5;
        let mut v = (1.0 - uv.y) * self.h as f32 - 0.5;
        let iu = u as i32;
        let iv = v as i32;
        u -= iu as f32;
        v -= iv as f32;
        let iu = Self::wrap(iu, self.w);
        let iv = Self::wrap(iv, self.h);

        let x0 = if iu == 0 { self.w - 1 } else { iu - 1 };
        let x1 = iu;
        let x2 = (iu + 1) % self.w;
        let x3 = (iu + 2) % self.w;
        let y0 = if iv == 0 { self.h - 1 } else { iv - 1 };
        let y1 = iv;
        let y2 = (iv + 1) % self.h;
        let y3 = (iv + 2) % self.h;

        let value = |x: usize, y: usize| {
            if self.is_rgb() {
                self.get_rgb(x, y).avg()
            } else {
                self.get_scalar(x, y)
            }
        };

        // 12-tap footprint around the filter cell.
        let a01 = value(x1, y0);
        let a02 = value(x2, y0);
        let a10 = value(x0, y1);
        let a11 = value(x1, y1);
        let a12 = value(x2, y1);
        let a13 = value(x3, y1);
        let a20 = value(x0, y2);
        let a21 = value(x1, y2);
        let a22 = value(x2, y2);
        let a23 = value(x3, y2);
        let a31 = value(x1, y3);
        let a32 = value(x2, y3);

        let du11 = a12 - a10;
        let du12 = a13 - a11;
        let du21 = a22 - a20;
        let du22 = a23 - a21;
        let dv11 = a21 - a01;
        let dv12 = a22 - a02;
        let dv21 = a31 - a11;
        let dv22 = a32 - a12;

        let lerp2 =
            |x00: f32, x01: f32, x10: f32, x11: f32| -> f32 {
                (x00 * (1.0 - u) + x01 * u) * (1.0 - v) + (x10 * (1.0 - u) + x11 * u) * v
            };

        glam::Vec2::new(
            lerp2(du11, du12, du21, du22) * self.w as f32,
            lerp2(dv11, dv12, dv21, dv22) * self.h as f32,
        )
    }

    fn minimum(&self) -> Color {
        self.min
    }

    fn maximum(&self) -> Color {
        self.max
    }

    fn average(&self) -> Color {
        self.avg
    }

    fn is_constant(&self) -> bool {
        false
    }

    fn make_samplable(&self, jacobian: MapJacobian) {
        self.distributions[jacobian.index()].get_or_init(|| {
            let mut weights = vec![0.0f32; self.w * self.h];
            let mut idx = 0;
            for y in 0..self.h {
                let row_weight = if jacobian == MapJacobian::Spherical {
                    ((y as f32 * std::f32::consts::PI) / self.h as f32).sin()
                } else {
                    1.0
                };
                for x in 0..self.w {
                    // Cross filter: center weighted 4, the 4 wrap-around
                    // neighbors weighted 1, averaged by 1/8.
                    let w = self.weight(x, y) * 4.0
                        + self.weight((x + self.w - 1) % self.w, y)
                        + self.weight(x, (y + self.h - 1) % self.h)
                        + self.weight((x + 1) % self.w, y)
                        + self.weight(x, (y + 1) % self.h);
                    weights[idx] = w * 0.125 * row_weight;
                    idx += 1;
                }
            }
            Distribution2D::new(weights, self.w, self.h)
        });
    }

    fn sample(&self, jacobian: MapJacobian, u: glam::Vec2) -> glam::Vec2 {
        let dist = self.distributions[jacobian.index()]
            .get()
            .expect("sample called before make_samplable");
        let mut uv = u;
        let (row, col) = dist.warp(&mut uv);
        glam::Vec2::new(
            (uv.x + col as f32) / self.w as f32,
            1.0 - (uv.y + row as f32) / self.h as f32,
        )
    }

    fn pdf(&self, jacobian: MapJacobian, uv: glam::Vec2) -> f32 {
        let dist = self.distributions[jacobian.index()]
            .get()
            .expect("pdf called before make_samplable");
        let row = ((1.0 - uv.y) * self.h as f32) as usize;
        let col = (uv.x * self.w as f32) as usize;
        dist.pdf(row, col) * (self.w * self.h) as f32
    }
}

fn srgb_to_linear(v: u8) -> u8 {
    // Keeping 8-bit storage: decode gamma, round back. Matches LDR inputs
    // being display-referred while all shading runs in linear space.
    let f = f32::from(v) / 255.0;
    let linear = if f <= 0.04045 {
        f / 12.92
    } else {
        ((f + 0.055) / 1.055).powf(2.4)
    };
    (linear * 255.0 + 0.5) as u8
}
