use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;

use crate::core::color::Color;

/// Per-pixel radiance sums and sample counts. Writers operate through shared
/// references: tiles partition the image so contention is rare, but abutting
/// tiles stay safe because every add is atomic.
#[derive(Debug)]
pub struct Film {
    width: u32,
    height: u32,
    // f32 bit patterns, added with a compare-exchange loop.
    pixels: Vec<[AtomicU32; 3]>,
    counts: Vec<AtomicU32>,
}

fn atomic_add_f32(cell: &AtomicU32, value: f32) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let next = (f32::from_bits(current) + value).to_bits();
        match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

impl Film {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            pixels: (0..len).map(|_| Default::default()).collect(),
            counts: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index_of(&self, x: u32, y: u32) -> usize {
        (x + y * self.width) as usize
    }

    pub fn add_samples(&self, x: u32, y: u32, sum: Color, count: u32) {
        let idx = self.index_of(x, y);
        let px = &self.pixels[idx];
        atomic_add_f32(&px[0], sum.r);
        atomic_add_f32(&px[1], sum.g);
        atomic_add_f32(&px[2], sum.b);
        self.counts[idx].fetch_add(count, Ordering::Relaxed);
    }

    pub fn pixel_sum(&self, x: u32, y: u32) -> Color {
        let px = &self.pixels[self.index_of(x, y)];
        Color::new(
            f32::from_bits(px[0].load(Ordering::Relaxed)),
            f32::from_bits(px[1].load(Ordering::Relaxed)),
            f32::from_bits(px[2].load(Ordering::Relaxed)),
        )
    }

    pub fn sample_count(&self, x: u32, y: u32) -> u32 {
        self.counts[self.index_of(x, y)].load(Ordering::Relaxed)
    }

    /// Converged pixel colors: sum divided by count.
    pub fn develop(&self) -> Vec<Color> {
        (0..self.width * self.height)
            .map(|i| {
                let x = i % self.width;
                let y = i / self.width;
                let n = self.sample_count(x, y);
                if n == 0 {
                    Color::BLACK
                } else {
                    self.pixel_sum(x, y) / n as f32
                }
            })
            .collect()
    }

    /// Overwrites one pixel; used when restoring a resume blob.
    pub fn set_pixel(&self, x: u32, y: u32, sum: Color, count: u32) {
        let idx = self.index_of(x, y);
        self.pixels[idx][0].store(sum.r.to_bits(), Ordering::Relaxed);
        self.pixels[idx][1].store(sum.g.to_bits(), Ordering::Relaxed);
        self.pixels[idx][2].store(sum.b.to_bits(), Ordering::Relaxed);
        self.counts[idx].store(count, Ordering::Relaxed);
    }

    pub fn write_png(&self, path: &Path) -> anyhow::Result<()> {
        let developed = self.develop();
        let mut image = image::RgbImage::new(self.width, self.height);
        for (i, c) in developed.iter().enumerate() {
            let x = i as u32 % self.width;
            let y = i as u32 / self.width;
            image.put_pixel(x, y, tonemap(*c));
        }
        image
            .save(path)
            .with_context(|| format!("failed to write image to '{}'", path.display()))
    }

    pub fn write_hdr(&self, path: &Path) -> anyhow::Result<()> {
        let developed = self.develop();
        let file = File::create(path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;
        let encoder = image::codecs::hdr::HdrEncoder::new(BufWriter::new(file));
        let data: Vec<image::Rgb<f32>> = developed
            .iter()
            .map(|c| image::Rgb([c.r, c.g, c.b]))
            .collect();
        encoder
            .encode(&data, self.width as usize, self.height as usize)
            .with_context(|| format!("failed to write radiance data to '{}'", path.display()))
    }
}

fn tonemap(c: Color) -> image::Rgb<u8> {
    let to_srgb = |v: f32| (v.max(0.0).powf(1.0 / 2.2) * 255.0).clamp(0.0, 255.0) as u8;
    image::Rgb([to_srgb(c.r), to_srgb(c.g), to_srgb(c.b)])
}
