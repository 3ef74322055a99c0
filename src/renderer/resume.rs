//! Resume blobs: the radiance buffer plus all sample-record fields, enough
//! to continue a progressive render from its last completed pass.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use byte_slice_cast::{AsByteSlice, AsMutByteSlice};

use crate::core::color::Color;
use crate::renderer::{Renderer, SampleRecord};

const MAGIC: u32 = 0x544e_5331; // "TNS1"

impl Renderer {
    /// Writes the current film and record state, tagged with the spp the
    /// render has progressed to.
    pub fn save_resume(&self, path: &Path, current_spp: u32) -> anyhow::Result<()> {
        let (w, h) = self.resolution();
        let film = self.scene().camera.film();

        let mut words: Vec<u32> = vec![MAGIC, w, h, current_spp];

        for y in 0..h {
            for x in 0..w {
                let sum = film.pixel_sum(x, y);
                words.push(sum.r.to_bits());
                words.push(sum.g.to_bits());
                words.push(sum.b.to_bits());
                words.push(film.sample_count(x, y));
            }
        }

        for record in self.record_snapshot() {
            words.push(record.sample_index);
            words.push(record.next_sample_count);
            words.push(record.sample_count);
            words.push(record.mean.to_bits());
            words.push(record.m2.to_bits());
        }

        std::fs::write(path, words.as_byte_slice())
            .with_context(|| format!("failed to write resume state to '{}'", path.display()))
    }

    /// Restores film and records from a blob; returns the spp to continue
    /// from. Fails when the blob does not match this renderer's resolution.
    pub fn load_resume(&self, path: &Path) -> anyhow::Result<u32> {
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("failed to read resume state from '{}'", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("failed to stat '{}'", path.display()))?
            .len() as usize;
        if len % 4 != 0 {
            bail!("resume state is truncated");
        }
        let mut words = vec![0u32; len / 4];
        file.read_exact(words.as_mut_byte_slice())
            .with_context(|| format!("failed to read resume state from '{}'", path.display()))?;

        let (w, h) = self.resolution();
        let (vw, vh) = self.variance_resolution();
        let expected = 4 + (w * h * 4) as usize + (vw * vh * 5) as usize;
        if words.len() != expected || words[0] != MAGIC {
            bail!("resume state is malformed or from a different scene");
        }
        if words[1] != w || words[2] != h {
            bail!(
                "resume state is {}x{} but the scene renders at {}x{}",
                words[1],
                words[2],
                w,
                h
            );
        }
        let current_spp = words[3];

        let film = self.scene().camera.film();
        let mut cursor = 4;
        for y in 0..h {
            for x in 0..w {
                let sum = Color::new(
                    f32::from_bits(words[cursor]),
                    f32::from_bits(words[cursor + 1]),
                    f32::from_bits(words[cursor + 2]),
                );
                film.set_pixel(x, y, sum, words[cursor + 3]);
                cursor += 4;
            }
        }

        let mut records = Vec::with_capacity((vw * vh) as usize);
        for _ in 0..vw * vh {
            records.push(SampleRecord {
                sample_index: words[cursor],
                next_sample_count: words[cursor + 1],
                sample_count: words[cursor + 2],
                mean: f32::from_bits(words[cursor + 3]),
                m2: f32::from_bits(words[cursor + 4]),
                adaptive_weight: 0.0,
            });
            cursor += 5;
        }
        self.restore_records(&records);

        Ok(current_spp)
    }
}
