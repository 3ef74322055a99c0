use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;

use crate::{
    core::color::Color,
    integrator::{Integrator, IntegratorT, PathTracer},
    renderer::{sample_record::SampleRecord, tile::ImageTile, RenderStatus},
    sampler::{hash32, Sampler, SamplerT, SobolSampler, UniformSampler},
    scene::Scene,
    thread_pool::{GroupOutcome, TaskGroup, ThreadPool},
};

pub const TILE_SIZE: u32 = 16;
pub const VARIANCE_TILE_SIZE: u32 = 4;
/// Uniform warm-up passes before adaptive redistribution kicks in.
pub const ADAPTIVE_THRESHOLD: u32 = 16;

const DRIVER_SEED: u32 = 0x1ceb_00da;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Preparing,
    Running,
    Aborting,
}

/// Progressive tiled render driver. Owns the tile decomposition, the
/// per-cell sample records and the per-worker integrator clones; dispatches
/// one task per tile into the pool for every progressive pass.
pub struct Renderer {
    scene: Arc<Scene>,
    pool: Arc<ThreadPool>,
    integrators: Vec<Mutex<Integrator>>,
    tiles: Vec<Mutex<ImageTile>>,
    records: Vec<Mutex<SampleRecord>>,
    w: u32,
    h: u32,
    variance_w: u32,
    variance_h: u32,
    driver_sampler: Mutex<UniformSampler>,
    abort_flag: AtomicBool,
    group: Mutex<Option<Arc<TaskGroup>>>,
    state: Mutex<RenderState>,
}

impl Renderer {
    pub fn new(scene: Arc<Scene>, pool: Arc<ThreadPool>) -> Arc<Self> {
        let resolution = scene.camera.resolution();
        let w = resolution.x;
        let h = resolution.y;
        let variance_w = (w + VARIANCE_TILE_SIZE - 1) / VARIANCE_TILE_SIZE;
        let variance_h = (h + VARIANCE_TILE_SIZE - 1) / VARIANCE_TILE_SIZE;

        let integrators = (0..pool.thread_count())
            .map(|_| Mutex::new(Integrator::from(PathTracer::new(scene.settings.max_bounces))))
            .collect();

        let mut driver_sampler = UniformSampler::new(DRIVER_SEED);
        let tiles = Self::dice_tiles(&scene, w, h, &mut driver_sampler);
        let records = (0..variance_w * variance_h)
            .map(|_| Mutex::new(SampleRecord::new()))
            .collect();

        Arc::new(Self {
            scene,
            pool,
            integrators,
            tiles,
            records,
            w,
            h,
            variance_w,
            variance_h,
            driver_sampler: Mutex::new(driver_sampler),
            abort_flag: AtomicBool::new(false),
            group: Mutex::new(None),
            state: Mutex::new(RenderState::Idle),
        })
    }

    fn dice_tiles(
        scene: &Scene,
        w: u32,
        h: u32,
        driver_sampler: &mut UniformSampler,
    ) -> Vec<Mutex<ImageTile>> {
        let mut tiles = Vec::new();
        for y in (0..h).step_by(TILE_SIZE as usize) {
            for x in (0..w).step_by(TILE_SIZE as usize) {
                let sampler = if scene.settings.use_sobol {
                    Sampler::from(SobolSampler::new())
                } else {
                    Sampler::from(UniformSampler::new(hash32(driver_sampler.next_seed())))
                };
                let supplemental =
                    Sampler::from(UniformSampler::new(hash32(driver_sampler.next_seed())));
                tiles.push(Mutex::new(ImageTile::new(
                    x,
                    y,
                    TILE_SIZE.min(w - x),
                    TILE_SIZE.min(h - y),
                    sampler,
                    supplemental,
                )));
            }
        }
        tiles
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.w, self.h)
    }

    pub fn variance_resolution(&self) -> (u32, u32) {
        (self.variance_w, self.variance_h)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn state(&self) -> RenderState {
        *self.state.lock().unwrap()
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub(crate) fn record_snapshot(&self) -> Vec<SampleRecord> {
        self.records.iter().map(|r| *r.lock().unwrap()).collect()
    }

    pub(crate) fn restore_records(&self, records: &[SampleRecord]) {
        for (slot, restored) in self.records.iter().zip(records) {
            *slot.lock().unwrap() = *restored;
        }
    }

    /// Total non-finite estimates that were clamped to zero.
    pub fn rejected_sample_count(&self) -> u64 {
        self.tiles
            .iter()
            .map(|t| t.lock().unwrap().rejected_samples)
            .sum()
    }

    /// 95th percentile of the per-cell error estimates; refreshes every
    /// record's adaptive weight along the way. Zero means converged.
    fn error_percentile_95(&self) -> f32 {
        let mut errors = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let mut record = record.lock().unwrap();
            record.adaptive_weight = record.error_estimate();
            if record.adaptive_weight > 0.0 {
                errors.push(record.adaptive_weight);
            }
        }
        if errors.is_empty() {
            return 0.0;
        }
        errors.sort_by(f32::total_cmp);
        errors[(errors.len() * 95) / 100]
    }

    /// Two sequential passes of a 4-neighbor max filter: forward (pulling
    /// from right/below) then backward (pulling from left/above). Not a true
    /// 3x3 dilation; the second pass reads first-pass results, so the mask
    /// widens asymmetrically along the scan direction.
    fn dilate_adaptive_weights(&self) {
        let w = self.variance_w as usize;
        let h = self.variance_h as usize;
        let mut weights: Vec<f32> = self
            .records
            .iter()
            .map(|r| r.lock().unwrap().adaptive_weight)
            .collect();

        for y in 0..h {
            for x in 0..w {
                let idx = x + y * w;
                if y < h - 1 {
                    weights[idx] = weights[idx].max(weights[idx + w]);
                }
                if x < w - 1 {
                    weights[idx] = weights[idx].max(weights[idx + 1]);
                }
            }
        }
        for y in (0..h).rev() {
            for x in (0..w).rev() {
                let idx = x + y * w;
                if y > 0 {
                    weights[idx] = weights[idx].max(weights[idx - w]);
                }
                if x > 0 {
                    weights[idx] = weights[idx].max(weights[idx - 1]);
                }
            }
        }

        for (record, weight) in self.records.iter().zip(weights) {
            record.lock().unwrap().adaptive_weight = weight;
        }
    }

    /// Splits the adaptive budget across cells proportionally to their
    /// dilated weights, with stochastic rounding through a fractional
    /// accumulator. Every cell keeps a +1 floor so no region starves.
    fn distribute_adaptive_samples(&self, spp_count: u32) {
        let mut total_weight = 0.0f64;
        for record in &self.records {
            total_weight += f64::from(record.lock().unwrap().adaptive_weight);
        }

        let adaptive_budget = i64::from(spp_count - 1) * i64::from(self.w) * i64::from(self.h);
        let budget_per_tile =
            adaptive_budget / i64::from(VARIANCE_TILE_SIZE * VARIANCE_TILE_SIZE);
        let weight_to_sample_factor = budget_per_tile as f64 / total_weight;

        let mut driver_sampler = self.driver_sampler.lock().unwrap();
        let mut pixel_pdf = 0.0f32;
        for record in &self.records {
            let mut record = record.lock().unwrap();
            let fractional = record.adaptive_weight * weight_to_sample_factor as f32;
            let mut adaptive_samples = fractional as u32;
            pixel_pdf += fractional - adaptive_samples as f32;
            if driver_sampler.next_1d() < pixel_pdf {
                adaptive_samples += 1;
                pixel_pdf -= 1.0;
            }
            record.next_sample_count = adaptive_samples + 1;
        }
    }

    /// Plans the next pass. Returns false when adaptive sampling finds the
    /// whole image converged, meaning no work remains.
    pub fn generate_work(&self, spp_from: u32, spp_to: u32) -> bool {
        for record in &self.records {
            let mut record = record.lock().unwrap();
            record.sample_index += record.next_sample_count;
        }

        let spp_count = spp_to - spp_from;
        let enable_adaptive = self.scene.settings.use_adaptive_sampling;

        if enable_adaptive && spp_from >= ADAPTIVE_THRESHOLD {
            let max_error = self.error_percentile_95();
            if max_error == 0.0 {
                return false;
            }

            for record in &self.records {
                let mut record = record.lock().unwrap();
                record.adaptive_weight = record.adaptive_weight.min(max_error);
            }

            self.dilate_adaptive_weights();
            self.distribute_adaptive_samples(spp_count);
        } else {
            for record in &self.records {
                record.lock().unwrap().next_sample_count = spp_count;
            }
        }

        true
    }

    fn render_tile(&self, worker_id: u32, tile_id: u32) {
        let mut tile = self.tiles[tile_id as usize].lock().unwrap();
        let tile = &mut *tile;
        let mut integrator = self.integrators[worker_id as usize].lock().unwrap();

        for y in 0..tile.h {
            for x in 0..tile.w {
                // Cooperative cancellation, checked between pixels.
                if self.abort_flag.load(Ordering::Relaxed) {
                    return;
                }

                let px = tile.x + x;
                let py = tile.y + y;
                let pixel_index = px + py * self.w;
                let cell = px / VARIANCE_TILE_SIZE
                    + (py / VARIANCE_TILE_SIZE) * self.variance_w;

                let mut record = self.records[cell as usize].lock().unwrap();
                let spp = record.next_sample_count;
                let mut c = Color::BLACK;
                for i in 0..spp {
                    tile.sampler.setup(pixel_index, record.sample_index + i);
                    let mut s = integrator.trace_sample(
                        &self.scene,
                        glam::UVec2::new(px, py),
                        &mut tile.sampler,
                        &mut tile.supplemental_sampler,
                    );
                    if !s.is_finite() {
                        s = Color::BLACK;
                        tile.rejected_samples += 1;
                    }
                    record.add_sample(s);
                    c += s;
                }
                drop(record);

                self.scene.camera.add_samples(px, py, c, spp);
            }
        }
    }

    /// Plans and dispatches one progressive pass. The callback fires exactly
    /// once: immediately when the image is already converged, otherwise when
    /// the pass finishes, aborts or fails.
    pub fn start_render(
        self: &Arc<Self>,
        on_done: impl FnOnce(RenderStatus) + Send + 'static,
        spp_from: u32,
        spp_to: u32,
    ) {
        *self.state.lock().unwrap() = RenderState::Preparing;

        if !self.generate_work(spp_from, spp_to) {
            *self.state.lock().unwrap() = RenderState::Idle;
            on_done(RenderStatus::Finished);
            return;
        }

        self.abort_flag.store(false, Ordering::SeqCst);
        *self.state.lock().unwrap() = RenderState::Running;

        let task_renderer = Arc::clone(self);
        let done_renderer = Arc::clone(self);
        let group = self.pool.enqueue(
            move |_group_id, tile_id, worker_id| {
                task_renderer.render_tile(worker_id, tile_id);
            },
            self.tiles.len() as u32,
            move |outcome| {
                *done_renderer.state.lock().unwrap() = RenderState::Idle;
                on_done(match outcome {
                    GroupOutcome::Finished => RenderStatus::Finished,
                    GroupOutcome::Aborted => RenderStatus::Aborted,
                    GroupOutcome::Failed(message) => RenderStatus::Failed(message),
                });
            },
        );
        *self.group.lock().unwrap() = Some(group);
    }

    pub fn wait_for_completion(&self) {
        let group = self.group.lock().unwrap().clone();
        if let Some(group) = group {
            group.wait();
        }
    }

    /// Cooperative cancel: pending tiles are dropped, in-flight tiles bail
    /// out at the next pixel boundary. Idempotent; already-splatted samples
    /// stay in the film.
    pub fn abort_render(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == RenderState::Running {
                *state = RenderState::Aborting;
            }
        }
        self.abort_flag.store(true, Ordering::SeqCst);
        let group = self.group.lock().unwrap().clone();
        if let Some(group) = group {
            group.abort();
            group.wait();
        }
        let mut state = self.state.lock().unwrap();
        if *state == RenderState::Aborting {
            *state = RenderState::Idle;
        }
    }

    /// Per-cell error estimates coded to [0, 1], where 1 is the 95th
    /// percentile (the adaptive clamp point).
    pub fn variance_image(&self) -> (Vec<f32>, u32, u32) {
        let max_error = self.error_percentile_95().max(1e-5);
        let data = self
            .records
            .iter()
            .map(|r| (r.lock().unwrap().error_estimate() / max_error).clamp(0.0, 1.0))
            .collect();
        (data, self.variance_w, self.variance_h)
    }

    pub fn write_variance_png(&self, path: &Path) -> anyhow::Result<()> {
        let (data, w, h) = self.variance_image();
        let mut image = image::GrayImage::new(w, h);
        for (i, v) in data.iter().enumerate() {
            let x = i as u32 % w;
            let y = i as u32 / w;
            image.put_pixel(x, y, image::Luma([(v * 255.0) as u8]));
        }
        image
            .save(path)
            .with_context(|| format!("failed to write error image to '{}'", path.display()))
    }
}

/// Next progressive checkpoint: doubling passes, clamped to the target.
pub fn sample_step(current: u32, target: u32) -> u32 {
    if current == 0 {
        return target.min(ADAPTIVE_THRESHOLD);
    }
    target.min(current * 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, CameraParameters};
    use crate::primitive::Quad;
    use crate::scene::RendererSettings;
    use crate::texture::ConstantTexture;
    use std::time::{Duration, Instant};

    fn build_scene(resolution: u32, settings: RendererSettings, emissive: bool) -> Arc<Scene> {
        let camera = Camera::new(CameraParameters {
            eye: glam::Vec3A::ZERO,
            forward: -glam::Vec3A::Z,
            up: glam::Vec3A::Y,
            fov_deg: 60.0,
            resolution: glam::UVec2::new(resolution, resolution),
        });
        let black: std::sync::Arc<crate::texture::Texture> =
            std::sync::Arc::new(ConstantTexture::new(Color::BLACK).into());
        let bsdfs: Vec<std::sync::Arc<crate::bsdf::Bsdf>> = vec![std::sync::Arc::new(
            crate::bsdf::LambertBsdf::new(std::sync::Arc::clone(&black)).into(),
        )];
        let mut primitives = Vec::new();
        if emissive {
            let quad = Quad::new(
                glam::Vec3A::new(-2.0, -2.0, -1.0),
                glam::Vec3A::new(4.0, 0.0, 0.0),
                glam::Vec3A::new(0.0, 4.0, 0.0),
                0,
            )
            .with_emission(std::sync::Arc::new(
                ConstantTexture::new(Color::WHITE).into(),
            ));
            primitives.push(quad.into());
        }
        let mut scene = Scene::new(primitives, bsdfs, Vec::new(), camera, settings);
        scene.prepare_for_render();
        Arc::new(scene)
    }

    fn sum_next_sample_counts(renderer: &Renderer) -> u64 {
        renderer
            .records
            .iter()
            .map(|r| u64::from(r.lock().unwrap().next_sample_count))
            .sum()
    }

    #[test]
    fn test_tile_decomposition_covers_image() {
        let scene = build_scene(40, RendererSettings::default(), false);
        let pool = Arc::new(ThreadPool::new(2));
        let renderer = Renderer::new(scene, pool);
        // 40 = 2 * 16 + 8, so 3x3 tiles.
        assert_eq!(renderer.tile_count(), 9);
        let covered: u32 = renderer
            .tiles
            .iter()
            .map(|t| {
                let t = t.lock().unwrap();
                t.w * t.h
            })
            .sum();
        assert_eq!(covered, 40 * 40);
    }

    #[test]
    fn test_uniform_budget_is_exact() {
        let settings = RendererSettings {
            use_adaptive_sampling: false,
            ..RendererSettings::default()
        };
        let scene = build_scene(32, settings, false);
        let pool = Arc::new(ThreadPool::new(1));
        let renderer = Renderer::new(scene, pool);

        assert!(renderer.generate_work(0, 16));
        // Each cell gets spp_count; cells * cell_area == pixels.
        let per_cell: u64 = sum_next_sample_counts(&renderer);
        let cells = (renderer.variance_w * renderer.variance_h) as u64;
        assert_eq!(per_cell, 16 * cells);
        assert_eq!(
            per_cell * u64::from(VARIANCE_TILE_SIZE * VARIANCE_TILE_SIZE),
            16 * 32 * 32
        );
    }

    #[test]
    fn test_adaptive_budget_is_conserved_and_floored() {
        let settings = RendererSettings {
            use_adaptive_sampling: true,
            ..RendererSettings::default()
        };
        let scene = build_scene(32, settings, false);
        let pool = Arc::new(ThreadPool::new(1));
        let renderer = Renderer::new(scene, pool);
        let vw = renderer.variance_w as usize;

        // Four noisy cells spread across an otherwise nearly-converged
        // image. Keeping them within the top 5% means the percentile clamp
        // leaves their weights intact.
        let hot_cells = [1 + vw, 5 + vw, 1 + 5 * vw, 5 + 5 * vw];
        for (i, record) in renderer.records.iter().enumerate() {
            let mut record = record.lock().unwrap();
            for k in 0..32 {
                let v = if hot_cells.contains(&i) {
                    if k % 2 == 0 {
                        0.0
                    } else {
                        20.0
                    }
                } else if k % 2 == 0 {
                    0.999
                } else {
                    1.001
                };
                record.add_sample(Color::gray(v));
            }
        }

        assert!(renderer.generate_work(16, 32));

        let spp_count = 16u64;
        let w = 32u64;
        let cell_area = u64::from(VARIANCE_TILE_SIZE * VARIANCE_TILE_SIZE);
        let total_pixel_samples = sum_next_sample_counts(&renderer) * cell_area;
        let uniform_total = spp_count * w * w;
        assert!(
            total_pixel_samples.abs_diff(uniform_total) <= w * w,
            "adaptive total {} vs uniform {}",
            total_pixel_samples,
            uniform_total
        );

        // Every cell keeps the +1 floor.
        for record in &renderer.records {
            assert!(record.lock().unwrap().next_sample_count >= 1);
        }

        // The hot cells plus their dilated crosses soak up nearly the whole
        // adaptive budget.
        let mut hot_region = 0u64;
        for &i in &hot_cells {
            for idx in [i, i - 1, i + 1, i - vw, i + vw] {
                hot_region +=
                    u64::from(renderer.records[idx].lock().unwrap().next_sample_count - 1);
            }
        }
        let adaptive_budget = (spp_count - 1) * w * w / cell_area;
        assert!(
            hot_region * 10 >= adaptive_budget * 9,
            "hot region got {} of {}",
            hot_region,
            adaptive_budget
        );
    }

    #[test]
    fn test_converged_image_generates_no_work() {
        let settings = RendererSettings {
            use_adaptive_sampling: true,
            ..RendererSettings::default()
        };
        let scene = build_scene(16, settings, false);
        let pool = Arc::new(ThreadPool::new(1));
        let renderer = Renderer::new(scene, pool);

        // All records converged (constant samples, zero variance).
        for record in &renderer.records {
            let mut record = record.lock().unwrap();
            for _ in 0..32 {
                record.add_sample(Color::gray(0.5));
            }
        }
        assert!(!renderer.generate_work(16, 32));
    }

    #[test]
    fn test_dilation_spreads_maxima_to_neighbors() {
        let scene = build_scene(32, RendererSettings::default(), false);
        let pool = Arc::new(ThreadPool::new(1));
        let renderer = Renderer::new(scene, pool);
        let w = renderer.variance_w as usize;

        for (i, record) in renderer.records.iter().enumerate() {
            record.lock().unwrap().adaptive_weight = if i == 3 + 3 * w { 1.0 } else { 0.0 };
        }
        renderer.dilate_adaptive_weights();

        let weight = |x: usize, y: usize| {
            renderer.records[x + y * w].lock().unwrap().adaptive_weight
        };
        // All 4-neighbors see the maximum after the two passes.
        assert_eq!(weight(3, 3), 1.0);
        assert_eq!(weight(2, 3), 1.0);
        assert_eq!(weight(4, 3), 1.0);
        assert_eq!(weight(3, 2), 1.0);
        assert_eq!(weight(3, 4), 1.0);
        // Far cells stay untouched.
        assert_eq!(weight(7, 7), 0.0);
    }

    #[test]
    fn test_empty_scene_renders_black_and_converged() {
        let settings = RendererSettings {
            use_adaptive_sampling: true,
            use_sobol: false,
            ..RendererSettings::default()
        };
        let scene = build_scene(4, settings, false);
        let pool = Arc::new(ThreadPool::new(2));
        let renderer = Renderer::new(Arc::clone(&scene), pool);

        renderer.start_render(|status| assert_eq!(status, RenderStatus::Finished), 0, 16);
        renderer.wait_for_completion();

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(scene.camera.film().sample_count(x, y), 16);
                assert!(scene.camera.film().pixel_sum(x, y).is_black());
            }
        }
        let (variance, _, _) = renderer.variance_image();
        assert!(variance.iter().all(|&v| v == 0.0));

        // The next adaptive pass detects convergence immediately.
        let done = Arc::new(AtomicBool::new(false));
        let done_cb = Arc::clone(&done);
        renderer.start_render(
            move |status| {
                assert_eq!(status, RenderStatus::Finished);
                done_cb.store(true, Ordering::SeqCst);
            },
            16,
            32,
        );
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_render_determinism_across_runs_and_thread_counts() {
        let settings = RendererSettings {
            use_adaptive_sampling: false,
            use_sobol: true,
            ..RendererSettings::default()
        };

        // Samplers belong to tiles, not workers, and each pixel is written
        // by exactly one tile, so the thread count must not matter.
        let mut buffers = Vec::new();
        for thread_count in [4, 4, 1] {
            let scene = build_scene(40, settings.clone(), true);
            let pool = Arc::new(ThreadPool::new(thread_count));
            let renderer = Renderer::new(Arc::clone(&scene), pool);
            renderer.start_render(|_| {}, 0, 8);
            renderer.wait_for_completion();
            let buffer: Vec<u32> = scene
                .camera
                .film()
                .develop()
                .iter()
                .flat_map(|c| [c.r.to_bits(), c.g.to_bits(), c.b.to_bits()])
                .collect();
            buffers.push(buffer);
        }
        assert_eq!(buffers[0], buffers[1]);
        assert_eq!(buffers[0], buffers[2]);
    }

    #[test]
    fn test_abort_mid_render_returns_promptly() {
        let settings = RendererSettings {
            use_adaptive_sampling: false,
            max_bounces: 32,
            ..RendererSettings::default()
        };
        let scene = build_scene(256, settings, true);
        let pool = Arc::new(ThreadPool::new(2));
        let renderer = Renderer::new(Arc::clone(&scene), pool);

        let status: Arc<Mutex<Option<RenderStatus>>> = Arc::new(Mutex::new(None));
        let status_cb = Arc::clone(&status);
        renderer.start_render(
            move |s| {
                *status_cb.lock().unwrap() = Some(s);
            },
            0,
            1024,
        );

        std::thread::sleep(Duration::from_millis(50));
        let abort_started = Instant::now();
        renderer.abort_render();
        // Idempotent.
        renderer.abort_render();
        assert!(abort_started.elapsed() < Duration::from_millis(500));
        assert_eq!(*status.lock().unwrap(), Some(RenderStatus::Aborted));
        assert_eq!(renderer.state(), RenderState::Idle);

        // Whatever was splatted remains finite.
        for c in scene.camera.film().develop() {
            assert!(c.is_finite());
        }
    }
}
