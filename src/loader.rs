//! Scene-document parsing. The renderer core only ever sees the fully
//! materialized `Scene`; everything here is plain JSON walking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use crate::{
    bsdf::{Bsdf, DielectricBsdf, LambertBsdf, MirrorBsdf, PlasticBsdf},
    camera::{Camera, CameraParameters},
    core::color::Color,
    primitive::{
        Disk, InfiniteSphere, InfiniteSphereCap, Primitive, Quad, Sphere, TriangleI, TriangleMesh,
        Vertex,
    },
    scene::{RendererSettings, Scene},
    texture::{BitmapTexture, CheckerTexture, ConstantTexture, Texture},
};

pub fn load(path: &Path) -> anyhow::Result<Scene> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open scene file '{}'", path.display()))?;
    let root: Value = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("scene file '{}' is not valid JSON", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let settings = parse_settings(get_object(&root, "scene", "renderer")?)?;
    let camera = parse_camera(get_object(&root, "scene", "camera")?)?;

    let mut builder = SceneBuilder {
        base_dir,
        textures: Vec::new(),
        texture_names: HashMap::new(),
        bsdfs: Vec::new(),
        bsdf_names: HashMap::new(),
    };

    if let Some(textures) = root.get("textures") {
        for entry in as_array(textures, "textures")? {
            builder.parse_texture(entry)?;
        }
    }
    if let Some(bsdfs) = root.get("bsdfs") {
        for entry in as_array(bsdfs, "bsdfs")? {
            builder.parse_bsdf(entry)?;
        }
    }

    let mut primitives = Vec::new();
    if let Some(prims) = root.get("primitives") {
        for entry in as_array(prims, "primitives")? {
            primitives.push(builder.parse_primitive(entry)?);
        }
    }

    Ok(Scene::new(
        primitives,
        builder.bsdfs,
        builder.textures,
        camera,
        settings,
    ))
}

struct SceneBuilder<'a> {
    base_dir: &'a Path,
    textures: Vec<Arc<Texture>>,
    texture_names: HashMap<String, usize>,
    bsdfs: Vec<Arc<Bsdf>>,
    bsdf_names: HashMap<String, usize>,
}

impl SceneBuilder<'_> {
    fn parse_texture(&mut self, entry: &Value) -> anyhow::Result<()> {
        let name = get_str(entry, "texture", "name")?;
        let env = format!("texture '{}'", name);
        let ty = get_str(entry, &env, "type")?;

        let texture: Texture = match ty {
            "constant" => ConstantTexture::new(get_color(entry, &env, "value")?).into(),
            "bitmap" => {
                let file = get_str(entry, &env, "file")?;
                let linear = get_bool_or(entry, &env, "interpolate", true)?;
                let clamp = get_bool_or(entry, &env, "clamp", false)?;
                BitmapTexture::load(&self.base_dir.join(file), linear, clamp)?.into()
            }
            "checker" => {
                let on = get_color_or(entry, &env, "on_color", Color::gray(0.8))?;
                let off = get_color_or(entry, &env, "off_color", Color::gray(0.2))?;
                let res_u = get_u32_or(entry, &env, "res_u", 20)?;
                let res_v = get_u32_or(entry, &env, "res_v", 20)?;
                CheckerTexture::new(on, off, res_u, res_v).into()
            }
            other => anyhow::bail!("{}: unknown type '{}'", env, other),
        };

        if self
            .texture_names
            .insert(name.to_owned(), self.textures.len())
            .is_some()
        {
            anyhow::bail!("duplicated texture name '{}'", name);
        }
        self.textures.push(Arc::new(texture));
        Ok(())
    }

    /// A texture reference is either a name, a color array, or a plain gray
    /// scalar. Inline values get an anonymous arena slot.
    fn resolve_texture(&mut self, env: &str, value: &Value) -> anyhow::Result<Arc<Texture>> {
        match value {
            Value::String(name) => {
                let idx = *self
                    .texture_names
                    .get(name)
                    .with_context(|| format!("{}: no texture named '{}'", env, name))?;
                Ok(Arc::clone(&self.textures[idx]))
            }
            Value::Array(_) => {
                let tex: Arc<Texture> =
                    Arc::new(ConstantTexture::new(color_from(value, env)?).into());
                self.textures.push(Arc::clone(&tex));
                Ok(tex)
            }
            Value::Number(_) => {
                let v = f32_from(value, env)?;
                let tex: Arc<Texture> = Arc::new(ConstantTexture::new(Color::gray(v)).into());
                self.textures.push(Arc::clone(&tex));
                Ok(tex)
            }
            _ => anyhow::bail!("{}: expected texture name, color array or scalar", env),
        }
    }

    fn parse_bsdf(&mut self, entry: &Value) -> anyhow::Result<()> {
        let name = get_str(entry, "bsdf", "name")?;
        let env = format!("bsdf '{}'", name);
        let ty = get_str(entry, &env, "type")?;

        let albedo_value = entry
            .get("albedo")
            .cloned()
            .unwrap_or_else(|| Value::Number(serde_json::Number::from_f64(0.8).unwrap()));
        let albedo = self.resolve_texture(&env, &albedo_value)?;

        let bsdf: Bsdf = match ty {
            "lambert" => LambertBsdf::new(albedo).into(),
            "mirror" => MirrorBsdf::new(albedo).into(),
            "dielectric" => {
                DielectricBsdf::new(albedo, get_f32_or(entry, &env, "ior", 1.5)?).into()
            }
            "plastic" => PlasticBsdf::new(
                albedo,
                get_f32_or(entry, &env, "ior", 1.5)?,
                get_f32_or(entry, &env, "thickness", 0.0)?,
                get_color_or(entry, &env, "sigma_a", Color::BLACK)?,
            )
            .into(),
            other => anyhow::bail!("{}: unknown type '{}'", env, other),
        };

        if self
            .bsdf_names
            .insert(name.to_owned(), self.bsdfs.len())
            .is_some()
        {
            anyhow::bail!("duplicated bsdf name '{}'", name);
        }
        self.bsdfs.push(Arc::new(bsdf));
        Ok(())
    }

    fn resolve_bsdf(&self, env: &str, entry: &Value) -> anyhow::Result<usize> {
        let name = get_str(entry, env, "bsdf")?;
        self.bsdf_names
            .get(name)
            .copied()
            .with_context(|| format!("{}: no bsdf named '{}'", env, name))
    }

    fn parse_primitive(&mut self, entry: &Value) -> anyhow::Result<Primitive> {
        let ty = get_str(entry, "primitive", "type")?;
        let env = format!("primitive '{}'", ty);

        let emission = match entry.get("emission") {
            Some(value) => Some(self.resolve_texture(&env, value)?),
            None => None,
        };

        let prim: Primitive = match ty {
            "mesh" => {
                let mut mesh = self.parse_mesh(entry, &env)?;
                if let Some(emission) = emission {
                    mesh = mesh.with_emission(emission);
                }
                mesh.into()
            }
            "sphere" => {
                let mut sphere = Sphere::new(
                    get_vec3(entry, &env, "center")?,
                    get_f32(entry, &env, "radius")?,
                    self.resolve_bsdf(&env, entry)?,
                );
                if let Some(emission) = emission {
                    sphere = sphere.with_emission(emission);
                }
                sphere.into()
            }
            "quad" => {
                let mut quad = Quad::new(
                    get_vec3(entry, &env, "base")?,
                    get_vec3(entry, &env, "edge0")?,
                    get_vec3(entry, &env, "edge1")?,
                    self.resolve_bsdf(&env, entry)?,
                );
                if let Some(emission) = emission {
                    quad = quad.with_emission(emission);
                }
                quad.into()
            }
            "disk" => {
                let mut disk = Disk::new(
                    get_vec3(entry, &env, "center")?,
                    get_vec3(entry, &env, "normal")?,
                    get_f32(entry, &env, "radius")?,
                    self.resolve_bsdf(&env, entry)?,
                );
                if let Some(emission) = emission {
                    disk = disk.with_emission(emission);
                }
                disk.into()
            }
            "infinite_sphere" => {
                let emission =
                    emission.with_context(|| format!("{}: requires 'emission'", env))?;
                InfiniteSphere::new(emission).into()
            }
            "infinite_sphere_cap" => {
                let emission =
                    emission.with_context(|| format!("{}: requires 'emission'", env))?;
                InfiniteSphereCap::new(
                    emission,
                    get_vec3(entry, &env, "direction")?,
                    get_f32_or(entry, &env, "cap_angle", 10.0)?,
                )
                .into()
            }
            other => anyhow::bail!("unknown primitive type '{}'", other),
        };
        Ok(prim)
    }

    fn parse_mesh(&mut self, entry: &Value, env: &str) -> anyhow::Result<TriangleMesh> {
        let positions = as_array(
            entry
                .get("vertices")
                .with_context(|| format!("{}: missing 'vertices'", env))?,
            env,
        )?;
        if positions.is_empty() {
            anyhow::bail!("{}: 'vertices' must not be empty", env);
        }
        let uvs = match entry.get("uvs") {
            Some(value) => Some(as_array(value, env)?),
            None => None,
        };

        let mut verts = Vec::with_capacity(positions.len());
        for (i, pos) in positions.iter().enumerate() {
            let uv = match &uvs {
                Some(uvs) => {
                    let uv = uvs
                        .get(i)
                        .with_context(|| format!("{}: 'uvs' shorter than 'vertices'", env))?;
                    vec2_from(uv, env)?
                }
                None => glam::Vec2::ZERO,
            };
            verts.push(Vertex::at(vec3_from(pos, env)?, uv));
        }

        let triangles = as_array(
            entry
                .get("triangles")
                .with_context(|| format!("{}: missing 'triangles'", env))?,
            env,
        )?;
        if triangles.is_empty() {
            anyhow::bail!("{}: 'triangles' must not be empty", env);
        }
        let mut tris = Vec::with_capacity(triangles.len());
        for tri in triangles {
            let idx = as_array(tri, env)?;
            if idx.len() < 3 {
                anyhow::bail!("{}: triangle needs 3 indices", env);
            }
            let mut t = TriangleI::new(
                u32_from(&idx[0], env)?,
                u32_from(&idx[1], env)?,
                u32_from(&idx[2], env)?,
            );
            if let Some(material) = idx.get(3) {
                t.material = u32_from(material, env)?;
            }
            tris.push(t);
        }

        // Per-face BSDF table: a single name or an array of names.
        let bsdf_indices = match entry.get("bsdf") {
            Some(Value::Array(names)) => {
                if names.is_empty() {
                    anyhow::bail!("{}: 'bsdf' array must not be empty", env);
                }
                names
                    .iter()
                    .map(|name| {
                        let name = name
                            .as_str()
                            .with_context(|| format!("{}: bsdf names must be strings", env))?;
                        self.bsdf_names
                            .get(name)
                            .copied()
                            .with_context(|| format!("{}: no bsdf named '{}'", env, name))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?
            }
            Some(_) => vec![self.resolve_bsdf(env, entry)?],
            None => anyhow::bail!("{}: missing 'bsdf'", env),
        };

        let smoothed = get_bool_or(entry, env, "smooth", false)?;
        let backface_culling = get_bool_or(entry, env, "backface_culling", false)?;
        let mut mesh = TriangleMesh::new(verts, tris, bsdf_indices, smoothed, backface_culling);

        if let Some(threshold) = entry.get("smoothing_threshold") {
            mesh = mesh.with_smoothing_threshold(f32_from(threshold, env)?);
        }
        if let Some(transform) = entry.get("transform") {
            let position = get_vec3_or(transform, env, "position", glam::Vec3A::ZERO)?;
            let scale = get_vec3_or(transform, env, "scale", glam::Vec3A::ONE)?;
            mesh = mesh.with_transform(glam::Affine3A::from_scale_rotation_translation(
                scale.into(),
                glam::Quat::IDENTITY,
                position.into(),
            ));
        }
        Ok(mesh)
    }
}

fn parse_settings(entry: &Value) -> anyhow::Result<RendererSettings> {
    let env = "renderer";
    let defaults = RendererSettings::default();
    Ok(RendererSettings {
        spp: get_u32_or(entry, env, "spp", defaults.spp)?,
        use_sobol: get_bool_or(entry, env, "use_sobol", defaults.use_sobol)?,
        use_adaptive_sampling: get_bool_or(
            entry,
            env,
            "use_adaptive_sampling",
            defaults.use_adaptive_sampling,
        )?,
        max_bounces: get_u32_or(entry, env, "max_bounces", defaults.max_bounces)?,
        output_path: PathBuf::from(get_str_or(entry, env, "output_path", "render.png")?),
        hdr_output_path: get_opt_path(entry, "hdr_output_path"),
        variance_output_path: get_opt_path(entry, "variance_output_path"),
        resume_file: get_opt_path(entry, "resume_file"),
    })
}

fn parse_camera(entry: &Value) -> anyhow::Result<Camera> {
    let env = "camera";
    let resolution = entry
        .get("resolution")
        .with_context(|| format!("{}: missing 'resolution'", env))?;
    let resolution = as_array(resolution, env)?;
    if resolution.len() != 2 {
        anyhow::bail!("{}: 'resolution' must be [width, height]", env);
    }
    let width = u32_from(&resolution[0], env)?;
    let height = u32_from(&resolution[1], env)?;
    if width == 0 || height == 0 {
        anyhow::bail!("{}: resolution must be positive", env);
    }

    Ok(Camera::new(CameraParameters {
        eye: get_vec3_or(entry, env, "eye", glam::Vec3A::ZERO)?,
        forward: get_vec3_or(entry, env, "forward", -glam::Vec3A::Z)?,
        up: get_vec3_or(entry, env, "up", glam::Vec3A::Y)?,
        fov_deg: get_f32_or(entry, env, "fov", 60.0)?,
        resolution: glam::UVec2::new(width, height),
    }))
}

fn get_object<'a>(value: &'a Value, env: &str, key: &str) -> anyhow::Result<&'a Value> {
    value
        .get(key)
        .with_context(|| format!("{}: missing '{}'", env, key))
}

fn as_array<'a>(value: &'a Value, env: &str) -> anyhow::Result<&'a Vec<Value>> {
    value
        .as_array()
        .with_context(|| format!("{}: expected an array", env))
}

fn get_str<'a>(entry: &'a Value, env: &str, key: &str) -> anyhow::Result<&'a str> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("{}: missing string field '{}'", env, key))
}

fn get_str_or<'a>(
    entry: &'a Value,
    env: &str,
    key: &str,
    default: &'a str,
) -> anyhow::Result<&'a str> {
    match entry.get(key) {
        Some(value) => value
            .as_str()
            .with_context(|| format!("{}: '{}' must be a string", env, key)),
        None => Ok(default),
    }
}

fn get_opt_path(entry: &Value, key: &str) -> Option<PathBuf> {
    entry.get(key).and_then(Value::as_str).map(PathBuf::from)
}

fn f32_from(value: &Value, env: &str) -> anyhow::Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .with_context(|| format!("{}: expected a number", env))
}

fn u32_from(value: &Value, env: &str) -> anyhow::Result<u32> {
    value
        .as_u64()
        .map(|v| v as u32)
        .with_context(|| format!("{}: expected a non-negative integer", env))
}

fn get_f32(entry: &Value, env: &str, key: &str) -> anyhow::Result<f32> {
    f32_from(
        entry
            .get(key)
            .with_context(|| format!("{}: missing field '{}'", env, key))?,
        env,
    )
}

fn get_f32_or(entry: &Value, env: &str, key: &str, default: f32) -> anyhow::Result<f32> {
    match entry.get(key) {
        Some(value) => f32_from(value, env),
        None => Ok(default),
    }
}

fn get_u32_or(entry: &Value, env: &str, key: &str, default: u32) -> anyhow::Result<u32> {
    match entry.get(key) {
        Some(value) => u32_from(value, env),
        None => Ok(default),
    }
}

fn get_bool_or(entry: &Value, env: &str, key: &str, default: bool) -> anyhow::Result<bool> {
    match entry.get(key) {
        Some(value) => value
            .as_bool()
            .with_context(|| format!("{}: '{}' must be a boolean", env, key)),
        None => Ok(default),
    }
}

fn vec3_from(value: &Value, env: &str) -> anyhow::Result<glam::Vec3A> {
    let arr = as_array(value, env)?;
    if arr.len() != 3 {
        anyhow::bail!("{}: expected [x, y, z]", env);
    }
    Ok(glam::Vec3A::new(
        f32_from(&arr[0], env)?,
        f32_from(&arr[1], env)?,
        f32_from(&arr[2], env)?,
    ))
}

fn vec2_from(value: &Value, env: &str) -> anyhow::Result<glam::Vec2> {
    let arr = as_array(value, env)?;
    if arr.len() != 2 {
        anyhow::bail!("{}: expected [u, v]", env);
    }
    Ok(glam::Vec2::new(f32_from(&arr[0], env)?, f32_from(&arr[1], env)?))
}

fn get_vec3(entry: &Value, env: &str, key: &str) -> anyhow::Result<glam::Vec3A> {
    vec3_from(
        entry
            .get(key)
            .with_context(|| format!("{}: missing field '{}'", env, key))?,
        env,
    )
}

fn get_vec3_or(
    entry: &Value,
    env: &str,
    key: &str,
    default: glam::Vec3A,
) -> anyhow::Result<glam::Vec3A> {
    match entry.get(key) {
        Some(value) => vec3_from(value, env),
        None => Ok(default),
    }
}

fn color_from(value: &Value, env: &str) -> anyhow::Result<Color> {
    let v = vec3_from(value, env)?;
    Ok(Color::new(v.x, v.y, v.z))
}

fn get_color(entry: &Value, env: &str, key: &str) -> anyhow::Result<Color> {
    color_from(
        entry
            .get(key)
            .with_context(|| format!("{}: missing field '{}'", env, key))?,
        env,
    )
}

fn get_color_or(entry: &Value, env: &str, key: &str, default: Color) -> anyhow::Result<Color> {
    match entry.get(key) {
        Some(value) => color_from(value, env),
        None => Ok(default),
    }
}
