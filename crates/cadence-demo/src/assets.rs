//! Texture and shader inputs for the sample.
//!
//! Textures come from PNG/JPEG files when a path is configured and are
//! generated otherwise, so the sample runs from a bare checkout.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use cadence_engine::device::ShaderCode;

/// Tightly packed 8-bit RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Rgba8Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Rgba8Image {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "image has zero extent");
        let expected = width as usize * height as usize * 4;
        ensure!(
            pixels.len() == expected,
            "{width}x{height} RGBA image needs {expected} bytes, got {}",
            pixels.len()
        );
        Ok(Self { width, height, pixels })
    }

    /// Decodes an image file and converts it to RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("loaded {} ({width}x{height})", path.display());
        Self::new(width, height, rgba.into_raw())
    }

    /// Loads `path` when given, otherwise falls back to `generate`.
    pub fn load_or(path: Option<&Path>, generate: impl FnOnce() -> Self) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(generate()),
        }
    }

    fn from_fn(size: u32, mut texel: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                pixels.extend_from_slice(&texel(x, y));
            }
        }
        Self { width: size, height: size, pixels }
    }

    /// Concentric rings with a slight wobble, in warm browns.
    pub fn wood_grain(size: u32) -> Self {
        let size = size.max(1);
        let scale = size as f32;
        Self::from_fn(size, |x, y| {
            let (u, v) = (x as f32 / scale - 0.5, y as f32 / scale - 0.5);
            let wobble = (v * 23.0).sin() * 0.015;
            let r = ((u + wobble) * (u + wobble) + v * v * 0.2).sqrt();
            let ring = (r * 48.0).sin() * 0.5 + 0.5;
            let shade = 0.55 + 0.45 * ring;
            [
                (186.0 * shade) as u8,
                (122.0 * shade) as u8,
                (68.0 * shade) as u8,
                255,
            ]
        })
    }

    /// Tileable value noise in all four channels.
    pub fn value_noise(size: u32, seed: u32) -> Self {
        let size = size.max(1);
        let cells = 8u32.min(size);
        let lattice = |cx: u32, cy: u32| hash(cx % cells, cy % cells, seed) as f32 / 255.0;
        Self::from_fn(size, |x, y| {
            let fx = x as f32 * cells as f32 / size as f32;
            let fy = y as f32 * cells as f32 / size as f32;
            let (cx, cy) = (fx as u32, fy as u32);
            let (tx, ty) = (smooth(fx.fract()), smooth(fy.fract()));
            let top = lerp(lattice(cx, cy), lattice(cx + 1, cy), tx);
            let bottom = lerp(lattice(cx, cy + 1), lattice(cx + 1, cy + 1), tx);
            let n = (lerp(top, bottom, ty) * 255.0) as u8;
            [n, n, n, 255]
        })
    }
}

fn hash(x: u32, y: u32, seed: u32) -> u8 {
    let mut h = x.wrapping_mul(0x27d4_eb2d) ^ y.wrapping_mul(0x1656_67b1) ^ seed;
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    (h >> 24) as u8
}

fn smooth(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Shader code for one stage plus its entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderAsset {
    pub source: ShaderSource,
    pub entry_point: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShaderSource {
    Wgsl(String),
    SpirV(Vec<u8>),
}

impl ShaderAsset {
    pub fn wgsl(source: &str, entry_point: &str) -> Self {
        Self { source: ShaderSource::Wgsl(source.to_string()), entry_point: entry_point.to_string() }
    }

    /// Reads compiled SPIR-V. Entry points of SPIR-V modules are `main`.
    pub fn load_spirv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read shader {}", path.display()))?;
        ensure!(
            !bytes.is_empty() && bytes.len() % 4 == 0,
            "{} is not SPIR-V: {} bytes",
            path.display(),
            bytes.len()
        );
        Ok(Self { source: ShaderSource::SpirV(bytes), entry_point: "main".to_string() })
    }

    pub fn code(&self) -> ShaderCode<'_> {
        match &self.source {
            ShaderSource::Wgsl(src) => ShaderCode::Wgsl(src),
            ShaderSource::SpirV(bytes) => ShaderCode::SpirV(bytes),
        }
    }

    /// Built-in passthrough vertex stage.
    pub fn passthrough_vertex() -> Self {
        Self::wgsl(include_str!("shaders/passthrough.wgsl"), "vs_main")
    }

    /// Built-in hexagon grid fragment stage.
    pub fn hexagon_grid_fragment() -> Self {
        Self::wgsl(include_str!("shaders/hexagon_grid.wgsl"), "fs_main")
    }
}
