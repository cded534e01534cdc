//! Sample configuration: the engine sections plus an `[assets]` table.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cadence_engine::config::CadenceConfig;
use serde::Deserialize;

use crate::assets::{Rgba8Image, ShaderAsset};
use crate::scene::SceneConfig;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    #[serde(flatten)]
    pub engine: CadenceConfig,
    pub assets: AssetConfig,
}

/// Optional asset files. Anything left unset uses the built-in version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub wood_texture: Option<PathBuf>,
    pub noise_texture: Option<PathBuf>,
    /// Compiled SPIR-V, entry point `main`.
    pub vertex_shader: Option<PathBuf>,
    /// Compiled SPIR-V, entry point `main`.
    pub fragment_shader: Option<PathBuf>,
}

impl DemoConfig {
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("failed to parse TOML")?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolves assets and window settings into a scene description.
    /// Relative asset paths are taken from `base_dir`.
    pub fn scene_config(&self, base_dir: &Path) -> Result<SceneConfig> {
        let resolve = |p: &Option<PathBuf>| p.as_ref().map(|p| base_dir.join(p));
        let assets = &self.assets;

        let wood = Rgba8Image::load_or(resolve(&assets.wood_texture).as_deref(), || {
            Rgba8Image::wood_grain(256)
        })?;
        let noise = Rgba8Image::load_or(resolve(&assets.noise_texture).as_deref(), || {
            Rgba8Image::value_noise(128, 0x5eed)
        })?;
        let vertex_shader = match resolve(&assets.vertex_shader) {
            Some(path) => ShaderAsset::load_spirv(path)?,
            None => ShaderAsset::passthrough_vertex(),
        };
        let fragment_shader = match resolve(&assets.fragment_shader) {
            Some(path) => ShaderAsset::load_spirv(path)?,
            None => ShaderAsset::hexagon_grid_fragment(),
        };

        let graphics = &self.engine.graphics;
        Ok(SceneConfig {
            width: self.engine.window.width,
            height: self.engine.window.height,
            clear_color: self.engine.clear_color(),
            swap_index: graphics.swap_index,
            present_transform: graphics.present_transform,
            present_filter: graphics.present_filter,
            wood,
            noise,
            vertex_shader,
            fragment_shader,
        })
    }
}

#[cfg(test)]
mod tests {
    use cadence_engine::frame::PresentTransform;

    use super::*;

    #[test]
    fn engine_sections_and_assets_share_one_file() {
        let config = DemoConfig::parse(
            r#"
            [window]
            width = 640
            height = 360

            [graphics]
            present_transform = "flip_vertical"

            [assets]
            wood_texture = "woodgrain.png"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.window.width, 640);
        assert_eq!(config.engine.graphics.present_transform, PresentTransform::FlipVertical);
        assert_eq!(config.assets.wood_texture, Some(PathBuf::from("woodgrain.png")));
        assert_eq!(config.assets.noise_texture, None);
    }

    #[test]
    fn defaults_build_a_procedural_scene() {
        let scene = DemoConfig::default().scene_config(Path::new(".")).unwrap();
        assert_eq!((scene.width, scene.height), (1280, 720));
        assert_eq!(scene.wood.width, 256);
        assert_eq!(scene.fragment_shader.entry_point, "fs_main");
    }

    #[test]
    fn invalid_engine_section_is_rejected() {
        assert!(DemoConfig::parse("[simulation]\nfixed_step_secs = -1.0\n").is_err());
    }

    #[test]
    fn missing_asset_file_fails() {
        let config = DemoConfig::parse("[assets]\nnoise_texture = \"nope.png\"\n").unwrap();
        assert!(config.scene_config(Path::new("/nonexistent")).is_err());
    }
}
