// config.rs: viewer settings: defaults, then assets/viewer.json (or --config), then CLI
//
// CLI:
//   pano360 [MEDIA] [--format <0|1|2|mono|left-right|top-bottom>] [--lang <code>]
//           [--headset] [--config <path>]
// Env:
//   PANORAMA_LANG  UI language when --lang is absent

use crate::mesh::{MediaFormat, SphereParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing value after {0}")]
    MissingValue(String),
    #[error("unexpected argument {0}")]
    UnexpectedArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SphereConfig {
    pub radius: f32,
    pub rows: usize,
    pub columns: usize,
    pub vertical_degrees: f32,
    pub horizontal_degrees: f32,
}

impl Default for SphereConfig {
    fn default() -> Self {
        let p = SphereParams::default();
        Self {
            radius: p.radius,
            rows: p.rows,
            columns: p.columns,
            vertical_degrees: p.vertical_degrees,
            horizontal_degrees: p.horizontal_degrees,
        }
    }
}

impl From<SphereConfig> for SphereParams {
    fn from(c: SphereConfig) -> Self {
        SphereParams {
            radius: c.radius,
            rows: c.rows,
            columns: c.columns,
            vertical_degrees: c.vertical_degrees,
            horizontal_degrees: c.horizontal_degrees,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub sphere: SphereConfig,
    pub field_of_view_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub px_per_degree: f32,
    pub max_canvas_width: u32,
    pub placeholder_height: u32,
    pub headset_mode: bool,
    /// Integer or name; anything unknown means mono.
    pub format: Option<String>,
    pub lang: Option<String>,
    pub media: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            sphere: SphereConfig::default(),
            field_of_view_degrees: 90.0,
            z_near: 0.1,
            z_far: 100.0,
            px_per_degree: crate::touch::PX_PER_DEGREE,
            max_canvas_width: crate::photosphere::MAX_CANVAS_WIDTH,
            placeholder_height: 2048,
            headset_mode: false,
            format: None,
            lang: None,
            media: None,
        }
    }
}

impl ViewerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn media_format(&self) -> MediaFormat {
        self.format
            .as_deref()
            .map(MediaFormat::parse_lenient)
            .unwrap_or_default()
    }

    pub fn sphere_params(&self) -> SphereParams {
        self.sphere.into()
    }

    pub fn lang(&self) -> String {
        self.lang.clone().unwrap_or_else(|| "en".to_string())
    }

    /// Resolve the full configuration from process arguments and environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let env_lang = std::env::var("PANORAMA_LANG").ok();
        Self::resolve_from(&args, env_lang.as_deref(), default_config_file().as_deref())
    }

    pub fn resolve_from(
        args: &[String],
        env_lang: Option<&str>,
        default_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let cli = CliArgs::parse(args)?;

        let mut config = match cli.config.as_deref().or(default_file) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(lang) = env_lang.filter(|v| !v.trim().is_empty()) {
            config.lang = Some(lang.to_string());
        }
        if let Some(lang) = cli.lang {
            config.lang = Some(lang);
        }
        if let Some(format) = cli.format {
            config.format = Some(format);
        }
        if let Some(media) = cli.media {
            config.media = Some(media);
        }
        if cli.headset {
            config.headset_mode = true;
        }
        Ok(config)
    }
}

fn default_config_file() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("assets").join("viewer.json");
            if p.exists() {
                return Some(p);
            }
        }
    }
    let p = PathBuf::from("assets").join("viewer.json");
    p.exists().then_some(p)
}

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    media: Option<String>,
    format: Option<String>,
    lang: Option<String>,
    config: Option<PathBuf>,
    headset: bool,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let mut out = CliArgs::default();
        let mut it = args.iter();
        while let Some(a) = it.next() {
            let mut value = || {
                it.next()
                    .cloned()
                    .ok_or_else(|| ConfigError::MissingValue(a.clone()))
            };
            match a.as_str() {
                "--format" => out.format = Some(value()?),
                "--lang" => out.lang = Some(value()?),
                "--config" => out.config = Some(PathBuf::from(value()?)),
                "--headset" => out.headset = true,
                flag if flag.starts_with("--") => {
                    return Err(ConfigError::UnexpectedArgument(flag.to_string()))
                }
                media if out.media.is_none() => out.media = Some(media.to_string()),
                extra => return Err(ConfigError::UnexpectedArgument(extra.to_string())),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_the_classic_sphere() {
        let config = ViewerConfig::resolve_from(&[], None, None).unwrap();
        assert_eq!(config.sphere_params(), SphereParams::default());
        assert_eq!(config.media_format(), MediaFormat::Monoscopic);
        assert_eq!(config.lang(), "en");
        assert!(!config.headset_mode);
    }

    #[test]
    fn cli_overrides_env_and_file() {
        let config = ViewerConfig::resolve_from(
            &args(&["pano.jpg", "--format", "2", "--lang", "ja", "--headset"]),
            Some("fr"),
            None,
        )
        .unwrap();
        assert_eq!(config.media.as_deref(), Some("pano.jpg"));
        assert_eq!(config.media_format(), MediaFormat::StereoTopBottom);
        assert_eq!(config.lang(), "ja");
        assert!(config.headset_mode);
    }

    #[test]
    fn invalid_format_defaults_to_mono() {
        let config =
            ViewerConfig::resolve_from(&args(&["--format", "9"]), None, None).unwrap();
        assert_eq!(config.media_format(), MediaFormat::Monoscopic);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(matches!(
            ViewerConfig::resolve_from(&args(&["--format"]), None, None),
            Err(ConfigError::MissingValue(_))
        ));
        assert!(matches!(
            ViewerConfig::resolve_from(&args(&["--bogus"]), None, None),
            Err(ConfigError::UnexpectedArgument(_))
        ));
        assert!(matches!(
            ViewerConfig::resolve_from(&args(&["a.jpg", "b.jpg"]), None, None),
            Err(ConfigError::UnexpectedArgument(_))
        ));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ViewerConfig =
            serde_json::from_str(r#"{ "sphere": { "rows": 64 }, "format": "left-right" }"#)
                .unwrap();
        assert_eq!(config.sphere.rows, 64);
        assert_eq!(config.sphere.columns, 32);
        assert_eq!(config.field_of_view_degrees, 90.0);
        assert_eq!(config.media_format(), MediaFormat::StereoLeftRight);
    }
}
