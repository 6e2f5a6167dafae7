use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::{
    error::{WitsError, WitsResult},
    identity::IdentitySource,
};

/// Straight-alpha RGBA color, configured as `#rrggbb` / `#rrggbbaa` or one of
/// a few named colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba8(pub [u8; 4]);

impl Rgba8 {
    pub const BLACK: Rgba8 = Rgba8([0, 0, 0, 255]);
    pub const WHITE: Rgba8 = Rgba8([255, 255, 255, 255]);

    pub fn parse(s: &str) -> WitsResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "black" => return Ok(Self::BLACK),
            "white" => return Ok(Self::WHITE),
            _ => {}
        }

        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| WitsError::validation(format!("unrecognized color '{s}'")))?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WitsError::validation(format!("invalid hex color '{s}'")));
        }
        let byte = |i: usize| -> WitsResult<u8> {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| WitsError::validation(format!("invalid hex color '{s}'")))
        };
        match hex.len() {
            6 => Ok(Rgba8([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Ok(Rgba8([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => Err(WitsError::validation(format!(
                "color '{s}' must be #rrggbb or #rrggbbaa"
            ))),
        }
    }
}

impl TryFrom<String> for Rgba8 {
    type Error = WitsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Rgba8::parse(&s)
    }
}

impl From<Rgba8> for String {
    fn from(c: Rgba8) -> String {
        let [r, g, b, a] = c.0;
        if a == 255 {
            format!("#{r:02x}{g:02x}{b:02x}")
        } else {
            format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

/// Appearance of the rendered text block. All fields are fixed for the
/// lifetime of the process; the renderer never mutates them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// Starting font size for the first (IP) line, before shrink-to-fit.
    pub font_size: u32,
    pub text_color: Rgba8,
    pub outline_color: Rgba8,
    /// Radius of the approximate circular outline stroke, in pixels.
    pub outline_width: i32,
    pub shadow_color: Rgba8,
    /// Shadow displacement (dx, dy) from each line's position.
    pub shadow_offset: (i32, i32),
    /// Tilt applied to the whole text block, in degrees (positive is
    /// counter-clockwise).
    pub rotation_angle: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 120,
            text_color: Rgba8([0xb6, 0x38, 0x25, 0xff]),
            outline_color: Rgba8::BLACK,
            outline_width: 5,
            shadow_color: Rgba8::BLACK,
            shadow_offset: (-10, 15),
            rotation_angle: -5.0,
        }
    }
}

/// Read-only input assets. Checked for existence at startup, read per
/// request, never cached in memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Assets {
    pub base_image: PathBuf,
    pub font: PathBuf,
    pub audio: PathBuf,
    pub template_video: PathBuf,
    pub geoip_db: PathBuf,
}

impl Default for Assets {
    fn default() -> Self {
        Self {
            base_image: PathBuf::from("assets/template.png"),
            font: PathBuf::from("assets/font.ttf"),
            audio: PathBuf::from("assets/audio.mp3"),
            template_video: PathBuf::from("assets/intro.mp4"),
            geoip_db: PathBuf::from("assets/GeoLite2-City.mmdb"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Directory holding generated videos; created at startup if absent.
    pub output_dir: PathBuf,
    pub identity: IdentitySource,
    pub assets: Assets,
    pub style: OverlayStyle,
    /// Mount the `/headers` debug route. Off in production.
    pub debug_endpoints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            output_dir: PathBuf::from("generated"),
            identity: IdentitySource::default(),
            assets: Assets::default(),
            style: OverlayStyle::default(),
            debug_endpoints: false,
        }
    }
}

impl Config {
    pub fn from_path(path: &Path) -> WitsResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Config = serde_json::from_str(&raw)
            .map_err(|e| WitsError::validation(format!("parse config '{}': {e}", path.display())))?;
        Ok(cfg)
    }

    /// Create the output directory and verify every asset path exists.
    ///
    /// The geolocation database is exempt: a missing database degrades to
    /// "Unknown" location strings at request time instead of refusing to
    /// start.
    pub fn prepare(&self) -> WitsResult<()> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("create output directory '{}'", self.output_dir.display())
        })?;

        for (name, path) in [
            ("base image", &self.assets.base_image),
            ("font", &self.assets.font),
            ("audio track", &self.assets.audio),
            ("template video", &self.assets.template_video),
        ] {
            if !path.exists() {
                return Err(WitsError::validation(format!(
                    "{name} asset not found at '{}'",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
