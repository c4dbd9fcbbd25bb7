//! One-time configuration of the rasterization engine
//!
//! Built once at startup from settings and handed to the rasterizer. Nothing
//! here touches global engine state at load time.

use log::info;

use crate::settings::Settings;

/// Recolors a raster: black ink becomes `ink`, white paper becomes `paper`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tint {
    pub ink: i32,
    pub paper: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Draw annotations and form widgets on top of page content
    pub show_extras: bool,
    pub tint: Option<Tint>,
}

impl EngineConfig {
    /// Build the engine configuration for this process and log it
    #[must_use]
    pub fn initialize(settings: &Settings) -> Self {
        let config = Self {
            show_extras: settings.render_annotations,
            tint: settings
                .page_tint
                .as_deref()
                .and_then(parse_tint),
        };
        info!(
            "Rasterizer configured: annotations={}, tint={:?}",
            config.show_extras, config.tint
        );
        config
    }
}

/// Parse `"INK:PAPER"` hex pairs such as `"DCD7BA:1F1F28"`
fn parse_tint(spec: &str) -> Option<Tint> {
    let (ink, paper) = spec.split_once(':')?;
    let parse = |hex: &str| {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }
        i32::from_str_radix(hex, 16).ok()
    };
    Some(Tint {
        ink: parse(ink)?,
        paper: parse(paper)?,
    })
}
