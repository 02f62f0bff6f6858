//! Colour effects for low-vision reading
//!
//! The configuration selects a palette; the compositor applies it. Overlay
//! colours are tuned per effect so rail highlights complement the filtered
//! page instead of fighting it.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColourEffect {
    #[default]
    None,
    HighContrast,
    HighVisibility,
    Amber,
    Invert,
}

impl fmt::Display for ColourEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::HighContrast => write!(f, "High Contrast"),
            Self::HighVisibility => write!(f, "High Visibility"),
            Self::Amber => write!(f, "Amber Filter"),
            Self::Invert => write!(f, "Invert"),
        }
    }
}

/// All effects with a short description, for settings UIs.
pub const COLOUR_EFFECTS: &[(ColourEffect, &str)] = &[
    (ColourEffect::None, "No colour effect"),
    (ColourEffect::HighContrast, "White on black for glare reduction"),
    (ColourEffect::HighVisibility, "Yellow on black for maximum legibility"),
    (ColourEffect::Amber, "Warm amber tint for haze reduction"),
    (ColourEffect::Invert, "Invert colours for eye strain relief"),
];

/// Straight-alpha RGBA colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    #[must_use]
    pub fn with_alpha_scaled(self, factor: f64) -> Self {
        let a = (f64::from(self.3) * factor.clamp(0.0, 1.0)).round() as u8;
        Self(self.0, self.1, self.2, a)
    }
}

/// Colours for the rail-mode overlay layer.
#[derive(Clone, Copy, Debug)]
pub struct OverlayPalette {
    /// Fill over the whole page to de-emphasise non-active blocks.
    pub dim: Rgba,
    /// Additive reveal over the active block; `None` means outline only.
    pub block_reveal: Option<Rgba>,
    /// Stroke of the active block outline.
    pub block_outline: Rgba,
    pub block_outline_width: f32,
    /// Fill of the current-line highlight band.
    pub line_highlight: Rgba,
}

impl ColourEffect {
    /// Overlay palette tuned for this effect.
    #[must_use]
    pub fn overlay_palette(&self) -> OverlayPalette {
        match self {
            Self::None => OverlayPalette {
                dim: Rgba(0, 0, 0, 120),
                block_reveal: Some(Rgba(255, 255, 255, 120)),
                block_outline: Rgba(66, 133, 244, 80),
                block_outline_width: 1.5,
                line_highlight: Rgba(66, 133, 244, 40),
            },
            Self::HighContrast => OverlayPalette {
                dim: Rgba(60, 60, 60, 100),
                block_reveal: None,
                block_outline: Rgba(0, 255, 255, 200),
                block_outline_width: 2.5,
                line_highlight: Rgba(0, 255, 255, 50),
            },
            Self::HighVisibility => OverlayPalette {
                dim: Rgba(40, 40, 0, 100),
                block_reveal: None,
                block_outline: Rgba(255, 230, 0, 200),
                block_outline_width: 2.5,
                line_highlight: Rgba(255, 230, 0, 50),
            },
            Self::Amber => OverlayPalette {
                dim: Rgba(40, 20, 0, 110),
                block_reveal: Some(Rgba(255, 200, 120, 100)),
                block_outline: Rgba(255, 160, 40, 140),
                block_outline_width: 2.0,
                line_highlight: Rgba(255, 160, 40, 45),
            },
            Self::Invert => OverlayPalette {
                dim: Rgba(200, 200, 200, 100),
                block_reveal: None,
                block_outline: Rgba(255, 120, 40, 180),
                block_outline_width: 2.0,
                line_highlight: Rgba(255, 120, 40, 45),
            },
        }
    }

    /// Palette with overlay alphas scaled by the configured intensity.
    #[must_use]
    pub fn overlay_palette_with_intensity(&self, intensity: f64) -> OverlayPalette {
        let base = self.overlay_palette();
        OverlayPalette {
            dim: base.dim.with_alpha_scaled(intensity),
            block_reveal: base.block_reveal.map(|c| c.with_alpha_scaled(intensity)),
            block_outline: base.block_outline,
            block_outline_width: base.block_outline_width,
            line_highlight: base.line_highlight.with_alpha_scaled(intensity),
        }
    }
}
