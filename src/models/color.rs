use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Unweighted per-channel mean, rounded to the nearest integer.
    ///
    /// Returns `None` for an empty slice.
    pub fn average(colors: &[Rgb]) -> Option<Rgb> {
        if colors.is_empty() {
            return None;
        }
        let (r, g, b) = colors.iter().fold((0u64, 0u64, 0u64), |acc, c| {
            (acc.0 + c.r as u64, acc.1 + c.g as u64, acc.2 + c.b as u64)
        });
        let n = colors.len() as u64;
        Some(Rgb::new(
            rounded_mean(r, n),
            rounded_mean(g, n),
            rounded_mean(b, n),
        ))
    }

    /// Parse a picker color string.
    ///
    /// `rgb(...)`/`rgba(...)` take their first three integers and `#rrggbb`/`#rgb`
    /// are read as hex. Empty and `undefined` values yield `None`; anything else
    /// unrecognized is black.
    pub fn parse_css(value: &str) -> Option<Rgb> {
        let value = value.trim();
        if value.is_empty() || value == "undefined" {
            return None;
        }
        if value.starts_with("rgb") {
            return Some(parse_rgb_function(value).unwrap_or(Rgb::BLACK));
        }
        if let Some(hex) = value.strip_prefix('#') {
            return Some(parse_hex(hex).unwrap_or(Rgb::BLACK));
        }
        Some(Rgb::BLACK)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

pub(crate) fn rounded_mean(sum: u64, count: u64) -> u8 {
    ((sum as f64 / count as f64).round()).clamp(0.0, 255.0) as u8
}

fn parse_rgb_function(value: &str) -> Option<Rgb> {
    let mut channels = value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>().map(|v| v.min(255) as u8));
    let r = channels.next()?.ok()?;
    let g = channels.next()?.ok()?;
    let b = channels.next()?.ok()?;
    Some(Rgb::new(r, g, b))
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        n if n >= 6 => hex.get(..6)?.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
    Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
}

/// One color dot reported by the external color picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickerSample {
    /// Raw CSS color as the picker stores it.
    pub color: String,
    pub primary: bool,
}

impl PickerSample {
    pub fn new(color: impl Into<String>, primary: bool) -> Self {
        Self {
            color: color.into(),
            primary,
        }
    }
}

/// Turn the picker's dots into a color value for a group.
///
/// A single usable dot gives a plain `rgb(...)`; several give a left-to-right
/// `linear-gradient` with the primary dot first and evenly spaced stops.
pub fn color_value_from_samples(samples: &[PickerSample]) -> Option<String> {
    let mut parsed: Vec<(bool, Rgb)> = samples
        .iter()
        .filter_map(|s| Rgb::parse_css(&s.color).map(|rgb| (s.primary, rgb)))
        .collect();
    // stable: keeps picker order among non-primary dots
    parsed.sort_by_key(|(primary, _)| !primary);

    match parsed.as_slice() {
        [] => None,
        [(_, only)] => Some(only.to_string()),
        many => {
            let last = (many.len() - 1) as f64;
            let stops: Vec<String> = many
                .iter()
                .enumerate()
                .map(|(i, (_, rgb))| format!("{} {}%", rgb, (i as f64 * 100.0 / last).round()))
                .collect();
            Some(format!("linear-gradient(90deg, {})", stops.join(", ")))
        }
    }
}
