use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// A display color in `#RRGGBB` form, stored upper-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor([u8; 3]);

impl HexColor {
    /// Neutral gray mixed into an owner's color for footprint tiles.
    pub const NEUTRAL: HexColor = HexColor([0xAA, 0xAA, 0xAA]);
    pub const WHITE: HexColor = HexColor([0xFF, 0xFF, 0xFF]);

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Build a color from the low 24 bits of `value`.
    pub fn from_u24(value: u32) -> Self {
        Self([(value >> 16) as u8, (value >> 8) as u8, value as u8])
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let hex = raw
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| DomainError::parse(format!("Color must start with '#': {raw}")))?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::parse(format!("Color must be #RRGGBB: {raw}")));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| DomainError::parse(format!("{raw}: {e}")))
        };
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.0[0], self.0[1], self.0[2])
    }

    /// Secondary shade: each channel averaged with [`HexColor::NEUTRAL`].
    pub fn secondary(&self) -> Self {
        let mix = |a: u8, b: u8| ((u16::from(a) + u16::from(b)) / 2) as u8;
        Self([
            mix(self.0[0], Self::NEUTRAL.0[0]),
            mix(self.0[1], Self::NEUTRAL.0[1]),
            mix(self.0[2], Self::NEUTRAL.0[2]),
        ])
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl std::str::FromStr for HexColor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HexColor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> String {
        color.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_to_upper_case() {
        let color = HexColor::parse("#e91e63").unwrap();
        assert_eq!(color.to_string(), "#E91E63");
        assert_eq!(color.rgb(), (0xE9, 0x1E, 0x63));
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!(HexColor::parse("E91E63").is_err());
        assert!(HexColor::parse("#E91E6").is_err());
        assert!(HexColor::parse("#GGGGGG").is_err());
    }

    #[test]
    fn secondary_blends_toward_neutral() {
        let color = HexColor::from_rgb(0xFF, 0x00, 0xAA);
        assert_eq!(color.secondary(), HexColor::from_rgb(0xD4, 0x55, 0xAA));
        assert_eq!(HexColor::NEUTRAL.secondary(), HexColor::NEUTRAL);
    }

    #[test]
    fn from_u24_ignores_high_bits() {
        assert_eq!(HexColor::from_u24(0xFF12_3456).to_string(), "#123456");
    }
}
