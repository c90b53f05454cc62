use bincode::{Decode, Encode};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const DEFAULT_SCREEN_WIDTH: u32 = 1280;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 1024;

// REX3 coordinates are 16-bit signed after the window bias; planes never exceed this on a side
pub const MAX_SCREEN_DIMENSION: u32 = 2048;

pub const DEFAULT_DCB_TIMEOUT_US: u32 = 1000;

macro_rules! impl_config_enum {
    ($name:ident, [$($variant:ident => $display:literal),* $(,)?]) => {
        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            #[must_use]
            pub fn to_str(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $display),)*
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|variant| variant.to_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| format!("invalid {} string: '{s}'", stringify!($name)))
            }
        }
    };
}

/// Board variant. The variants differ only in which XMAP9/CMAP revisions are fitted and in how
/// many RGB/CI bitplanes are populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum NewportBoard {
    /// 8 bitplanes
    Xl8,
    /// 24 bitplanes
    #[default]
    Xl24,
}

impl_config_enum!(NewportBoard, [Xl8 => "XL8 (8 bitplanes)", Xl24 => "XL24 (24 bitplanes)"]);

impl NewportBoard {
    #[must_use]
    pub fn global_write_mask(self) -> u32 {
        match self {
            Self::Xl8 => 0x0000_00FF,
            Self::Xl24 => 0xFFFF_FFFF,
        }
    }

    #[must_use]
    pub fn xmap9_revision(self) -> u32 {
        match self {
            Self::Xl8 => 1,
            Self::Xl24 => 3,
        }
    }

    #[must_use]
    pub fn cmap_revision(self) -> u32 {
        match self {
            Self::Xl8 => 0xA1,
            Self::Xl24 => 0xA0,
        }
    }
}

/// Which endpoints of a Bresenham line are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LineEndpointPolicy {
    /// Honor the SkipFirst/SkipLast bits in draw mode 0
    #[default]
    DrawModeFlags,
    /// Always draw both endpoints
    Inclusive,
    /// Always draw the first endpoint and omit the last
    Exclusive,
}

impl_config_enum!(LineEndpointPolicy, [
    DrawModeFlags => "Draw mode flags",
    Inclusive => "Inclusive",
    Exclusive => "Exclusive",
]);

/// Behavior for the plane-enable encodings that the hardware leaves undefined (3 and 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum UndefinedPlanePolicy {
    /// Drop all pixel writes
    #[default]
    Ignore,
    /// Write to the RGB/CI planes
    RgbCi,
}

impl_config_enum!(UndefinedPlanePolicy, [Ignore => "Ignore writes", RgbCi => "Treat as RGB/CI"]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!("xl8".parse::<NewportBoard>(), Ok(NewportBoard::Xl8));
        assert_eq!("XL24".parse::<NewportBoard>(), Ok(NewportBoard::Xl24));
        assert_eq!("inclusive".parse::<LineEndpointPolicy>(), Ok(LineEndpointPolicy::Inclusive));
        assert!("xl16".parse::<NewportBoard>().is_err());
    }

    #[test]
    fn board_revisions() {
        assert_eq!(NewportBoard::Xl8.global_write_mask(), 0xFF);
        assert_eq!(NewportBoard::Xl24.global_write_mask(), 0xFFFF_FFFF);
        assert_eq!(NewportBoard::Xl8.xmap9_revision(), 1);
        assert_eq!(NewportBoard::Xl24.cmap_revision(), 0xA0);
    }
}
