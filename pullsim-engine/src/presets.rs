//! Built-in policy documents for known banner variants.
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::aggregate::ExperimentPlan;
use crate::policy::ConfigError;

const ARKNIGHTS_CHARACTER: &str = include_str!("../../data/presets/arknights-character.json");
const ENDFIELD_WEAPON: &str = include_str!("../../data/presets/endfield-weapon.json");
const GENSHIN_WEAPON: &str = include_str!("../../data/presets/genshin-weapon.json");
const HOYO_CHARACTER: &str = include_str!("../../data/presets/hoyo-character.json");
const WUWA_CHARACTER: &str = include_str!("../../data/presets/wuwa-character.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    ArknightsCharacter,
    EndfieldWeapon,
    GenshinWeapon,
    HoyoCharacter,
    WuwaCharacter,
}

impl Preset {
    pub const ALL: [Self; 5] = [
        Self::ArknightsCharacter,
        Self::EndfieldWeapon,
        Self::GenshinWeapon,
        Self::HoyoCharacter,
        Self::WuwaCharacter,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::ArknightsCharacter => "arknights-character",
            Self::EndfieldWeapon => "endfield-weapon",
            Self::GenshinWeapon => "genshin-weapon",
            Self::HoyoCharacter => "hoyo-character",
            Self::WuwaCharacter => "wuwa-character",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ArknightsCharacter => {
                "2% base, +2%/pull after 50, first hit from pull 150 forced rate-up, 6 copies"
            }
            Self::EndfieldWeapon => {
                "4% base in sets of 10, hit by 40, rate-up at 80 plus bonuses every 160 from 180, 6 copies"
            }
            Self::GenshinWeapon => "0.6% base, ramp from 65, certain at 79, 37.5% split with carryover, 5 copies",
            Self::HoyoCharacter => "0.6% base, ramp from 74, certain at 89, 50/50 with carryover, 7 copies",
            Self::WuwaCharacter => {
                "0.8% base, piecewise ramp from 65, certain at 79, 50/50 with carryover, 5 copies"
            }
        }
    }

    const fn document(self) -> &'static str {
        match self {
            Self::ArknightsCharacter => ARKNIGHTS_CHARACTER,
            Self::EndfieldWeapon => ENDFIELD_WEAPON,
            Self::GenshinWeapon => GENSHIN_WEAPON,
            Self::HoyoCharacter => HOYO_CHARACTER,
            Self::WuwaCharacter => WUWA_CHARACTER,
        }
    }

    /// Parse and validate the embedded plan document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the embedded document is invalid.
    pub fn plan(self) -> Result<ExperimentPlan, ConfigError> {
        ExperimentPlan::from_json_str(self.document())
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Raised for a preset name that is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown preset `{0}`")]
pub struct UnknownPreset(pub String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|preset| preset.key() == wanted)
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}
