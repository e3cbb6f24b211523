//! The curated set of US timezones a controller clock can be set to.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;

/// One of the supported wall-clock zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Zone {
    Eastern,
    #[default]
    Central,
    Mountain,
    Pacific,
}

impl Zone {
    /// All zones in menu order.
    pub const ALL: [Zone; 4] = [Zone::Eastern, Zone::Central, Zone::Mountain, Zone::Pacific];

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Zone::Eastern => "Eastern",
            Zone::Central => "Central",
            Zone::Mountain => "Mountain",
            Zone::Pacific => "Pacific",
        }
    }

    /// IANA identifier.
    pub fn iana_name(self) -> &'static str {
        match self {
            Zone::Eastern => "America/New_York",
            Zone::Central => "America/Chicago",
            Zone::Mountain => "America/Denver",
            Zone::Pacific => "America/Los_Angeles",
        }
    }

    pub fn tz(self) -> Tz {
        match self {
            Zone::Eastern => Tz::America__New_York,
            Zone::Central => Tz::America__Chicago,
            Zone::Mountain => Tz::America__Denver,
            Zone::Pacific => Tz::America__Los_Angeles,
        }
    }

    /// The key shown next to this zone in the interactive menu ("1".."4").
    pub fn menu_key(self) -> char {
        match self {
            Zone::Eastern => '1',
            Zone::Central => '2',
            Zone::Mountain => '3',
            Zone::Pacific => '4',
        }
    }

    /// Resolves a menu answer. An empty answer selects the default zone.
    pub fn from_menu_choice(choice: &str) -> Option<Zone> {
        let choice = choice.trim();
        if choice.is_empty() {
            return Some(Zone::default());
        }
        Zone::ALL
            .into_iter()
            .find(|zone| choice.len() == 1 && choice.starts_with(zone.menu_key()))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.iana_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported timezone `{0}` (expected eastern, central, mountain or pacific)")]
pub struct UnknownZone(pub String);

impl FromStr for Zone {
    type Err = UnknownZone;

    /// Accepts a label ("central") or an IANA name ("America/Chicago").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Zone::ALL
            .into_iter()
            .find(|zone| {
                zone.label().eq_ignore_ascii_case(wanted) || zone.iana_name() == wanted
            })
            .ok_or_else(|| UnknownZone(wanted.to_string()))
    }
}
