//! Protocol version triple and the feature set it implies.
//!
//! Servers report a raw `(u16, u8, u8)` triple. Since 2.0.0 the low bit of
//! the patch number flags a PRO build and the release patch is `patch / 2`,
//! except for the 4.0.0..4.11.0 range which used the plain value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw version triple as sent on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u8,
    pub patch: u8,
}

impl ProtocolVersion {
    pub const UNKNOWN: ProtocolVersion = ProtocolVersion::new(0, 0, 0);

    pub const fn new(major: u16, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Read the `>HBB` triple from the first four payload bytes.
    pub fn from_wire(data: &[u8]) -> Option<Self> {
        let head = data.get(..4)?;
        Some(Self {
            major: u16::from_be_bytes([head[0], head[1]]),
            minor: head[2],
            patch: head[3],
        })
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    pub fn at_least(&self, major: u16, minor: u8, patch: u8) -> bool {
        *self >= Self::new(major, minor, patch)
    }

    /// Marketed release and edition for this wire triple.
    pub fn release(&self) -> Release {
        let v = *self;
        if v >= Self::new(4, 0, 0) && v < Self::new(4, 11, 0) {
            Release {
                version: v,
                pro: Some(false),
            }
        } else if v >= Self::new(2, 0, 0) {
            Release {
                version: Self::new(v.major, v.minor, v.patch / 2),
                pro: Some(v.patch & 1 == 1),
            }
        } else if v >= Self::new(1, 7, 0) {
            Release {
                version: v,
                pro: Some(true),
            }
        } else if v > Self::UNKNOWN {
            Release {
                version: v,
                pro: Some(false),
            }
        } else {
            Release {
                version: v,
                pro: None,
            }
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Release version with edition. `pro == None` means the version is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: ProtocolVersion,
    pub pro: Option<bool>,
}

impl Release {
    /// Sort key: zero-padded version followed by an edition rank.
    pub fn sort_key(&self) -> String {
        let rank = match self.pro {
            Some(true) => 2,
            Some(false) => 1,
            None => 0,
        };
        format!(
            "{:05}_{:03}_{:03}_{}",
            self.version.major, self.version.minor, self.version.patch, rank
        )
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_unknown() {
            return Ok(());
        }
        write!(f, "{}", self.version)?;
        if self.pro == Some(true) {
            write!(f, " PRO")?;
        }
        Ok(())
    }
}

/// Optional master capabilities gated on the release version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Feature {
    ExportUmask = 0,
    ExportDisables = 1,
    SessionStats28 = 2,
    InstanceName = 4,
    CsListMode = 5,
    SclassInMatrix = 7,
    DefaultGracePeriod = 8,
    LabelModeOverrides = 9,
    SclassGroups = 10,
}

/// Bit mask of `Feature`s supported by one master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet(u32);

impl FeatureSet {
    /// Derive the feature set from a release version (already converted
    /// from the wire triple).
    pub fn for_version(v: ProtocolVersion) -> Self {
        let at = |a, b, c| v >= ProtocolVersion::new(a, b, c);
        let mut set = FeatureSet::default();
        if at(3, 0, 72) {
            set.insert(Feature::ExportUmask);
        }
        if (at(3, 0, 112) && v.major == 3) || at(4, 21, 0) {
            set.insert(Feature::ExportDisables);
        }
        if at(4, 27, 0) {
            set.insert(Feature::SessionStats28);
        }
        if at(4, 29, 0) {
            set.insert(Feature::InstanceName);
        }
        if at(4, 35, 0) {
            set.insert(Feature::CsListMode);
        }
        if at(4, 44, 0) {
            set.insert(Feature::SclassInMatrix);
        }
        if at(4, 51, 0) {
            set.insert(Feature::DefaultGracePeriod);
        }
        if at(4, 53, 0) {
            set.insert(Feature::LabelModeOverrides);
        }
        if at(4, 57, 0) {
            set.insert(Feature::SclassGroups);
        }
        set
    }

    pub fn insert(&mut self, feature: Feature) {
        self.0 |= 1 << feature as u8;
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.0 & (1 << feature as u8) != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}
