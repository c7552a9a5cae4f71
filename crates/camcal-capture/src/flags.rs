use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Solver constraint bits, numerically compatible with the usual
/// `CALIB_*` flag values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationFlags(u32);

impl CalibrationFlags {
    pub const NONE: Self = Self(0);
    pub const FIX_ASPECT_RATIO: Self = Self(2);
    pub const FIX_PRINCIPAL_POINT: Self = Self(4);
    pub const ZERO_TANGENT_DIST: Self = Self(8);
    pub const FIX_K4: Self = Self(2048);
    pub const FIX_K5: Self = Self(4096);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::FIX_ASPECT_RATIO, "fix_aspectRatio"),
        (Self::FIX_PRINCIPAL_POINT, "fix_principal_point"),
        (Self::ZERO_TANGENT_DIST, "zero_tangent_dist"),
        (Self::FIX_K4, "fix_k4"),
        (Self::FIX_K5, "fix_k5"),
    ];

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Readable form such as `+fix_aspectRatio+fix_k4+fix_k5`; empty when no
    /// known bit is set.
    pub fn summary(self) -> String {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| format!("+{name}"))
            .collect()
    }
}

impl BitOr for CalibrationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CalibrationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Display for CalibrationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_values_are_stable() {
        let all = CalibrationFlags::FIX_ASPECT_RATIO
            | CalibrationFlags::FIX_PRINCIPAL_POINT
            | CalibrationFlags::ZERO_TANGENT_DIST
            | CalibrationFlags::FIX_K4
            | CalibrationFlags::FIX_K5;
        assert_eq!(all.bits(), 2 + 4 + 8 + 2048 + 4096);
        assert!(all.contains(CalibrationFlags::FIX_K4));
        assert!(!CalibrationFlags::FIX_K4.contains(CalibrationFlags::FIX_K5));
    }

    #[test]
    fn summary_lists_set_bits_in_order() {
        let flags = CalibrationFlags::FIX_K5
            | CalibrationFlags::FIX_ASPECT_RATIO
            | CalibrationFlags::FIX_K4;
        assert_eq!(flags.summary(), "+fix_aspectRatio+fix_k4+fix_k5");
        assert_eq!(CalibrationFlags::NONE.summary(), "");
    }
}
