//! ABO/Rh blood groups and the fixed donor-to-recipient compatibility table.
//!
//! The table is domain data, not something derived at runtime: red-cell
//! compatibility is encoded once as an 8×8 matrix indexed by
//! [`BloodGroup::index`].
//!
//! ```text
//! donor ↓ / recipient →  O-  O+  A-  A+  B-  B+  AB- AB+
//! O-                      ✓   ✓   ✓   ✓   ✓   ✓   ✓   ✓
//! O+                      .   ✓   .   ✓   .   ✓   .   ✓
//! A-                      .   .   ✓   ✓   .   .   ✓   ✓
//! A+                      .   .   .   ✓   .   .   .   ✓
//! B-                      .   .   .   .   ✓   ✓   ✓   ✓
//! B+                      .   .   .   .   .   ✓   .   ✓
//! AB-                     .   .   .   .   .   .   ✓   ✓
//! AB+                     .   .   .   .   .   .   .   ✓
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the eight ABO/Rh blood groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BloodGroup {
    /// O negative (universal red-cell donor)
    #[serde(rename = "O-")]
    ONeg,
    /// O positive
    #[serde(rename = "O+")]
    OPos,
    /// A negative
    #[serde(rename = "A-")]
    ANeg,
    /// A positive
    #[serde(rename = "A+")]
    APos,
    /// B negative
    #[serde(rename = "B-")]
    BNeg,
    /// B positive
    #[serde(rename = "B+")]
    BPos,
    /// AB negative
    #[serde(rename = "AB-")]
    AbNeg,
    /// AB positive (universal red-cell recipient)
    #[serde(rename = "AB+")]
    AbPos,
}

/// Row = donor, column = recipient, both in [`BloodGroup::ALL`] order.
const CAN_DONATE_TO: [[bool; 8]; 8] = [
    // O-     O+     A-     A+     B-     B+     AB-    AB+
    [true, true, true, true, true, true, true, true], // O-
    [false, true, false, true, false, true, false, true], // O+
    [false, false, true, true, false, false, true, true], // A-
    [false, false, false, true, false, false, false, true], // A+
    [false, false, false, false, true, true, true, true], // B-
    [false, false, false, false, false, true, false, true], // B+
    [false, false, false, false, false, false, true, true], // AB-
    [false, false, false, false, false, false, false, true], // AB+
];

impl BloodGroup {
    /// Every blood group, in table order.
    pub const ALL: [Self; 8] = [
        Self::ONeg,
        Self::OPos,
        Self::ANeg,
        Self::APos,
        Self::BNeg,
        Self::BPos,
        Self::AbNeg,
        Self::AbPos,
    ];

    /// Position of this group in [`BloodGroup::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::ONeg => 0,
            Self::OPos => 1,
            Self::ANeg => 2,
            Self::APos => 3,
            Self::BNeg => 4,
            Self::BPos => 5,
            Self::AbNeg => 6,
            Self::AbPos => 7,
        }
    }

    /// Canonical label, e.g. `"AB+"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ONeg => "O-",
            Self::OPos => "O+",
            Self::ANeg => "A-",
            Self::APos => "A+",
            Self::BNeg => "B-",
            Self::BPos => "B+",
            Self::AbNeg => "AB-",
            Self::AbPos => "AB+",
        }
    }

    /// Whether a donor of this group may give red cells to `recipient`.
    #[must_use]
    pub const fn can_donate_to(self, recipient: Self) -> bool {
        CAN_DONATE_TO[self.index()][recipient.index()]
    }

    /// Donor groups a recipient of this group can receive from.
    #[must_use]
    pub fn compatible_donors(self) -> SmallVec<[Self; 8]> {
        Self::ALL
            .into_iter()
            .filter(|donor| donor.can_donate_to(self))
            .collect()
    }

    /// Recipient groups a donor of this group can give to.
    #[must_use]
    pub fn compatible_recipients(self) -> SmallVec<[Self; 8]> {
        Self::ALL
            .into_iter()
            .filter(|recipient| self.can_donate_to(*recipient))
            .collect()
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the eight supported groups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported blood group: {0:?}")]
pub struct ParseBloodGroupError(String);

impl FromStr for BloodGroup {
    type Err = ParseBloodGroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the typographic minus sign some clients send.
        let normalized = s.trim().to_ascii_uppercase().replace('\u{2212}', "-");
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == normalized)
            .ok_or_else(|| ParseBloodGroupError(s.to_string()))
    }
}
