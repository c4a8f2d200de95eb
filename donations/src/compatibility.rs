//! Donor eligibility and ranking for a request.
//!
//! Pure: no store access, no shared state. The resolver takes the donors the
//! caller already loaded and returns the eligible ones in a fully
//! deterministic order:
//!
//! 1. great-circle distance to the request, nearest first (unknown last)
//! 2. time since last donation, longest first (never donated counts as longest)
//! 3. donor id, ascending

use chrono::{DateTime, Utc};
use hemolink_core::{BloodGroup, Donor, Request, SmallVec};
use serde::Serialize;
use std::cmp::Ordering;

/// Distance at which proximity stops contributing to the score.
const SCORE_DISTANCE_HORIZON_KM: f64 = 100.0;
/// Rest period after which the wait-time component saturates.
const SCORE_REST_HORIZON_DAYS: f64 = 56.0;

/// An eligible donor for a request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    /// The donor
    pub donor: Donor,
    /// Haversine distance, when both positions are known
    pub distance_km: Option<f64>,
    /// Descriptive score in `[0, 1]`; ordering does not depend on it
    pub score: f64,
}

/// Ranks blood-compatible donors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompatibilityResolver {
    max_distance_km: Option<f64>,
}

impl CompatibilityResolver {
    /// A resolver with no distance limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_distance_km: None,
        }
    }

    /// Drop donors whose known distance exceeds `km`.
    ///
    /// Donors without a known distance are never dropped by this filter.
    #[must_use]
    pub const fn with_max_distance_km(mut self, km: Option<f64>) -> Self {
        self.max_distance_km = km;
        self
    }

    /// Eligible donors for `request`, best first.
    ///
    /// A donor is eligible when available and able to donate to the request's
    /// group. Plasma requests use the same table.
    #[must_use]
    pub fn find_candidates(
        &self,
        request: &Request,
        donors: &[Donor],
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let origin = request.location.point;

        let mut candidates: Vec<Candidate> = donors
            .iter()
            .filter(|d| d.available && d.blood_group.can_donate_to(request.blood_group))
            .map(|d| {
                let distance_km = origin
                    .zip(d.position)
                    .map(|(from, to)| from.distance_km(&to));
                Candidate {
                    score: score(distance_km, d.last_donation, now),
                    donor: d.clone(),
                    distance_km,
                }
            })
            .filter(|c| match (self.max_distance_km, c.distance_km) {
                (Some(limit), Some(km)) => km <= limit,
                _ => true,
            })
            .collect();

        candidates.sort_by(rank);
        candidates
    }
}

/// Groups that can donate to `recipient`.
#[must_use]
pub fn compatible_donor_groups(recipient: BloodGroup) -> SmallVec<[BloodGroup; 8]> {
    recipient.compatible_donors()
}

/// Groups that `donor` can donate to.
#[must_use]
pub fn compatible_recipient_groups(donor: BloodGroup) -> SmallVec<[BloodGroup; 8]> {
    donor.compatible_recipients()
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    let by_distance = match (a.distance_km, b.distance_km) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    // `None < Some`, and an earlier date means a longer wait.
    by_distance
        .then_with(|| a.donor.last_donation.cmp(&b.donor.last_donation))
        .then_with(|| a.donor.id.cmp(&b.donor.id))
}

#[allow(clippy::cast_precision_loss)]
fn score(
    distance_km: Option<f64>,
    last_donation: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let proximity = distance_km.map_or(0.0, |km| {
        (1.0 - km / SCORE_DISTANCE_HORIZON_KM).clamp(0.0, 1.0)
    });
    let rest = last_donation.map_or(1.0, |at| {
        let days = (now - at).num_hours() as f64 / 24.0;
        (days / SCORE_REST_HORIZON_DAYS).clamp(0.0, 1.0)
    });

    (0.6 * proximity + 0.4 * rest).clamp(0.0, 1.0)
}
