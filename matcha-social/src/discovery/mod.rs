pub mod filter;
pub mod sql;

use serde::Serialize;
use uuid::Uuid;

use crate::models::Profile;

pub use filter::{compile, Candidate, DiscoveryPlan, LimitBounds};

/// A profile that survived the plan, with the two values computed relative
/// to the requester.
#[derive(Debug, Clone)]
pub struct ScoredProfile {
    pub profile: Profile,
    pub distance_km: Option<f64>,
    pub common_interests: i64,
}

/// Discovery result row as returned to the client. Contact fields stay out.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredProfile {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub sexual_preference: String,
    pub age: i32,
    pub biography: Option<String>,
    pub fame_rating: i32,
    pub interests: Vec<String>,
    pub distance_km: Option<f64>,
    pub common_interests: i64,
    pub is_online: bool,
}

impl DiscoveredProfile {
    pub fn new(scored: ScoredProfile, is_online: bool) -> Self {
        let ScoredProfile { profile, distance_km, common_interests } = scored;
        Self {
            id: profile.id,
            username: profile.username,
            first_name: profile.first_name,
            last_name: profile.last_name,
            gender: profile.gender,
            sexual_preference: profile.sexual_preference,
            age: profile.age,
            biography: profile.biography,
            fame_rating: profile.fame_rating,
            interests: profile.interests,
            distance_km: distance_km.map(|d| (d * 100.0).round() / 100.0),
            common_interests,
            is_online,
        }
    }
}
