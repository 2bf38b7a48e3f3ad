//! Short-lived shared visual effects

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::identity::EffectId;
use crate::math::Vec3;

/// Closed set of effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    Sparkle,
    Confetti,
    Hearts,
    Smoke,
    Fireworks,
}

impl EffectType {
    pub const ALL: [EffectType; 5] = [
        EffectType::Sparkle,
        EffectType::Confetti,
        EffectType::Hearts,
        EffectType::Smoke,
        EffectType::Fireworks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectType::Sparkle => "sparkle",
            EffectType::Confetti => "confetti",
            EffectType::Hearts => "hearts",
            EffectType::Smoke => "smoke",
            EffectType::Fireworks => "fireworks",
        }
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownEffectType(s.to_string()))
    }
}

/// A timed effect at a point in the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectInstance {
    pub id: EffectId,
    pub effect_type: EffectType,
    pub position: Vec3,
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds
    pub duration: f32,
}

impl EffectInstance {
    pub fn new(effect_type: EffectType, position: Vec3, duration: f32) -> Self {
        Self {
            id: EffectId::generate(),
            effect_type,
            position,
            created_at: Utc::now(),
            duration,
        }
    }

    /// Lifetime as a `Duration`; negative or non-finite values collapse to zero
    pub fn lifetime(&self) -> Duration {
        Duration::try_from_secs_f32(self.duration).unwrap_or(Duration::ZERO)
    }

    /// `now - created_at > duration`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.created_at);
        match elapsed.to_std() {
            Ok(elapsed) => elapsed > self.lifetime(),
            // Created in the future relative to `now` (clock skew)
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_clamps_invalid_durations() {
        let mut effect = EffectInstance::new(EffectType::Smoke, Vec3::ZERO, -1.0);
        assert_eq!(effect.lifetime(), Duration::ZERO);
        effect.duration = f32::NAN;
        assert_eq!(effect.lifetime(), Duration::ZERO);
    }

    #[test]
    fn test_expiry() {
        let effect = EffectInstance::new(EffectType::Sparkle, Vec3::ZERO, 3.0);
        let created = effect.created_at;
        assert!(!effect.is_expired_at(created + chrono::Duration::milliseconds(2900)));
        assert!(effect.is_expired_at(created + chrono::Duration::milliseconds(3100)));
    }

    #[test]
    fn test_future_created_at_is_not_expired() {
        let effect = EffectInstance::new(EffectType::Hearts, Vec3::ZERO, 1.0);
        let earlier = effect.created_at - chrono::Duration::seconds(10);
        assert!(!effect.is_expired_at(earlier));
    }
}
