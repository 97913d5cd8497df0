use std::str::FromStr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Rotation pool used when no explicit user agent is configured.
pub const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Mobile/15E148 Safari/604.1",
];

/// Keeps pacing draws off the candidate stream.
const PACING_SEED_SALT: u64 = 0x5041_4345_5f55_4131;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UaRotation {
    #[default]
    Session,
    PerAttempt,
}

impl FromStr for UaRotation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "per-attempt" | "per_attempt" | "per-request" | "attempt" => Ok(Self::PerAttempt),
            _ => Err(format!("Unknown user agent rotation: {}. Use session or per-attempt", s)),
        }
    }
}

/// Inter-attempt delay and user agent choice.
#[derive(Debug, Clone)]
pub struct Pacer {
    pacing_ms: u64,
    jitter_pct: f64,
    rotation: UaRotation,
    fixed_user_agent: Option<String>,
    rng: StdRng,
}

impl Pacer {
    pub fn new(
        seed: u64,
        pacing_ms: u64,
        jitter_pct: f64,
        rotation: UaRotation,
        fixed_user_agent: Option<String>,
    ) -> Self {
        Self {
            pacing_ms,
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
            rotation,
            fixed_user_agent,
            rng: StdRng::seed_from_u64(seed ^ PACING_SEED_SALT),
        }
    }

    /// `pacing_ms × (1 ± jitter_pct)`, never negative.
    pub fn next_delay(&mut self) -> Duration {
        if self.pacing_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.pacing_ms as f64;
        let jitter = base * self.jitter_pct;
        let offset = if jitter > 0.0 { self.rng.gen_range(-jitter..=jitter) } else { 0.0 };
        Duration::from_millis((base + offset).max(0.0).round() as u64)
    }

    /// User agent applied once at session start.
    pub fn session_user_agent(&mut self) -> Option<String> {
        if let Some(ua) = &self.fixed_user_agent {
            return Some(ua.clone());
        }
        Some(self.pick_user_agent())
    }

    /// User agent for the next attempt, when rotation is per attempt.
    pub fn attempt_user_agent(&mut self) -> Option<String> {
        if self.rotation != UaRotation::PerAttempt || self.fixed_user_agent.is_some() {
            return None;
        }
        Some(self.pick_user_agent())
    }

    fn pick_user_agent(&mut self) -> String {
        let idx = self.rng.gen_range(0..USER_AGENT_POOL.len());
        USER_AGENT_POOL[idx].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_pacing() {
        let mut p = Pacer::new(1, 0, 0.5, UaRotation::Session, None);
        assert_eq!(p.next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let mut p = Pacer::new(7, 1000, 0.2, UaRotation::Session, None);
        for _ in 0..100 {
            let ms = p.next_delay().as_millis();
            assert!((800..=1200).contains(&ms), "{}", ms);
        }
        let mut flat = Pacer::new(7, 250, 0.0, UaRotation::Session, None);
        assert_eq!(flat.next_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_same_seed_same_delays() {
        let mut a = Pacer::new(1337, 500, 0.3, UaRotation::PerAttempt, None);
        let mut b = Pacer::new(1337, 500, 0.3, UaRotation::PerAttempt, None);
        for _ in 0..10 {
            assert_eq!(a.next_delay(), b.next_delay());
            assert_eq!(a.attempt_user_agent(), b.attempt_user_agent());
        }
    }

    #[test]
    fn test_rotation_modes() {
        let mut session = Pacer::new(3, 0, 0.0, UaRotation::Session, None);
        assert!(session.session_user_agent().is_some());
        assert!(session.attempt_user_agent().is_none());

        let mut fixed = Pacer::new(3, 0, 0.0, UaRotation::PerAttempt, Some("probe/1.0".into()));
        assert_eq!(fixed.session_user_agent().as_deref(), Some("probe/1.0"));
        assert!(fixed.attempt_user_agent().is_none());

        let mut rotating = Pacer::new(3, 0, 0.0, UaRotation::PerAttempt, None);
        let ua = rotating.attempt_user_agent().unwrap_or_default();
        assert!(USER_AGENT_POOL.contains(&ua.as_str()));
    }

    #[test]
    fn test_rotation_from_str() {
        assert_eq!("per-attempt".parse::<UaRotation>().unwrap(), UaRotation::PerAttempt);
        assert!("hourly".parse::<UaRotation>().is_err());
    }
}
