use crate::error::{GateError, Result};
use bounty_types::ClaimantId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Submissions allowed per claimant inside one window
    #[serde(default = "default_max_submissions")]
    pub max_submissions: usize,
    /// Rolling window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Quiet period after a payout before the same claimant may submit again; 0 disables
    #[serde(default = "default_payout_cooldown_secs")]
    pub payout_cooldown_secs: u64,
}

fn default_max_submissions() -> usize {
    5
}

fn default_window_secs() -> u64 {
    3600
}

fn default_payout_cooldown_secs() -> u64 {
    86_400
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_submissions: default_max_submissions(),
            window_secs: default_window_secs(),
            payout_cooldown_secs: default_payout_cooldown_secs(),
        }
    }
}

impl RateLimitConfig {
    fn window(&self) -> Duration {
        Duration::seconds(self.window_secs as i64)
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(self.payout_cooldown_secs as i64)
    }
}

/// Rate-limit state for one claimant at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateState {
    /// Admitted submissions, oldest first
    pub recent: Vec<DateTime<Utc>>,
    pub last_payout: Option<DateTime<Utc>>,
}

/// Pure rolling-window check.
pub fn check_rate(
    claimant: &ClaimantId,
    state: &RateState,
    now: DateTime<Utc>,
    config: &RateLimitConfig,
) -> Result<()> {
    if config.payout_cooldown_secs > 0 {
        if let Some(paid_at) = state.last_payout {
            let ready_at = paid_at + config.cooldown();
            if ready_at > now {
                return Err(GateError::RateLimited {
                    claimant: claimant.to_string(),
                    retry_after_secs: (ready_at - now).num_seconds().max(1),
                });
            }
        }
    }

    let window_start = now - config.window();
    let in_window: Vec<&DateTime<Utc>> =
        state.recent.iter().filter(|t| **t > window_start).collect();

    if in_window.len() >= config.max_submissions {
        // The oldest entry inside the window is the next to age out
        let oldest = in_window.first().map(|t| **t).unwrap_or(now);
        let retry_after = (oldest + config.window() - now).num_seconds().max(1);
        return Err(GateError::RateLimited {
            claimant: claimant.to_string(),
            retry_after_secs: retry_after,
        });
    }

    Ok(())
}

/// Process-wide rate-limit counters.
pub struct RateLimiter {
    config: RateLimitConfig,
    submissions: Mutex<HashMap<ClaimantId, VecDeque<DateTime<Utc>>>>,
    payouts: Mutex<HashMap<ClaimantId, DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            submissions: Mutex::new(HashMap::new()),
            payouts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn state(&self, claimant: &ClaimantId) -> RateState {
        let submissions = self.submissions.lock().await;
        let payouts = self.payouts.lock().await;
        RateState {
            recent: submissions
                .get(claimant)
                .map(|q| q.iter().copied().collect())
                .unwrap_or_default(),
            last_payout: payouts.get(claimant).copied(),
        }
    }

    /// Check without consuming a slot.
    pub async fn check(&self, claimant: &ClaimantId, now: DateTime<Utc>) -> Result<()> {
        let state = self.state(claimant).await;
        check_rate(claimant, &state, now, &self.config)
    }

    /// Check and consume a slot atomically.
    pub async fn admit(&self, claimant: &ClaimantId, now: DateTime<Utc>) -> Result<()> {
        let mut submissions = self.submissions.lock().await;
        let last_payout = self.payouts.lock().await.get(claimant).copied();

        let history = submissions.entry(claimant.clone()).or_default();
        let window_start = now - self.config.window();
        while history.front().is_some_and(|t| *t <= window_start) {
            history.pop_front();
        }

        let state = RateState {
            recent: history.iter().copied().collect(),
            last_payout,
        };
        if let Err(e) = check_rate(claimant, &state, now, &self.config) {
            warn!(claimant = %claimant, in_window = history.len(), "🚦 Submission rate limited");
            return Err(e);
        }

        history.push_back(now);
        debug!(
            claimant = %claimant,
            in_window = history.len(),
            limit = self.config.max_submissions,
            "Submission admitted by rate limiter"
        );
        Ok(())
    }

    pub async fn record_payout(&self, claimant: &ClaimantId, at: DateTime<Utc>) {
        self.payouts.lock().await.insert(claimant.clone(), at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ClaimantId {
        ClaimantId::new("alice").unwrap()
    }

    #[tokio::test]
    async fn test_window_limit_and_recovery() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_submissions: 2,
            window_secs: 3600,
            payout_cooldown_secs: 0,
        });
        let t0 = Utc::now();

        limiter.admit(&alice(), t0).await.unwrap();
        limiter.admit(&alice(), t0 + Duration::minutes(1)).await.unwrap();

        let err = limiter
            .admit(&alice(), t0 + Duration::minutes(2))
            .await
            .unwrap_err();
        match err {
            GateError::RateLimited { retry_after_secs, .. } => {
                assert_eq!(retry_after_secs, 58 * 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // First submission ages out of the window
        limiter
            .admit(&alice(), t0 + Duration::minutes(61))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_limits_are_per_claimant() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_submissions: 1,
            window_secs: 3600,
            payout_cooldown_secs: 0,
        });
        let bob = ClaimantId::new("bob").unwrap();
        let now = Utc::now();

        limiter.admit(&alice(), now).await.unwrap();
        assert!(limiter.admit(&alice(), now).await.is_err());
        limiter.admit(&bob, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_payout_cooldown() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_submissions: 10,
            window_secs: 60,
            payout_cooldown_secs: 86_400,
        });
        let paid = Utc::now();
        limiter.record_payout(&alice(), paid).await;

        assert!(limiter.check(&alice(), paid + Duration::hours(23)).await.is_err());
        assert!(limiter.check(&alice(), paid + Duration::hours(25)).await.is_ok());
    }

    #[test]
    fn test_check_is_pure() {
        let config = RateLimitConfig {
            max_submissions: 1,
            window_secs: 60,
            payout_cooldown_secs: 0,
        };
        let now = Utc::now();
        let state = RateState {
            recent: vec![now - Duration::seconds(30)],
            last_payout: None,
        };
        assert!(check_rate(&alice(), &state, now, &config).is_err());
        assert!(check_rate(&alice(), &state, now + Duration::seconds(31), &config).is_ok());
    }
}
