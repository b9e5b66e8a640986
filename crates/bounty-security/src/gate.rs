use crate::error::{GateError, Result};
use crate::events::{SecurityEvent, SecurityEventLog, SecuritySeverity};
use crate::format::{validate_submission, FormatConfig, ValidatedSubmission};
use crate::pause::{PauseFlags, PauseSwitch};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::scanner::{CodeScanner, ScanContext, ScanReport, ScannerConfig};
use bounty_types::{BountyId, ClaimantId, Submission, WalletAddress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Pause state at startup
    #[serde(default)]
    pub pause: PauseFlags,
}

/// Everything the gate looks at for one submission.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub bounty_id: &'a BountyId,
    pub submission: &'a Submission,
    /// Wallet registered at claim time
    pub fallback_wallet: Option<&'a WalletAddress>,
    pub task_labels: &'a [String],
}

/// Stateful front of the gate: owns rate counters, the pause switch and the
/// security event ring. It only vetoes; it never touches bounty records.
pub struct SecurityGate {
    config: GateConfig,
    rate_limiter: RateLimiter,
    scanner: CodeScanner,
    pause: PauseSwitch,
    events: SecurityEventLog,
}

impl SecurityGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            scanner: CodeScanner::new(config.scanner.clone()),
            pause: PauseSwitch::new(config.pause),
            events: SecurityEventLog::default(),
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn pause(&self) -> &PauseSwitch {
        &self.pause
    }

    pub fn events(&self) -> &SecurityEventLog {
        &self.events
    }

    pub fn is_internal(&self, claimant: &ClaimantId) -> bool {
        self.scanner.is_internal(claimant)
    }

    /// Admission of a submission toward payment: format validation, the
    /// restricted-task fence, a payable wallet, then rate limiting. The rate
    /// slot is consumed only when every earlier check passed.
    pub async fn admit_submission(
        &self,
        input: GateInput<'_>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedSubmission> {
        let author = &input.submission.author;

        let validated = validate_submission(
            input.submission,
            input.bounty_id,
            input.fallback_wallet,
            &self.config.format,
        )
        .and_then(|v| {
            self.fence_restricted(author, input.task_labels)?;
            if v.payout_wallet.is_none() {
                return Err(GateError::FormatInvalid(
                    "no payout wallet in submission or claim".to_string(),
                ));
            }
            Ok(v)
        });
        let validated = match validated {
            Ok(v) => v,
            Err(e) => {
                let (kind, severity) = match e {
                    GateError::SecurityRisk(_) => ("security_risk", SecuritySeverity::Critical),
                    _ => ("format_invalid", SecuritySeverity::Info),
                };
                self.events
                    .record(SecurityEvent::new(
                        kind,
                        severity,
                        format!("{}:{}", input.bounty_id, author),
                        e.to_string(),
                    ))
                    .await;
                return Err(e);
            }
        };

        if let Err(e) = self.rate_limiter.admit(author, now).await {
            self.events
                .record(SecurityEvent::new(
                    "rate_limited",
                    SecuritySeverity::Warning,
                    author.as_str(),
                    e.to_string(),
                ))
                .await;
            return Err(e);
        }

        debug!(bounty_id = %input.bounty_id, author = %author, "Submission admitted");
        Ok(validated)
    }

    /// Tasks carrying a restricted label take no work from external claimants.
    pub fn fence_restricted(&self, claimant: &ClaimantId, task_labels: &[String]) -> Result<()> {
        if self.is_internal(claimant) {
            return Ok(());
        }
        let restricted = &self.config.scanner.restricted_labels;
        match task_labels
            .iter()
            .find(|label| restricted.iter().any(|r| r.eq_ignore_ascii_case(label)))
        {
            Some(label) => Err(GateError::SecurityRisk(format!(
                "task labelled '{}' is restricted to internal submitters",
                label
            ))),
            None => Ok(()),
        }
    }

    /// Dangerous-pattern scan. A dirty report is recorded as a critical event.
    pub async fn scan_submission(
        &self,
        bounty_id: &BountyId,
        submission: &Submission,
        task_labels: &[String],
    ) -> ScanReport {
        let report = self.scanner.scan(
            &submission.diff,
            ScanContext {
                submitter: &submission.author,
                task_labels,
            },
        );
        if !report.is_clean() {
            self.events
                .record(SecurityEvent::new(
                    "security_risk",
                    SecuritySeverity::Critical,
                    format!("{}:{}", bounty_id, submission.author),
                    report.summary(),
                ))
                .await;
        }
        report
    }

    pub async fn record_payout(&self, claimant: &ClaimantId, at: DateTime<Utc>) {
        self.rate_limiter.record_payout(claimant, at).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(diff: &str) -> Submission {
        Submission {
            pr_number: 3,
            author: ClaimantId::new("alice").unwrap(),
            title: "Improve cache hit ratio".to_string(),
            description: format!(
                "Tunes the cache eviction policy to favour hot keys.\nCloses #42\nWallet: {}",
                WalletAddress::from_bytes([4u8; 32])
            ),
            diff: diff.to_string(),
            payout_wallet: None,
        }
    }

    fn input<'a>(bounty_id: &'a BountyId, submission: &'a Submission) -> GateInput<'a> {
        GateInput {
            bounty_id,
            submission,
            fallback_wallet: None,
            task_labels: &[],
        }
    }

    #[tokio::test]
    async fn test_malformed_submission_consumes_no_rate_slot() {
        let gate = SecurityGate::new(GateConfig {
            rate_limit: RateLimitConfig {
                max_submissions: 1,
                window_secs: 3600,
                payout_cooldown_secs: 0,
            },
            ..Default::default()
        });
        let id = BountyId::from(42);
        let mut bad = submission("+++ b/src/cache.rs\n+let x = 1;\n");
        bad.title = String::new();
        let good = submission("+++ b/src/cache.rs\n+let x = 1;\n");
        let now = Utc::now();

        assert!(matches!(
            gate.admit_submission(input(&id, &bad), now).await,
            Err(GateError::FormatInvalid(_))
        ));
        gate.admit_submission(input(&id, &good), now).await.unwrap();
        assert!(matches!(
            gate.admit_submission(input(&id, &good), now).await,
            Err(GateError::RateLimited { .. })
        ));
        assert_eq!(gate.events().by_type("rate_limited").await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_submissions_consume_no_rate_slot() {
        let gate = SecurityGate::new(GateConfig {
            rate_limit: RateLimitConfig {
                max_submissions: 1,
                window_secs: 3600,
                payout_cooldown_secs: 0,
            },
            format: FormatConfig {
                require_payout_wallet: false,
                ..Default::default()
            },
            ..Default::default()
        });
        let id = BountyId::from(42);
        let mut no_wallet = submission("+++ b/src/cache.rs\n+let x = 1;\n");
        no_wallet.description =
            "Tunes the cache eviction policy to favour hot keys.\nCloses #42".to_string();
        let good = submission("+++ b/src/cache.rs\n+let x = 1;\n");
        let now = Utc::now();

        assert!(matches!(
            gate.admit_submission(input(&id, &no_wallet), now).await,
            Err(GateError::FormatInvalid(_))
        ));
        let labels = vec!["Payment".to_string()];
        let fenced = GateInput {
            task_labels: &labels,
            ..input(&id, &good)
        };
        assert!(matches!(
            gate.admit_submission(fenced, now).await,
            Err(GateError::SecurityRisk(_))
        ));
        assert_eq!(gate.events().by_type("security_risk").await.len(), 1);

        gate.admit_submission(input(&id, &good), now).await.unwrap();
    }

    #[test]
    fn test_internal_submitters_pass_the_fence() {
        let gate = SecurityGate::new(GateConfig {
            scanner: ScannerConfig {
                internal_submitters: vec![ClaimantId::new("core-dev").unwrap()],
                ..Default::default()
            },
            ..Default::default()
        });
        let labels = vec!["auth".to_string(), "backend".to_string()];
        let core = ClaimantId::new("core-dev").unwrap();
        let alice = ClaimantId::new("alice").unwrap();

        assert!(gate.fence_restricted(&core, &labels).is_ok());
        assert!(gate.fence_restricted(&alice, &["backend".to_string()]).is_ok());
        assert!(matches!(
            gate.fence_restricted(&alice, &labels),
            Err(GateError::SecurityRisk(_))
        ));
    }
}
