use crate::error::{GateError, Result};
use bounty_types::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseScope {
    /// Every transition that releases escrowed funds (settlement, refund)
    Payouts,
    /// Automated review of submissions
    Reviews,
}

impl fmt::Display for PauseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseScope::Payouts => write!(f, "payouts"),
            PauseScope::Reviews => write!(f, "reviews"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseFlags {
    #[serde(default)]
    pub payouts: bool,
    #[serde(default)]
    pub reviews: bool,
}

impl PauseFlags {
    pub fn get(&self, scope: PauseScope) -> bool {
        match scope {
            PauseScope::Payouts => self.payouts,
            PauseScope::Reviews => self.reviews,
        }
    }

    fn set(&mut self, scope: PauseScope, paused: bool) {
        match scope {
            PauseScope::Payouts => self.payouts = paused,
            PauseScope::Reviews => self.reviews = paused,
        }
    }
}

/// Record of an administrative toggle, to be written to the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseChange {
    pub scope: PauseScope,
    pub paused: bool,
    pub previous: bool,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

/// Held by a transition from its pause check until it commits. A toggle
/// waits for outstanding guards, so no transition can pass the check and
/// then act after the pause took effect.
pub struct PauseGuard<'a> {
    _flags: RwLockReadGuard<'a, PauseFlags>,
    scope: PauseScope,
}

impl PauseGuard<'_> {
    pub fn scope(&self) -> PauseScope {
        self.scope
    }
}

/// Process-wide emergency pause.
pub struct PauseSwitch {
    flags: RwLock<PauseFlags>,
}

impl PauseSwitch {
    pub fn new(initial: PauseFlags) -> Self {
        if initial.payouts || initial.reviews {
            warn!(
                payouts = initial.payouts,
                reviews = initial.reviews,
                "⏸️ Starting with emergency pause engaged"
            );
        }
        Self {
            flags: RwLock::new(initial),
        }
    }

    pub async fn snapshot(&self) -> PauseFlags {
        *self.flags.read().await
    }

    pub async fn is_paused(&self, scope: PauseScope) -> bool {
        self.flags.read().await.get(scope)
    }

    /// Fails with `SystemPaused` when `scope` is paused. Do not request a
    /// second guard while holding one.
    pub async fn guard(&self, scope: PauseScope) -> Result<PauseGuard<'_>> {
        let flags = self.flags.read().await;
        if flags.get(scope) {
            return Err(GateError::SystemPaused(scope));
        }
        Ok(PauseGuard {
            _flags: flags,
            scope,
        })
    }

    /// Toggle a scope. Only administrators may do this.
    pub async fn set(&self, scope: PauseScope, paused: bool, actor: &Actor) -> Result<PauseChange> {
        if !actor.is_admin() {
            warn!(actor = %actor, scope = %scope, "🚫 Non-admin attempted to toggle pause");
            return Err(GateError::Unauthorized(format!(
                "{} may not toggle the {} pause",
                actor, scope
            )));
        }

        let mut flags = self.flags.write().await;
        let previous = flags.get(scope);
        flags.set(scope, paused);

        if paused {
            warn!(actor = %actor, scope = %scope, "⏸️ Emergency pause engaged");
        } else {
            info!(actor = %actor, scope = %scope, "▶️ Emergency pause lifted");
        }

        Ok(PauseChange {
            scope,
            paused,
            previous,
            actor: actor.clone(),
            at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn admin() -> Actor {
        Actor::Admin("ops".to_string())
    }

    #[tokio::test]
    async fn test_guard_respects_scope() {
        let switch = PauseSwitch::new(PauseFlags::default());
        switch.set(PauseScope::Payouts, true, &admin()).await.unwrap();

        assert!(matches!(
            switch.guard(PauseScope::Payouts).await,
            Err(GateError::SystemPaused(PauseScope::Payouts))
        ));
        assert!(switch.guard(PauseScope::Reviews).await.is_ok());
    }

    #[tokio::test]
    async fn test_only_admin_toggles() {
        let switch = PauseSwitch::new(PauseFlags::default());
        let err = switch
            .set(PauseScope::Payouts, true, &Actor::Automation("bot".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Unauthorized(_)));
        assert!(!switch.is_paused(PauseScope::Payouts).await);

        let change = switch.set(PauseScope::Payouts, true, &admin()).await.unwrap();
        assert!(!change.previous);
        assert!(change.paused);
    }

    #[tokio::test]
    async fn test_toggle_waits_for_outstanding_guard() {
        let switch = Arc::new(PauseSwitch::new(PauseFlags::default()));
        let guard = switch.guard(PauseScope::Payouts).await.unwrap();

        let toggler = {
            let switch = switch.clone();
            tokio::spawn(async move { switch.set(PauseScope::Payouts, true, &admin()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!toggler.is_finished());

        drop(guard);
        toggler.await.unwrap().unwrap();
        assert!(switch.is_paused(PauseScope::Payouts).await);
    }
}
