use crate::config::NodeConfig;
use crate::keys;
use anyhow::{bail, Context, Result};
use bounty_core::{
    AuditEntry, AuditLog, BountyEvent, BountyState, BountyStateMachine, FileAuditLog,
    MemoryRecordStore, RecordStore,
};
use bounty_ledger::{EscrowLedger, SimulatedChain};
use bounty_security::{verify_webhook_signature, SecurityGate};
use bounty_types::{BountyId, WalletAddress};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A running payout daemon: storage, audit log, gate and ledger wired into
/// one state machine, plus the background expiry and payout schedulers.
pub struct BountyNode {
    config: NodeConfig,
    machine: Arc<BountyStateMachine>,
    chain: Arc<SimulatedChain>,
    webhook_secret: Option<Vec<u8>>,
}

impl BountyNode {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        info!(name = %config.node.name, data_dir = ?config.node.data_dir, "🚀 Starting bounty node");

        std::fs::create_dir_all(&config.node.data_dir)
            .with_context(|| format!("Failed to create data dir {:?}", config.node.data_dir))?;

        let store = Self::open_store(&config)?;
        let audit: Arc<dyn AuditLog> = Arc::new(FileAuditLog::open(config.audit_log_path()).await?);
        let gate = Arc::new(SecurityGate::new(config.security.clone()));

        let ledger_config = config.ledger_config()?;
        let chain = Arc::new(SimulatedChain::new(ledger_config.mint));
        warn!("⚠️ Chain backend is simulated; deposits and payouts stay in memory");

        let authority = keys::load_or_create(&config.authority_key_path())?;
        let ledger = Arc::new(EscrowLedger::new(chain.clone(), authority, ledger_config)?);

        let machine = Arc::new(BountyStateMachine::new(
            store,
            audit,
            gate,
            ledger,
            config.engine.clone(),
        ));

        let webhook_secret = std::env::var(&config.node.webhook_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
            .map(String::into_bytes);
        if webhook_secret.is_none() {
            warn!(
                env = %config.node.webhook_secret_env,
                "Webhook secret not set; inbound webhooks will be refused"
            );
        }

        Ok(Self {
            config,
            machine,
            chain,
            webhook_secret,
        })
    }

    fn open_store(config: &NodeConfig) -> Result<Arc<dyn RecordStore>> {
        let store: Arc<dyn RecordStore> = match config.storage.backend.as_str() {
            "rocksdb" => {
                #[cfg(feature = "rocksdb")]
                {
                    let path = config.node.data_dir.join("records");
                    Arc::new(bounty_core::RocksDbRecordStore::open(&path)?)
                }
                #[cfg(not(feature = "rocksdb"))]
                {
                    warn!("RocksDB backend requested but feature not enabled, falling back to memory");
                    Arc::new(MemoryRecordStore::new())
                }
            }
            "memory" => Arc::new(MemoryRecordStore::new()),
            other => bail!("Unknown storage backend '{}'", other),
        };
        debug!(backend = %config.storage.backend, "Record store ready");
        Ok(store)
    }

    /// Replace the webhook secret read from the environment.
    pub fn with_webhook_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn machine(&self) -> &Arc<BountyStateMachine> {
        &self.machine
    }

    /// The simulated chain behind the ledger.
    pub fn chain(&self) -> &Arc<SimulatedChain> {
        &self.chain
    }

    pub fn escrow_address(&self) -> WalletAddress {
        self.machine.ledger().escrow_address()
    }

    /// Verify the signature header, decode the event and apply it.
    pub async fn ingest_webhook(&self, body: &[u8], signature_header: &str) -> Result<BountyState> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            bail!("Webhook secret not configured");
        };
        verify_webhook_signature(body, signature_header, secret)?;

        let event: BountyEvent =
            serde_json::from_slice(body).context("Webhook body is not a bounty event")?;
        info!(event = event.name(), bounty_id = %event.bounty_id(), "📦 Webhook received");
        Ok(self.machine.handle(event).await?)
    }

    pub async fn audit_trail(&self, id: &BountyId) -> Result<Vec<AuditEntry>> {
        Ok(self.machine.audit_trail(id).await?)
    }

    /// One pass of the claim-expiry sweep.
    pub async fn sweep_expired(&self) -> usize {
        match self.machine.expire_stale_claims(Utc::now()).await {
            Ok(expired) => {
                if !expired.is_empty() {
                    info!(count = expired.len(), "⏳ Expired stale claims");
                }
                expired.len()
            }
            Err(e) => {
                warn!(error = %e, "Claim expiry sweep failed");
                0
            }
        }
    }

    /// One pass of the payout worker.
    pub async fn run_payouts(&self) -> usize {
        match self.machine.process_payouts().await {
            Ok(paid) => {
                if !paid.is_empty() {
                    info!(count = paid.len(), "💸 Payout pass settled bounties");
                }
                paid.len()
            }
            Err(e) => {
                warn!(error = %e, "Payout pass failed");
                0
            }
        }
    }

    /// Run both schedulers until ctrl-c.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Run both schedulers until `shutdown` resolves.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut expiry = interval(Duration::from_secs(self.config.scheduler.expiry_interval_secs));
        let mut payouts = interval(Duration::from_secs(self.config.scheduler.payout_interval_secs));
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        payouts.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            escrow = %self.escrow_address(),
            expiry_secs = self.config.scheduler.expiry_interval_secs,
            payout_secs = self.config.scheduler.payout_interval_secs,
            "✅ Bounty node running"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = expiry.tick() => {
                    self.sweep_expired().await;
                }
                _ = payouts.tick() => {
                    self.run_payouts().await;
                }
            }
        }

        let pending = self.machine.queue().pending().await;
        if !pending.is_empty() {
            warn!(count = pending.len(), "Settlements awaiting an operator at shutdown");
        }
        info!("🛑 Bounty node stopped");
        Ok(())
    }
}
