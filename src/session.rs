//! Session - owns the portfolio and serialises batch application.
//!
//! One writer applies batches under the write lock; any number of readers see
//! the state between batches, never in the middle of one. Session time is
//! also readable without the lock through [`GlobalTime`].

use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::applier::{ApplyOutcome, ProtocolMessageApplier};
use crate::audit::AuditLog;
use crate::core::{Config, GlobalTime, Result};
use crate::portfolio::{Portfolio, SecurityState};
use crate::report::{NoopSink, SnapshotSink, StateFileSink};
use crate::valuation::{Valuation, ValuationEngine};

/// Best-effort outputs produced around each batch.
struct Artefacts {
    audit: AuditLog,
    sink: Box<dyn SnapshotSink>,
}

pub struct Session {
    state: Arc<RwLock<Portfolio>>,
    clock: GlobalTime,
    applier: ProtocolMessageApplier,
    artefacts: Mutex<Artefacts>,
}

impl Session {
    /// Build a session from configuration, opening audit logs and state files
    /// where paths are configured.
    pub fn new(config: &Config) -> Self {
        let audit = match &config.paths.log_dir {
            Some(dir) => AuditLog::open(dir),
            None => AuditLog::disabled(),
        };
        let sink: Box<dyn SnapshotSink> = match &config.paths.state_dir {
            Some(dir) => Box::new(StateFileSink::new(dir, config.session.clone())),
            None => Box::new(NoopSink),
        };
        Self::with_artefacts(config, audit, sink)
    }

    pub fn with_artefacts(config: &Config, audit: AuditLog, sink: Box<dyn SnapshotSink>) -> Self {
        let clock = GlobalTime::new(config.session.init);
        Self {
            state: Arc::new(RwLock::new(Portfolio::new(clock.clone()))),
            clock,
            applier: ProtocolMessageApplier::new(config.session.clone()),
            artefacts: Mutex::new(Artefacts { audit, sink }),
        }
    }

    /// Apply one batch atomically with respect to readers.
    ///
    /// The raw batch is logged before it is applied. The field dump and state
    /// file are written afterwards under a read lock; their failures are
    /// logged and otherwise ignored.
    pub fn apply(&self, batch: &str) -> Result<ApplyOutcome> {
        let mut artefacts = self.artefacts.lock();
        artefacts.audit.log_raw(batch);

        let mut pf = self.state.write();
        let outcome = self.applier.apply(&mut pf, batch)?;
        let pf = RwLockWriteGuard::downgrade(pf);

        artefacts.audit.dump_fields(&pf);
        if let Err(e) = artefacts.sink.write_snapshot(&pf) {
            tracing::warn!("Failed to write state snapshot at t={}: {}", pf.time(), e);
        }
        Ok(outcome)
    }

    /// Consistent view of the last fully applied batch.
    pub fn read(&self) -> RwLockReadGuard<'_, Portfolio> {
        self.state.read()
    }

    /// Session time without taking the state lock.
    pub fn time(&self) -> i32 {
        self.clock.load()
    }

    /// Clock handle for replay readers that publish into session time.
    pub fn clock(&self) -> GlobalTime {
        self.clock.clone()
    }

    pub fn valuation(&self) -> Valuation {
        ValuationEngine::evaluate(&self.read())
    }

    pub fn state_vec(&self) -> Vec<SecurityState> {
        self.read().state_vec()
    }
}
