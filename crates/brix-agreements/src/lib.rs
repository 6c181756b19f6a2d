pub mod error;
pub mod ledger;
pub mod monitor;
pub mod property;
pub mod repayment;
pub mod storage;
pub mod types;

pub use error::{AgreementError, Result};
pub use ledger::AgreementLedger;
pub use monitor::DefaultMonitor;
pub use property::{
    IdentityRegistry, MemoryIdentityRegistry, MemoryPropertyRegistry, PropertyRegistry,
};
pub use repayment::RepaymentProcessor;
pub use storage::{AgreementStore, MemoryAgreementStore};
pub use types::{
    Agreement, AgreementEvent, AgreementEventKind, AgreementParams, AgreementStatus,
    DefaultState, GovernanceMutation, RepaymentKind,
};

use brix_shares::{DistributionEngine, PayoutSink, RestrictionPolicy, ShareRegistry};
use std::sync::Arc;

/// Composition root wiring the agreement components over shared state.
pub struct AgreementEngine {
    pub store: Arc<dyn AgreementStore>,
    pub shares: Arc<ShareRegistry>,
    pub restrictions: Arc<RestrictionPolicy>,
    pub distribution: Arc<DistributionEngine>,
    pub ledger: Arc<AgreementLedger>,
    pub repayments: Arc<RepaymentProcessor>,
    pub monitor: Arc<DefaultMonitor>,
}

impl AgreementEngine {
    pub fn new(
        store: Arc<dyn AgreementStore>,
        properties: Arc<dyn PropertyRegistry>,
        identity: Option<Arc<dyn IdentityRegistry>>,
        sink: Arc<dyn PayoutSink>,
    ) -> Self {
        let shares = Arc::new(ShareRegistry::new());
        let restrictions = Arc::new(RestrictionPolicy::new());
        let distribution = Arc::new(DistributionEngine::new(shares.clone(), sink.clone()));
        let ledger = Arc::new(AgreementLedger::new(
            store.clone(),
            shares.clone(),
            restrictions.clone(),
            properties.clone(),
            identity,
        ));
        let repayments = Arc::new(RepaymentProcessor::new(
            store.clone(),
            shares.clone(),
            distribution.clone(),
            properties,
            sink,
        ));
        let monitor = Arc::new(DefaultMonitor::new(store.clone(), shares.clone()));

        Self {
            store,
            shares,
            restrictions,
            distribution,
            ledger,
            repayments,
            monitor,
        }
    }
}
