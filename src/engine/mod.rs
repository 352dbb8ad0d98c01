//! The loan money-movement engine.
//!
//! [`Ledger`] gathers the five processors (cash sessions, disbursement,
//! repayment, webhook ingestion, account sync) around one store. All
//! operations are short-lived request handlers: they validate, commit
//! atomically under the store's write guard, then emit best-effort side
//! effects (audit rows, notifications). Also supports an async stream of
//! operations for journal replay.

use std::sync::Arc;

use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::Amount;
use crate::model::{LoanId, PaymentMethod, SessionId, SfdId, User, UserId};
use crate::notify::Notifier;
use crate::policy::Policies;
use crate::store::LedgerStore;

mod accounts;
mod disburse;
mod repay;
mod session;
mod webhook;

pub use accounts::SyncReport;
pub use disburse::Disbursed;
pub use repay::PaymentOutcome;
pub use session::CloseSummary;
pub use webhook::{MobileMoneyPayload, WebhookOutcome};

mod error;
pub use error::{
    DisburseError, ErrorKind, LedgerError, PaymentError, SessionError, SyncError, WebhookError,
};

/// One money-movement request, with all identities resolved. This is the
/// unit the replay harness streams into the engine.
#[derive(Debug, Clone)]
pub enum Operation {
    OpenSession {
        actor: UserId,
        sfd: SfdId,
        opening_balance: Amount,
        notes: Option<String>,
    },
    CloseSession {
        actor: UserId,
        session: SessionId,
        counted_balance: Amount,
        notes: Option<String>,
    },
    Disburse {
        actor: UserId,
        loan: LoanId,
        method: PaymentMethod,
        session: Option<SessionId>,
    },
    Pay {
        actor: UserId,
        loan: LoanId,
        amount: Amount,
        method: PaymentMethod,
        reference: Option<String>,
        session: Option<SessionId>,
    },
}

/// The money-movement engine.
pub struct Ledger {
    store: Arc<LedgerStore>,
    policies: Policies,
    notifier: Notifier,
}

impl Ledger {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self {
            store,
            policies: Policies::default(),
            notifier: Notifier::disabled(),
        }
    }

    pub fn with_policies(mut self, policies: Policies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Drain a stream of operations. Any single failure is logged by
    /// [`apply`](Self::apply) and must not stop the engine.
    pub async fn run(&self, mut stream: impl Stream<Item = Operation> + Unpin) {
        while let Some(op) = stream.next().await {
            let _ = self.apply(op);
        }
    }

    /// Apply a single operation, tracing the outcome.
    pub fn apply(&self, op: Operation) -> Result<(), LedgerError> {
        match op {
            Operation::OpenSession {
                actor,
                sfd,
                opening_balance,
                notes,
            } => {
                let result = self.open_session(actor, sfd, opening_balance, notes.as_deref());
                Self::log_result("open_session", actor, &result);
                result?;
            }
            Operation::CloseSession {
                actor,
                session,
                counted_balance,
                notes,
            } => {
                let result =
                    self.close_session(actor, session, counted_balance, notes.as_deref());
                Self::log_result("close_session", actor, &result);
                result?;
            }
            Operation::Disburse {
                actor,
                loan,
                method,
                session,
            } => {
                let result = self.disburse(actor, loan, method, session);
                Self::log_result("disburse", actor, &result);
                result?;
            }
            Operation::Pay {
                actor,
                loan,
                amount,
                method,
                reference,
                session,
            } => {
                let result = self.pay(actor, loan, amount, method, reference.as_deref(), session);
                Self::log_result("pay", actor, &result);
                result?;
            }
        }
        Ok(())
    }

    fn log_result<T, E: std::fmt::Display>(
        op_name: &str,
        actor: UserId,
        result: &Result<T, E>,
    ) {
        match result {
            Ok(_) => info!(actor = %actor, "{op_name} applied"),
            Err(e) => info!(actor = %actor, reason = %e, "{op_name} skipped"),
        }
    }
}

/// Staff of the given institution: a cashier/supervisor/admin employed by it.
pub(crate) fn is_staff_of(user: &User, sfd_id: SfdId) -> bool {
    user.role.is_staff() && user.sfd_id == Some(sfd_id)
}
