//! Error types for the money-movement operations.
//!
//! One enum per operation, aggregated into [`LedgerError`]. Every variant
//! maps onto a coarse [`ErrorKind`] that API surfaces expose to callers.

use serde::Serialize;
use thiserror::Error;

use crate::Amount;
use crate::model::{LoanId, LoanStatus, SessionId, UserId};

/// Coarse error taxonomy for API clients. Validation errors have no side effects and
/// are safe to retry after fixing the input; the rest describe why the
/// entity state or environment rejected the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidState,
    Forbidden,
    Precondition,
    InsufficientFunds,
    Conflict,
    NotFound,
}

/// Top-level error returned by [`Ledger::apply`](super::Ledger::apply).
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("cash session operation failed: {0}")]
    Session(#[from] SessionError),

    #[error("disbursement failed: {0}")]
    Disburse(#[from] DisburseError),

    #[error("payment failed: {0}")]
    Payment(#[from] PaymentError),

    #[error("webhook ingestion failed: {0}")]
    Webhook(#[from] WebhookError),

    #[error("account sync failed: {0}")]
    Sync(#[from] SyncError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Session(e) => e.kind(),
            LedgerError::Disburse(e) => e.kind(),
            LedgerError::Payment(e) => e.kind(),
            LedgerError::Webhook(e) => e.kind(),
            LedgerError::Sync(e) => e.kind(),
        }
    }
}

/// Error opening or closing a cash session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("opening balance {0} is negative")]
    NegativeOpeningBalance(Amount),

    #[error("cashier {0} not found")]
    UnknownCashier(UserId),

    #[error("cashier {0} does not belong to this institution")]
    WrongInstitution(UserId),

    #[error("cashier {0} already has an open session")]
    AlreadyOpen(UserId),

    #[error("cash session {0} not found or already closed")]
    NotOpen(SessionId),

    #[error("user {0} may not close this session")]
    NotSessionOwner(UserId),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NegativeOpeningBalance(_) => ErrorKind::Validation,
            SessionError::UnknownCashier(_) => ErrorKind::NotFound,
            SessionError::WrongInstitution(_) => ErrorKind::Forbidden,
            SessionError::AlreadyOpen(_) => ErrorKind::Conflict,
            SessionError::NotOpen(_) => ErrorKind::NotFound,
            SessionError::NotSessionOwner(_) => ErrorKind::Forbidden,
        }
    }
}

/// Error disbursing a loan.
#[derive(Debug, Error)]
pub enum DisburseError {
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    #[error("loan {0} is not approved (status: {1:?})")]
    NotApproved(LoanId, LoanStatus),

    #[error("actor {0} not found")]
    UnknownActor(UserId),

    #[error("actor {0} does not belong to the loan's institution")]
    WrongInstitution(UserId),

    #[error("no open cash session for cashier {0}")]
    NoOpenSession(UserId),

    #[error("cash session {0} is not open")]
    SessionNotOpen(SessionId),

    #[error("cash session {0} belongs to another cashier")]
    SessionNotOwned(SessionId),

    #[error("drawer balance {available} is below the loan amount {required}")]
    InsufficientCash {
        available: Amount,
        required: Amount,
    },
}

impl DisburseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DisburseError::LoanNotFound(_) => ErrorKind::NotFound,
            DisburseError::NotApproved(..) => ErrorKind::InvalidState,
            DisburseError::UnknownActor(_) => ErrorKind::NotFound,
            DisburseError::WrongInstitution(_) => ErrorKind::Forbidden,
            DisburseError::NoOpenSession(_) => ErrorKind::Precondition,
            DisburseError::SessionNotOpen(_) => ErrorKind::Precondition,
            DisburseError::SessionNotOwned(_) => ErrorKind::Forbidden,
            DisburseError::InsufficientCash { .. } => ErrorKind::InsufficientFunds,
        }
    }
}

/// Error recording a repayment.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    #[error("loan {0} is not active (status: {1:?})")]
    NotActive(LoanId, LoanStatus),

    #[error("actor {0} not found")]
    UnknownActor(UserId),

    #[error("actor {0} may not pay this loan")]
    Forbidden(UserId),

    #[error("amount {amount} is below the minimum installment {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },

    #[error("amount {amount} exceeds the remaining balance {remaining}")]
    ExceedsBalance { amount: Amount, remaining: Amount },

    #[error("cash session {0} is not open")]
    SessionNotOpen(SessionId),

    #[error("cash session {0} does not belong to this caller or institution")]
    SessionNotOwned(SessionId),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::LoanNotFound(_) => ErrorKind::NotFound,
            PaymentError::NotActive(..) => ErrorKind::InvalidState,
            PaymentError::UnknownActor(_) => ErrorKind::NotFound,
            PaymentError::Forbidden(_) => ErrorKind::Forbidden,
            PaymentError::BelowMinimum { .. } => ErrorKind::Validation,
            PaymentError::ExceedsBalance { .. } => ErrorKind::Validation,
            PaymentError::SessionNotOpen(_) => ErrorKind::Precondition,
            PaymentError::SessionNotOwned(_) => ErrorKind::Forbidden,
        }
    }
}

/// Error ingesting a mobile-money webhook. Unknown users are not errors:
/// the ingestor stores and acknowledges those payloads.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("non-positive amount {0}")]
    NonPositiveAmount(Amount),
}

impl WebhookError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WebhookError::Malformed(_) => ErrorKind::Validation,
            WebhookError::NonPositiveAmount(_) => ErrorKind::Validation,
        }
    }
}

/// Error synchronizing account rows.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("user {0} not found")]
    UnknownUser(UserId),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::UnknownUser(_) => ErrorKind::NotFound,
        }
    }
}
