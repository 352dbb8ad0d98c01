//! Cash session lifecycle: open a drawer, close it against the ledger.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::Amount;
use crate::audit::{AuditEntry, Severity};
use crate::model::{CashSession, SessionId, SessionStatus, SfdId, UserId};

use super::{Ledger, SessionError, is_staff_of};

/// Result of closing a session.
#[derive(Debug, Clone, Serialize)]
pub struct CloseSummary {
    pub session_id: SessionId,
    pub closing_balance: Amount,
    pub expected_balance: Amount,
    /// counted minus expected.
    pub difference: Amount,
    /// The variance exceeds tolerance; a supervisor must review the count.
    pub requires_validation: bool,
}

impl Ledger {
    /// Open a drawer for a cashier's shift.
    ///
    /// Fails on a negative opening balance, an unknown or out-of-institution
    /// cashier, or a session already open for that cashier.
    pub fn open_session(
        &self,
        actor: UserId,
        sfd_id: SfdId,
        opening_balance: Amount,
        notes: Option<&str>,
    ) -> Result<CashSession, SessionError> {
        let mut tables = self.store.write();

        if opening_balance.is_negative() {
            return Err(SessionError::NegativeOpeningBalance(opening_balance));
        }
        let cashier = tables
            .users
            .get(&actor)
            .ok_or(SessionError::UnknownCashier(actor))?;
        if !is_staff_of(cashier, sfd_id) {
            return Err(SessionError::WrongInstitution(actor));
        }
        if tables.open_session_for(actor).is_some() {
            return Err(SessionError::AlreadyOpen(actor));
        }

        let session = CashSession {
            id: SessionId::new_v4(),
            cashier_id: actor,
            sfd_id,
            opening_balance,
            closing_balance: None,
            expected_balance: None,
            status: SessionStatus::Open,
            requires_validation: false,
            notes: notes.map(str::to_string),
            opened_at: Utc::now(),
            closed_at: None,
        };
        tables.sessions.insert(session.id, session.clone());

        tables.audit(AuditEntry::new("cash_session_opened", "cash").details(json!({
            "session_id": session.id,
            "cashier_id": actor,
            "opening_balance": opening_balance,
        })));

        Ok(session)
    }

    /// Close a drawer against the counted balance.
    ///
    /// The whole close runs under the store's write guard, so the balance
    /// computation cannot race an in-flight operation insert; once closed,
    /// later operations find no open session. A variance beyond tolerance
    /// flags the session rather than silently accepting the count.
    pub fn close_session(
        &self,
        actor: UserId,
        session_id: SessionId,
        counted_balance: Amount,
        notes: Option<&str>,
    ) -> Result<CloseSummary, SessionError> {
        let mut tables = self.store.write();

        let session = tables
            .sessions
            .get(&session_id)
            .filter(|s| s.status == SessionStatus::Open)
            .ok_or(SessionError::NotOpen(session_id))?;

        let owner = session.cashier_id;
        let session_sfd = session.sfd_id;
        if owner != actor {
            // A supervisor or admin of the institution may settle the drawer.
            let allowed = tables
                .users
                .get(&actor)
                .is_some_and(|u| u.role != crate::model::Role::Cashier && is_staff_of(u, session_sfd));
            if !allowed {
                return Err(SessionError::NotSessionOwner(actor));
            }
        }

        let expected = {
            let session = tables
                .sessions
                .get(&session_id)
                .ok_or(SessionError::NotOpen(session_id))?;
            tables.expected_balance(session)
        };
        let difference = counted_balance - expected;
        let requires_validation = difference.abs() > self.policies.close_tolerance;

        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or(SessionError::NotOpen(session_id))?;
        session.status = SessionStatus::Closed;
        session.closing_balance = Some(counted_balance);
        session.expected_balance = Some(expected);
        session.requires_validation = requires_validation;
        session.closed_at = Some(Utc::now());
        if let Some(notes) = notes {
            session.notes = Some(match session.notes.take() {
                Some(existing) => format!("{existing}\n{notes}"),
                None => notes.to_string(),
            });
        }

        let severity = if requires_validation {
            Severity::Warning
        } else {
            Severity::Info
        };
        tables.audit(
            AuditEntry::new("cash_session_closed", "cash")
                .severity(severity)
                .details(json!({
                    "session_id": session_id,
                    "expected_balance": expected,
                    "counted_balance": counted_balance,
                    "difference": difference,
                    "requires_validation": requires_validation,
                })),
        );

        Ok(CloseSummary {
            session_id,
            closing_balance: counted_balance,
            expected_balance: expected,
            difference,
            requires_validation,
        })
    }
}
