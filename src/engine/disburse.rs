//! Loan disbursement: approved -> active, funds out the door.

use chrono::{Months, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::model::{
    CashOperation, CashOperationType, LoanId, LoanStatus, PaymentMethod, SessionId,
    SessionStatus, SubsidyUsage, Transaction, TransactionType, UserId,
};
use crate::notify::Notification;

use super::{DisburseError, Ledger, is_staff_of};

/// Everything a successful disbursement produced.
#[derive(Debug, Clone, Serialize)]
pub struct Disbursed {
    pub loan: crate::model::Loan,
    pub transaction: Transaction,
    pub subsidy_used: Option<SubsidyUsage>,
}

impl Ledger {
    /// Disburse an approved loan.
    ///
    /// Validation (state, authorization, drawer funding, subsidy match) has
    /// no side effects and may be retried freely; the commit then applies
    /// loan activation, the ledger transaction, the drawer movement and the
    /// subsidy consumption as one unit under the store's write guard. A
    /// caller retrying after a timeout must first re-check the loan status:
    /// an already-active loan fails the state check, which is the
    /// double-disbursement guard.
    pub fn disburse(
        &self,
        actor: UserId,
        loan_id: LoanId,
        method: PaymentMethod,
        session_id: Option<SessionId>,
    ) -> Result<Disbursed, DisburseError> {
        let mut tables = self.store.write();

        // -- validation, no side effects ---------------------------------
        let loan = tables
            .loans
            .get(&loan_id)
            .ok_or(DisburseError::LoanNotFound(loan_id))?;
        if loan.status != LoanStatus::Approved {
            return Err(DisburseError::NotApproved(loan_id, loan.status));
        }
        let loan_sfd = loan.sfd_id;
        let loan_amount = loan.amount;
        let member = tables.client_of_loan(loan).map(|c| c.user_id);

        let staff = tables
            .users
            .get(&actor)
            .ok_or(DisburseError::UnknownActor(actor))?;
        if !is_staff_of(staff, loan_sfd) {
            return Err(DisburseError::WrongInstitution(actor));
        }

        let funding_session = if method == PaymentMethod::Cash {
            let session = match session_id {
                Some(id) => {
                    let session = tables
                        .sessions
                        .get(&id)
                        .filter(|s| s.status == SessionStatus::Open)
                        .ok_or(DisburseError::SessionNotOpen(id))?;
                    if session.cashier_id != actor {
                        return Err(DisburseError::SessionNotOwned(id));
                    }
                    session
                }
                None => tables
                    .open_session_for(actor)
                    .ok_or(DisburseError::NoOpenSession(actor))?,
            };
            let available = tables.expected_balance(session);
            if available < loan_amount {
                return Err(DisburseError::InsufficientCash {
                    available,
                    required: loan_amount,
                });
            }
            Some(session.id)
        } else {
            None
        };

        let subsidy_id = tables.first_fit_subsidy(loan_sfd, loan_amount).map(|s| s.id);

        // -- atomic commit: no error paths past this point ---------------
        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            sfd_id: loan_sfd,
            user_id: member,
            tx_type: TransactionType::LoanDisbursement,
            amount: loan_amount,
            reference: Some(format!("LOAN-{loan_id}")),
            created_at: now,
        };
        tables.transactions.push(transaction.clone());

        if let Some(session_id) = funding_session {
            tables.cash_operations.push(CashOperation {
                id: Uuid::new_v4(),
                session_id,
                transaction_id: transaction.id,
                op_type: CashOperationType::LoanDisbursement,
                amount: loan_amount,
                created_at: now,
            });
        }

        let subsidy_used = subsidy_id.map(|id| {
            let subsidy = tables
                .subsidies
                .get_mut(&id)
                .expect("subsidy row vanished under the write guard");
            subsidy.used_amount += loan_amount;
            let usage = SubsidyUsage {
                id: Uuid::new_v4(),
                subsidy_id: id,
                loan_id,
                amount: loan_amount,
                used_at: now,
            };
            tables.subsidy_usages.push(usage.clone());
            usage
        });

        let loan = tables
            .loans
            .get_mut(&loan_id)
            .expect("loan row vanished under the write guard");
        loan.status = LoanStatus::Active;
        loan.disbursed_at = Some(now);
        loan.next_payment_date = Some(now.date_naive() + Months::new(1));
        let loan = loan.clone();

        tables.audit(AuditEntry::new("loan_disbursed", "loans").details(json!({
            "loan_id": loan_id,
            "actor_id": actor,
            "amount": loan_amount,
            "method": method,
            "cash_session_id": funding_session,
            "subsidy_id": subsidy_id,
        })));
        drop(tables);

        // Best effort; never rolls back the commit.
        if let Some(user_id) = member {
            self.notifier().send(Notification::LoanDisbursed {
                user_id,
                loan_id,
                amount: loan_amount,
            });
        }

        Ok(Disbursed {
            loan,
            transaction,
            subsidy_used,
        })
    }
}
