//! Repayment processing: installments, late penalties, loan completion.

use chrono::{Months, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::Amount;
use crate::audit::AuditEntry;
use crate::model::{
    CashOperation, CashOperationType, Loan, LoanId, LoanStatus, Payment, PaymentMethod,
    Penalty, SessionId, SessionStatus, Transaction, TransactionType, UserId,
};
use crate::notify::Notification;

use super::{Ledger, PaymentError, is_staff_of};

/// Everything a successful repayment produced.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub loan: Loan,
    pub penalty: Option<Penalty>,
    pub fully_paid: bool,
}

impl Ledger {
    /// Record a repayment against an active loan.
    ///
    /// The amount must cover the minimum installment (the monthly payment,
    /// or the remaining balance when that is smaller, so the final
    /// installment stays payable) and may not exceed the remaining balance;
    /// both are hard rejections, never clamped. Payments more than the
    /// grace period past the due date incur a flat penalty on the monthly
    /// installment, charged once for this payment event. Loan update,
    /// payment, transaction, penalty and drawer movement commit as one unit
    /// under the store's write guard, which also serializes concurrent
    /// payments against the same loan.
    pub fn pay(
        &self,
        actor: UserId,
        loan_id: LoanId,
        amount: Amount,
        method: PaymentMethod,
        reference: Option<&str>,
        session_id: Option<SessionId>,
    ) -> Result<PaymentOutcome, PaymentError> {
        let mut tables = self.store.write();

        // -- validation, no side effects ---------------------------------
        let loan = tables
            .loans
            .get(&loan_id)
            .ok_or(PaymentError::LoanNotFound(loan_id))?;
        if loan.status != LoanStatus::Active {
            return Err(PaymentError::NotActive(loan_id, loan.status));
        }
        let loan_sfd = loan.sfd_id;
        let monthly = loan.monthly_payment;
        let remaining = loan.remaining_amount;
        let due_date = loan.next_payment_date;
        let member = tables.client_of_loan(loan).map(|c| c.user_id);

        let caller = tables
            .users
            .get(&actor)
            .ok_or(PaymentError::UnknownActor(actor))?;
        let is_borrower = member == Some(actor);
        let is_staff = is_staff_of(caller, loan_sfd);
        if !is_borrower && !is_staff {
            return Err(PaymentError::Forbidden(actor));
        }

        let minimum = monthly.min(remaining);
        if amount < minimum {
            return Err(PaymentError::BelowMinimum { amount, minimum });
        }
        if amount > remaining {
            return Err(PaymentError::ExceedsBalance { amount, remaining });
        }

        // Cash repayments land in a drawer: the one supplied, or the staff
        // caller's open session. A supplied drawer must belong to the loan's
        // institution, and to the caller when the caller is staff.
        let drawer = if method == PaymentMethod::Cash {
            match session_id {
                Some(id) => {
                    let session = tables
                        .sessions
                        .get(&id)
                        .filter(|s| s.status == SessionStatus::Open)
                        .ok_or(PaymentError::SessionNotOpen(id))?;
                    if session.sfd_id != loan_sfd || (is_staff && session.cashier_id != actor) {
                        return Err(PaymentError::SessionNotOwned(id));
                    }
                    Some(session.id)
                }
                None => tables.open_session_for(actor).map(|s| s.id),
            }
        } else {
            None
        };

        let today = Utc::now().date_naive();
        let days_overdue = due_date.map_or(0, |due| (today - due).num_days());
        let penalty_amount = if days_overdue > self.policies.penalty_grace_days {
            monthly.scale_bps(self.policies.penalty_rate_bps)
        } else {
            Amount::ZERO
        };

        // Penalty joins the amount owed for this cycle; the payment itself
        // is never clamped, so remaining stays non-negative.
        let new_remaining = remaining - amount + penalty_amount;
        let fully_paid = new_remaining <= Amount::ZERO;

        // -- atomic commit: no error paths past this point ---------------
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            loan_id,
            amount,
            method,
            reference: reference.map(str::to_string),
            payment_date: now,
        };
        tables.payments.push(payment.clone());

        let transaction = Transaction {
            id: Uuid::new_v4(),
            sfd_id: loan_sfd,
            user_id: member,
            tx_type: TransactionType::LoanRepayment,
            amount,
            reference: Some(format!("REPAY-{}", payment.id)),
            created_at: now,
        };
        tables.transactions.push(transaction.clone());

        if let Some(session_id) = drawer {
            tables.cash_operations.push(CashOperation {
                id: Uuid::new_v4(),
                session_id,
                transaction_id: transaction.id,
                op_type: CashOperationType::LoanRepayment,
                amount,
                created_at: now,
            });
        }

        let penalty = if penalty_amount > Amount::ZERO {
            let penalty = Penalty {
                id: Uuid::new_v4(),
                loan_id,
                payment_id: payment.id,
                amount: penalty_amount,
                days_overdue,
                applied_at: now,
            };
            tables.penalties.push(penalty.clone());
            Some(penalty)
        } else {
            None
        };

        let loan = tables
            .loans
            .get_mut(&loan_id)
            .expect("loan row vanished under the write guard");
        if fully_paid {
            loan.status = LoanStatus::Completed;
            loan.remaining_amount = Amount::ZERO;
            loan.next_payment_date = None;
        } else {
            loan.remaining_amount = new_remaining;
            loan.next_payment_date = due_date.map(|due| due + Months::new(1));
        }
        let loan = loan.clone();

        tables.audit(AuditEntry::new("loan_repayment", "loans").details(json!({
            "loan_id": loan_id,
            "payment_id": payment.id,
            "actor_id": actor,
            "amount": amount,
            "penalty": penalty_amount,
            "fully_paid": fully_paid,
        })));
        drop(tables);

        if let Some(user_id) = member {
            let event = if fully_paid {
                Notification::LoanCompleted { user_id, loan_id }
            } else {
                Notification::PaymentReceived {
                    user_id,
                    loan_id,
                    amount,
                    remaining: loan.remaining_amount,
                }
            };
            self.notifier().send(event);
        }

        Ok(PaymentOutcome {
            payment,
            loan,
            penalty,
            fully_paid,
        })
    }
}
