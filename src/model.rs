//! Core domain rows for the microfinance ledger.
//!
//! Every struct here maps onto one row of the backing store. Rows are plain
//! data: all money-movement rules live in the engine modules.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Amount;

/// Institution (SFD) identifier.
pub type SfdId = Uuid;

/// User identifier (staff or member).
pub type UserId = Uuid;

/// Client-record identifier (membership of a user in one SFD).
pub type ClientId = Uuid;

/// Loan identifier.
pub type LoanId = Uuid;

/// Payment identifier.
pub type PaymentId = Uuid;

/// Cash session identifier.
pub type SessionId = Uuid;

/// Subsidy identifier.
pub type SubsidyId = Uuid;

/// Ledger transaction identifier.
pub type TransactionId = Uuid;

/// Account identifier.
pub type AccountId = Uuid;

/// Stored webhook identifier.
pub type WebhookId = Uuid;

/// A microfinance institution (tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sfd {
    pub id: SfdId,
    pub name: String,
}

/// Role a user acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Cashier,
    Supervisor,
    Admin,
}

impl Role {
    /// Staff roles may operate drawers and move institution money.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Cashier | Role::Supervisor | Role::Admin)
    }
}

/// A user of the platform. Staff users carry the SFD that employs them;
/// members are tied to institutions through [`Client`] records instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub sfd_id: Option<SfdId>,
}

/// Membership of a user in one SFD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub user_id: UserId,
    pub sfd_id: SfdId,
}

/// Loan lifecycle. Transitions are monotonic:
/// pending -> approved -> active -> completed, or rejected/withdrawn
/// at any point before activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    Active,
    Completed,
    Rejected,
    Withdrawn,
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Active => "active",
            LoanStatus::Completed => "completed",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Withdrawn => "withdrawn",
        };
        f.write_str(s)
    }
}

/// A credit extended to a client by an institution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub client_id: ClientId,
    pub sfd_id: SfdId,
    /// Principal.
    pub amount: Amount,
    /// Annual interest rate in percent; informational, schedules are
    /// computed upstream.
    pub interest_rate: f64,
    pub duration_months: u32,
    pub monthly_payment: Amount,
    /// Never negative; clamped to zero on the final installment.
    pub remaining_amount: Amount,
    pub status: LoanStatus,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub next_payment_date: Option<NaiveDate>,
}

/// How money physically moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    MobileMoney,
}

/// One repayment event against a loan. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub payment_date: DateTime<Utc>,
}

/// Late-payment fee charged alongside a repayment. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Penalty {
    pub id: Uuid,
    pub loan_id: LoanId,
    pub payment_id: PaymentId,
    pub amount: Amount,
    pub days_overdue: i64,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// One cashier shift over a physical drawer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashSession {
    pub id: SessionId,
    pub cashier_id: UserId,
    pub sfd_id: SfdId,
    pub opening_balance: Amount,
    /// Counted balance, set exactly once at close.
    pub closing_balance: Option<Amount>,
    /// Ledger-derived balance, set at close.
    pub expected_balance: Option<Amount>,
    pub status: SessionStatus,
    /// Variance beyond tolerance; the session awaits supervisor review.
    pub requires_validation: bool,
    pub notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Type of a drawer movement. The sign is implicit in the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashOperationType {
    Deposit,
    Withdrawal,
    LoanDisbursement,
    LoanRepayment,
    Transfer,
}

impl CashOperationType {
    /// Inflow types increase the drawer balance, outflow types decrease it.
    /// Transfers move cash out of the drawer toward the vault.
    pub fn is_inflow(self) -> bool {
        matches!(
            self,
            CashOperationType::Deposit | CashOperationType::LoanRepayment
        )
    }
}

/// One movement against an open cash session. Append-only, always linked
/// to a ledger [`Transaction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashOperation {
    pub id: Uuid,
    pub session_id: SessionId,
    pub transaction_id: TransactionId,
    pub op_type: CashOperationType,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// A grant allocated to an institution. `used_amount <= amount` always;
/// `used_amount` only ever grows, by atomic increments at disbursement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subsidy {
    pub id: SubsidyId,
    pub sfd_id: SfdId,
    pub amount: Amount,
    pub used_amount: Amount,
    pub start_date: NaiveDate,
    pub active: bool,
}

impl Subsidy {
    pub fn remaining(&self) -> Amount {
        self.amount - self.used_amount
    }
}

/// One consumption of a subsidy by a disbursement. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsidyUsage {
    pub id: Uuid,
    pub subsidy_id: SubsidyId,
    pub loan_id: LoanId,
    pub amount: Amount,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    LoanDisbursement,
    LoanRepayment,
    MobileMoneyPayment,
}

/// Canonical record of any money movement. Every ledger-affecting event
/// creates one; never standalone-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sfd_id: SfdId,
    /// The member the movement concerns, when one exists.
    pub user_id: Option<UserId>,
    pub tx_type: TransactionType,
    pub amount: Amount,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Balance record of a user at one institution. Exactly one per
/// (user, institution) pair, maintained by the account synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub sfd_id: SfdId,
    pub balance: Amount,
    pub updated_at: DateTime<Utc>,
}

/// Raw inbound provider callback, persisted before any processing.
/// Deduplicated by (operator, event_type, provider transaction id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileMoneyWebhook {
    pub id: WebhookId,
    pub operator: String,
    pub event_type: String,
    pub provider_tx_id: String,
    pub raw: serde_json::Value,
    pub processed: bool,
    pub received_at: DateTime<Utc>,
}
