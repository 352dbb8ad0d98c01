//! In-process stand-in for the transactional ledger store.
//!
//! All rows live in typed tables behind a single `RwLock`. Holding the
//! write guard is the unit of work: an engine commit validates fully and
//! then mutates while holding it, so a loan can never be observed `active`
//! without its ledger transaction, and concurrent payments against the
//! same loan serialize on the guard.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;

use crate::Amount;
use crate::audit::AuditEntry;
use crate::model::*;

/// Row tables. Maps for keyed lookup, vectors for append-only ledgers.
#[derive(Debug, Default)]
pub struct Tables {
    pub sfds: HashMap<SfdId, Sfd>,
    pub users: HashMap<UserId, User>,
    pub clients: HashMap<ClientId, Client>,
    pub loans: HashMap<LoanId, Loan>,
    pub payments: Vec<Payment>,
    pub penalties: Vec<Penalty>,
    pub sessions: HashMap<SessionId, CashSession>,
    pub cash_operations: Vec<CashOperation>,
    pub subsidies: HashMap<SubsidyId, Subsidy>,
    pub subsidy_usages: Vec<SubsidyUsage>,
    pub transactions: Vec<Transaction>,
    pub accounts: HashMap<AccountId, Account>,
    pub webhooks: Vec<MobileMoneyWebhook>,
    pub audit_log: Vec<AuditEntry>,
}

impl Tables {
    /// The open session of a cashier, if any. At most one exists.
    pub fn open_session_for(&self, cashier_id: UserId) -> Option<&CashSession> {
        self.sessions
            .values()
            .find(|s| s.cashier_id == cashier_id && s.status == SessionStatus::Open)
    }

    /// Drawer balance derived from the ledger: opening balance plus all
    /// inflow operations minus all outflow operations of the session.
    pub fn expected_balance(&self, session: &CashSession) -> Amount {
        let flow: Amount = self
            .cash_operations
            .iter()
            .filter(|op| op.session_id == session.id)
            .map(|op| {
                if op.op_type.is_inflow() {
                    op.amount
                } else {
                    -op.amount
                }
            })
            .sum();
        session.opening_balance + flow
    }

    /// First-fit subsidy allocation: among active subsidies of the
    /// institution ordered by start date (id as tie-break, so the scan is
    /// deterministic), the first whose remaining covers the full amount.
    pub fn first_fit_subsidy(&self, sfd_id: SfdId, amount: Amount) -> Option<&Subsidy> {
        let mut candidates: Vec<&Subsidy> = self
            .subsidies
            .values()
            .filter(|s| s.sfd_id == sfd_id && s.active)
            .collect();
        candidates.sort_by_key(|s| (s.start_date, s.id));
        candidates.into_iter().find(|s| s.remaining() >= amount)
    }

    pub fn client_of_loan(&self, loan: &Loan) -> Option<&Client> {
        self.clients.get(&loan.client_id)
    }

    /// Client record tying a user to an institution.
    pub fn client_for(&self, user_id: UserId, sfd_id: SfdId) -> Option<&Client> {
        self.clients
            .values()
            .find(|c| c.user_id == user_id && c.sfd_id == sfd_id)
    }

    /// Institutions the user is associated with through client records.
    pub fn client_sfds_of(&self, user_id: UserId) -> Vec<SfdId> {
        let mut sfds: Vec<SfdId> = self
            .clients
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.sfd_id)
            .collect();
        sfds.sort();
        sfds.dedup();
        sfds
    }

    pub fn user_by_phone(&self, phone: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
    }

    pub fn account_for(&self, user_id: UserId, sfd_id: SfdId) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.user_id == user_id && a.sfd_id == sfd_id)
    }

    pub fn account_for_mut(&mut self, user_id: UserId, sfd_id: SfdId) -> Option<&mut Account> {
        self.accounts
            .values_mut()
            .find(|a| a.user_id == user_id && a.sfd_id == sfd_id)
    }

    /// Prior webhook with the same idempotency triple.
    pub fn find_webhook(
        &self,
        operator: &str,
        event_type: &str,
        provider_tx_id: &str,
    ) -> Option<&MobileMoneyWebhook> {
        self.webhooks.iter().find(|w| {
            w.operator == operator
                && w.event_type == event_type
                && w.provider_tx_id == provider_tx_id
        })
    }
}

/// Seeding helpers for tests, benches and the replay harness. The engine
/// never creates these rows itself: loans arrive already approved.
impl Tables {
    pub fn seed_sfd(&mut self, name: &str) -> SfdId {
        let id = SfdId::new_v4();
        self.sfds.insert(
            id,
            Sfd {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    pub fn seed_staff(&mut self, sfd_id: SfdId, name: &str, role: Role) -> UserId {
        let id = UserId::new_v4();
        self.users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                phone: None,
                role,
                sfd_id: Some(sfd_id),
            },
        );
        id
    }

    /// A member with a client record at the institution.
    pub fn seed_member(&mut self, sfd_id: SfdId, name: &str, phone: Option<&str>) -> (UserId, ClientId) {
        let user_id = UserId::new_v4();
        self.users.insert(
            user_id,
            User {
                id: user_id,
                name: name.to_string(),
                phone: phone.map(str::to_string),
                role: Role::Member,
                sfd_id: None,
            },
        );
        let client_id = ClientId::new_v4();
        self.clients.insert(
            client_id,
            Client {
                id: client_id,
                user_id,
                sfd_id,
            },
        );
        (user_id, client_id)
    }

    pub fn seed_loan(
        &mut self,
        sfd_id: SfdId,
        client_id: ClientId,
        amount: Amount,
        monthly_payment: Amount,
        status: LoanStatus,
    ) -> LoanId {
        let id = LoanId::new_v4();
        self.loans.insert(
            id,
            Loan {
                id,
                client_id,
                sfd_id,
                amount,
                interest_rate: 0.0,
                duration_months: 12,
                monthly_payment,
                remaining_amount: amount,
                status,
                disbursed_at: None,
                next_payment_date: None,
            },
        );
        id
    }

    pub fn seed_subsidy(&mut self, sfd_id: SfdId, amount: Amount, start_date: NaiveDate) -> SubsidyId {
        let id = SubsidyId::new_v4();
        self.subsidies.insert(
            id,
            Subsidy {
                id,
                sfd_id,
                amount,
                used_amount: Amount::ZERO,
                start_date,
                active: true,
            },
        );
        id
    }
}

/// Handle to the shared tables.
#[derive(Debug, Default)]
pub struct LedgerStore {
    inner: RwLock<Tables>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access for pure queries.
    pub fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access for a unit of work. Commits must validate before
    /// their first mutation so an error path leaves the tables untouched.
    pub fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn session(cashier_id: UserId, sfd_id: SfdId, opening: Amount) -> CashSession {
        CashSession {
            id: SessionId::new_v4(),
            cashier_id,
            sfd_id,
            opening_balance: opening,
            closing_balance: None,
            expected_balance: None,
            status: SessionStatus::Open,
            requires_validation: false,
            notes: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    fn cash_op(session_id: SessionId, op_type: CashOperationType, amount: Amount) -> CashOperation {
        CashOperation {
            id: Uuid::new_v4(),
            session_id,
            transaction_id: Uuid::new_v4(),
            op_type,
            amount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn expected_balance_signs_operations_by_type() {
        let mut tables = Tables::default();
        let sfd = tables.seed_sfd("kafo");
        let cashier = tables.seed_staff(sfd, "awa", Role::Cashier);
        let s = session(cashier, sfd, Amount::from_major(10_000));
        let sid = s.id;
        tables.sessions.insert(sid, s);

        tables.cash_operations.push(cash_op(
            sid,
            CashOperationType::LoanRepayment,
            Amount::from_major(5_000),
        ));
        tables.cash_operations.push(cash_op(
            sid,
            CashOperationType::LoanDisbursement,
            Amount::from_major(3_000),
        ));

        let s = tables.sessions.get(&sid).unwrap();
        assert_eq!(tables.expected_balance(s), Amount::from_major(12_000));
    }

    #[test]
    fn expected_balance_ignores_other_sessions() {
        let mut tables = Tables::default();
        let sfd = tables.seed_sfd("kafo");
        let cashier = tables.seed_staff(sfd, "awa", Role::Cashier);
        let a = session(cashier, sfd, Amount::from_major(1_000));
        let b = session(cashier, sfd, Amount::from_major(2_000));
        let (a_id, b_id) = (a.id, b.id);
        tables.sessions.insert(a_id, a);
        tables.sessions.insert(b_id, b);

        tables.cash_operations.push(cash_op(
            b_id,
            CashOperationType::Deposit,
            Amount::from_major(500),
        ));

        let a = tables.sessions.get(&a_id).unwrap();
        assert_eq!(tables.expected_balance(a), Amount::from_major(1_000));
    }

    #[test]
    fn first_fit_prefers_oldest_covering_subsidy() {
        let mut tables = Tables::default();
        let sfd = tables.seed_sfd("kafo");
        let newer = tables.seed_subsidy(
            sfd,
            Amount::from_major(200_000),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        let older = tables.seed_subsidy(
            sfd,
            Amount::from_major(200_000),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );

        let hit = tables
            .first_fit_subsidy(sfd, Amount::from_major(150_000))
            .unwrap();
        assert_eq!(hit.id, older);

        // Exhaust the older one; the newer is the next fit.
        tables.subsidies.get_mut(&older).unwrap().used_amount = Amount::from_major(100_000);
        let hit = tables
            .first_fit_subsidy(sfd, Amount::from_major(150_000))
            .unwrap();
        assert_eq!(hit.id, newer);
    }

    #[test]
    fn first_fit_skips_inactive_and_small_subsidies() {
        let mut tables = Tables::default();
        let sfd = tables.seed_sfd("kafo");
        let id = tables.seed_subsidy(
            sfd,
            Amount::from_major(100_000),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(
            tables
                .first_fit_subsidy(sfd, Amount::from_major(150_000))
                .is_none()
        );

        tables.subsidies.get_mut(&id).unwrap().active = false;
        assert!(
            tables
                .first_fit_subsidy(sfd, Amount::from_major(50_000))
                .is_none()
        );
    }

    #[test]
    fn open_session_lookup_skips_closed() {
        let mut tables = Tables::default();
        let sfd = tables.seed_sfd("kafo");
        let cashier = tables.seed_staff(sfd, "awa", Role::Cashier);
        let mut s = session(cashier, sfd, Amount::ZERO);
        s.status = SessionStatus::Closed;
        tables.sessions.insert(s.id, s);
        assert!(tables.open_session_for(cashier).is_none());

        let open = session(cashier, sfd, Amount::ZERO);
        let open_id = open.id;
        tables.sessions.insert(open_id, open);
        assert_eq!(tables.open_session_for(cashier).unwrap().id, open_id);
    }

    #[test]
    fn user_by_phone_matches_exact_number() {
        let mut tables = Tables::default();
        let sfd = tables.seed_sfd("kafo");
        let (user, _) = tables.seed_member(sfd, "moussa", Some("+22370000001"));
        assert_eq!(tables.user_by_phone("+22370000001").unwrap().id, user);
        assert!(tables.user_by_phone("+22370000002").is_none());
    }

    #[test]
    fn client_sfds_deduplicates() {
        let mut tables = Tables::default();
        let sfd_a = tables.seed_sfd("a");
        let sfd_b = tables.seed_sfd("b");
        let (user, _) = tables.seed_member(sfd_a, "moussa", None);
        let client_id = ClientId::new_v4();
        tables.clients.insert(
            client_id,
            Client {
                id: client_id,
                user_id: user,
                sfd_id: sfd_b,
            },
        );
        assert_eq!(tables.client_sfds_of(user).len(), 2);
    }
}
