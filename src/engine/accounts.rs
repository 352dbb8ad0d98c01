//! Account synchronization: one balance row per (user, institution) pair.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::Amount;
use crate::audit::AuditEntry;
use crate::model::{Account, SfdId, UserId};

use super::{Ledger, SyncError};

/// What a sync pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub created: u32,
    pub reset: u32,
    pub untouched: u32,
}

impl Ledger {
    /// Ensure the user has exactly one account row per institution they are
    /// associated with, creating missing rows with a zero balance (or a
    /// seeded demo balance when the demo policy is on).
    ///
    /// Idempotent: re-running creates no duplicates and leaves existing
    /// balances alone unless `full_sync` explicitly asks for a reset.
    pub fn sync_accounts(
        &self,
        user_id: UserId,
        sfd_id: Option<SfdId>,
        full_sync: bool,
    ) -> Result<SyncReport, SyncError> {
        let mut tables = self.store.write();

        if !tables.users.contains_key(&user_id) {
            return Err(SyncError::UnknownUser(user_id));
        }

        let mut targets = tables.client_sfds_of(user_id);
        if let Some(only) = sfd_id {
            targets.retain(|s| *s == only);
        }

        let mut report = SyncReport::default();
        for target in targets {
            let seed = if self.policies.demo_balances {
                demo_balance(user_id, target)
            } else {
                Amount::ZERO
            };
            match tables.account_for_mut(user_id, target) {
                Some(account) if full_sync => {
                    account.balance = seed;
                    account.updated_at = Utc::now();
                    report.reset += 1;
                }
                Some(_) => report.untouched += 1,
                None => {
                    let id = Uuid::new_v4();
                    tables.accounts.insert(
                        id,
                        Account {
                            id,
                            user_id,
                            sfd_id: target,
                            balance: seed,
                            updated_at: Utc::now(),
                        },
                    );
                    report.created += 1;
                }
            }
        }

        if report.created > 0 || report.reset > 0 {
            tables.audit(AuditEntry::new("accounts_synced", "accounts").details(json!({
                "user_id": user_id,
                "created": report.created,
                "reset": report.reset,
                "full_sync": full_sync,
            })));
        }

        Ok(report)
    }
}

/// Deterministic stand-in balance for demo environments: hash of the id
/// pair folded into 0..500 000 whole units.
fn demo_balance(user_id: UserId, sfd_id: SfdId) -> Amount {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in user_id.as_bytes().iter().chain(sfd_id.as_bytes()) {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    Amount::from_major((h % 500_000) as i64)
}
