//! Mobile-money provider callbacks.
//!
//! Providers deliver at least once; the ledger must see each event at most
//! once. The raw payload is persisted first, deduplicated by
//! (operator, event_type, transaction_id), and only confirmed events touch
//! the ledger. A callback for an unknown phone number is stored and
//! acknowledged, never an error back to the provider.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::Amount;
use crate::audit::{AuditEntry, AuditStatus, Severity};
use crate::model::{
    Account, MobileMoneyWebhook, Transaction, TransactionId, TransactionType, WebhookId,
};
use crate::notify::Notification;

use super::{Ledger, WebhookError};

/// The provider-specific JSON body, as far as this engine reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileMoneyPayload {
    pub operator: String,
    pub transaction_id: String,
    pub amount: Amount,
    pub phone_number: String,
    pub status: String,
    pub event_type: String,
    #[serde(default)]
    pub reference: Option<String>,
}

impl MobileMoneyPayload {
    fn is_confirmed(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "success")
    }
}

/// What ingestion did with the callback.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub webhook_id: WebhookId,
    /// The triple was seen before; nothing was reprocessed.
    pub duplicate: bool,
    /// Ledger transaction created from this callback, if any.
    pub transaction_id: Option<TransactionId>,
}

impl Ledger {
    /// Ingest one provider callback.
    ///
    /// Only a payload that does not parse, or carries a non-positive
    /// amount, is an error; every other path (duplicate, unconfirmed
    /// status, unknown user) acknowledges the callback so the provider
    /// stops retrying.
    pub fn ingest_webhook(&self, raw: serde_json::Value) -> Result<WebhookOutcome, WebhookError> {
        let payload: MobileMoneyPayload = serde_json::from_value(raw.clone())?;

        // A zero or negative amount on a deposit would debit the member.
        if payload.amount <= Amount::ZERO {
            return Err(WebhookError::NonPositiveAmount(payload.amount));
        }

        let mut tables = self.store.write();

        // At-least-once delivery becomes at-most-once effect here.
        if let Some(prior) = tables.find_webhook(
            &payload.operator,
            &payload.event_type,
            &payload.transaction_id,
        ) {
            return Ok(WebhookOutcome {
                webhook_id: prior.id,
                duplicate: true,
                transaction_id: None,
            });
        }

        let webhook_id = WebhookId::new_v4();
        tables.webhooks.push(MobileMoneyWebhook {
            id: webhook_id,
            operator: payload.operator.clone(),
            event_type: payload.event_type.clone(),
            provider_tx_id: payload.transaction_id.clone(),
            raw,
            processed: false,
            received_at: Utc::now(),
        });

        if !payload.is_confirmed() {
            // Stored, awaiting a terminal callback with its own id.
            tables.audit(AuditEntry::new("mobile_money_webhook", "payments").details(json!({
                "webhook_id": webhook_id,
                "operator": payload.operator,
                "status": payload.status,
                "processed": false,
            })));
            return Ok(WebhookOutcome {
                webhook_id,
                duplicate: false,
                transaction_id: None,
            });
        }

        // Resolve the member by phone, the institution by client record.
        let resolved = tables
            .user_by_phone(&payload.phone_number)
            .map(|u| u.id)
            .and_then(|user_id| {
                tables
                    .client_sfds_of(user_id)
                    .first()
                    .map(|sfd_id| (user_id, *sfd_id))
            });

        let Some((user_id, sfd_id)) = resolved else {
            warn!(
                operator = %payload.operator,
                phone = %payload.phone_number,
                "webhook for unknown user, stored without ledger effect"
            );
            mark_processed(&mut tables.webhooks, webhook_id);
            tables.audit(
                AuditEntry::new("mobile_money_webhook", "payments")
                    .severity(Severity::Warning)
                    .status(AuditStatus::Failure)
                    .details(json!({
                        "webhook_id": webhook_id,
                        "operator": payload.operator,
                        "reason": "unknown_user",
                    })),
            );
            return Ok(WebhookOutcome {
                webhook_id,
                duplicate: false,
                transaction_id: None,
            });
        };

        let transaction = Transaction {
            id: Uuid::new_v4(),
            sfd_id,
            user_id: Some(user_id),
            tx_type: TransactionType::MobileMoneyPayment,
            amount: payload.amount,
            reference: payload
                .reference
                .clone()
                .or_else(|| Some(payload.transaction_id.clone())),
            created_at: Utc::now(),
        };
        let transaction_id = transaction.id;
        tables.transactions.push(transaction);

        if payload.event_type == "deposit" {
            match tables.account_for_mut(user_id, sfd_id) {
                Some(account) => {
                    account.balance += payload.amount;
                    account.updated_at = Utc::now();
                }
                None => {
                    let id = Uuid::new_v4();
                    tables.accounts.insert(
                        id,
                        Account {
                            id,
                            user_id,
                            sfd_id,
                            balance: payload.amount,
                            updated_at: Utc::now(),
                        },
                    );
                }
            }
        }

        mark_processed(&mut tables.webhooks, webhook_id);
        tables.audit(AuditEntry::new("mobile_money_webhook", "payments").details(json!({
            "webhook_id": webhook_id,
            "operator": payload.operator,
            "event_type": payload.event_type,
            "amount": payload.amount,
        })));
        drop(tables);

        if payload.event_type == "deposit" {
            self.notifier().send(Notification::DepositCredited {
                user_id,
                amount: payload.amount,
            });
        }

        Ok(WebhookOutcome {
            webhook_id,
            duplicate: false,
            transaction_id: Some(transaction_id),
        })
    }
}

fn mark_processed(webhooks: &mut [MobileMoneyWebhook], id: WebhookId) {
    if let Some(webhook) = webhooks.iter_mut().find(|w| w.id == id) {
        webhook.processed = true;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::store::LedgerStore;

    use super::*;

    fn ledger_with_member(phone: &str) -> (Ledger, crate::model::UserId, crate::model::SfdId) {
        let ledger = Ledger::new(Arc::new(LedgerStore::new()));
        let (user, sfd) = {
            let mut tables = ledger.store().write();
            let sfd = tables.seed_sfd("kafo");
            let (user, _) = tables.seed_member(sfd, "moussa", Some(phone));
            (user, sfd)
        };
        (ledger, user, sfd)
    }

    fn deposit_payload(tx_id: &str, phone: &str, amount: f64) -> serde_json::Value {
        json!({
            "operator": "orange_money",
            "transaction_id": tx_id,
            "amount": amount,
            "phone_number": phone,
            "status": "completed",
            "event_type": "deposit",
            "reference": "REF-001",
        })
    }

    #[test]
    fn confirmed_deposit_creates_transaction_and_credits_account() {
        let (ledger, user, sfd) = ledger_with_member("+22370000001");
        let out = ledger
            .ingest_webhook(deposit_payload("OM-1", "+22370000001", 25_000.0))
            .unwrap();
        assert!(!out.duplicate);
        let tx_id = out.transaction_id.unwrap();

        let tables = ledger.store().read();
        let tx = tables.transactions.iter().find(|t| t.id == tx_id).unwrap();
        assert_eq!(tx.tx_type, TransactionType::MobileMoneyPayment);
        assert_eq!(tx.amount, Amount::from_major(25_000));
        assert_eq!(tx.user_id, Some(user));

        let account = tables.account_for(user, sfd).unwrap();
        assert_eq!(account.balance, Amount::from_major(25_000));
        assert!(tables.webhooks[0].processed);
    }

    #[test]
    fn replayed_webhook_produces_exactly_one_transaction() {
        let (ledger, _, _) = ledger_with_member("+22370000001");
        let payload = deposit_payload("OM-1", "+22370000001", 25_000.0);

        let first = ledger.ingest_webhook(payload.clone()).unwrap();
        let second = ledger.ingest_webhook(payload).unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(second.webhook_id, first.webhook_id);
        assert!(second.transaction_id.is_none());

        let tables = ledger.store().read();
        assert_eq!(tables.transactions.len(), 1);
        assert_eq!(tables.webhooks.len(), 1);
    }

    #[test]
    fn same_provider_tx_id_with_different_event_type_is_distinct() {
        let (ledger, _, _) = ledger_with_member("+22370000001");
        let deposit = deposit_payload("OM-1", "+22370000001", 1_000.0);
        let mut withdrawal = deposit.clone();
        withdrawal["event_type"] = json!("withdrawal");

        assert!(!ledger.ingest_webhook(deposit).unwrap().duplicate);
        assert!(!ledger.ingest_webhook(withdrawal).unwrap().duplicate);
        assert_eq!(ledger.store().read().webhooks.len(), 2);
    }

    #[test]
    fn unknown_user_is_acknowledged_without_ledger_effect() {
        let (ledger, _, _) = ledger_with_member("+22370000001");
        let out = ledger
            .ingest_webhook(deposit_payload("OM-9", "+22379999999", 5_000.0))
            .unwrap();
        assert!(!out.duplicate);
        assert!(out.transaction_id.is_none());

        let tables = ledger.store().read();
        assert!(tables.transactions.is_empty());
        assert!(tables.webhooks[0].processed);
        let audit = tables.audit_log.last().unwrap();
        assert_eq!(audit.severity, Severity::Warning);
        assert_eq!(audit.status, AuditStatus::Failure);
    }

    #[test]
    fn pending_status_is_stored_unprocessed() {
        let (ledger, _, _) = ledger_with_member("+22370000001");
        let mut payload = deposit_payload("OM-2", "+22370000001", 1_000.0);
        payload["status"] = json!("pending");

        let out = ledger.ingest_webhook(payload).unwrap();
        assert!(out.transaction_id.is_none());

        let tables = ledger.store().read();
        assert!(!tables.webhooks[0].processed);
        assert!(tables.transactions.is_empty());
        let audit = tables.audit_log.last().unwrap();
        assert_eq!(audit.severity, Severity::Info);
        assert_eq!(audit.details["processed"], json!(false));
    }

    #[test]
    fn non_positive_amount_is_rejected_before_any_write() {
        let (ledger, user, sfd) = ledger_with_member("+22370000001");

        for bad in [-5_000.0, 0.0] {
            let err = ledger
                .ingest_webhook(deposit_payload("OM-7", "+22370000001", bad))
                .unwrap_err();
            assert!(matches!(err, WebhookError::NonPositiveAmount(_)));
        }

        let tables = ledger.store().read();
        assert!(tables.webhooks.is_empty());
        assert!(tables.transactions.is_empty());
        assert!(tables.account_for(user, sfd).is_none());
    }

    #[test]
    fn non_deposit_event_creates_transaction_but_no_credit() {
        let (ledger, user, sfd) = ledger_with_member("+22370000001");
        let mut payload = deposit_payload("OM-3", "+22370000001", 2_000.0);
        payload["event_type"] = json!("payment");

        let out = ledger.ingest_webhook(payload).unwrap();
        assert!(out.transaction_id.is_some());

        let tables = ledger.store().read();
        assert!(tables.account_for(user, sfd).is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let (ledger, _, _) = ledger_with_member("+22370000001");
        let err = ledger
            .ingest_webhook(json!({"operator": "orange_money"}))
            .unwrap_err();
        assert!(matches!(err, WebhookError::Malformed(_)));
        assert!(ledger.store().read().webhooks.is_empty());
    }

    #[test]
    fn deposit_notification_is_emitted() {
        let (notifier, mut receiver) = crate::notify::Notifier::channel();
        let ledger = Ledger::new(Arc::new(LedgerStore::new())).with_notifier(notifier);
        {
            let mut tables = ledger.store().write();
            let sfd = tables.seed_sfd("kafo");
            tables.seed_member(sfd, "moussa", Some("+22370000001"));
        }
        ledger
            .ingest_webhook(deposit_payload("OM-1", "+22370000001", 3_000.0))
            .unwrap();
        assert!(matches!(
            receiver.try_recv().unwrap(),
            Notification::DepositCredited { amount, .. } if amount == Amount::from_major(3_000)
        ));
    }
}
