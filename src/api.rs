//! Request/response surface for the UI and the webhook endpoint.
//!
//! Every call answers `{success: true, ...}` or
//! `{success: false, error: {code, message}}`; messages are user-facing
//! and localized, the machine-readable part is the error code.

use serde::{Deserialize, Serialize};

use crate::Amount;
use crate::engine::{
    CloseSummary, Disbursed, ErrorKind, LedgerError, PaymentOutcome, WebhookOutcome,
};
use crate::model::{LoanId, PaymentMethod, SessionId, SfdId, UserId};

#[derive(Debug, Clone, Deserialize)]
pub struct DisburseRequest {
    pub actor_id: UserId,
    pub loan_id: LoanId,
    pub disbursement_method: PaymentMethod,
    #[serde(default)]
    pub cash_session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub actor_id: UserId,
    pub loan_id: LoanId,
    pub amount: Amount,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub cash_session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenSessionRequest {
    pub actor_id: UserId,
    pub sfd_id: SfdId,
    pub opening_balance: Amount,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloseSessionRequest {
    pub actor_id: UserId,
    pub counted_balance: Amount,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ErrorKind,
    pub message: String,
}

/// The `{success, ...}` envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: &LedgerError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: error.kind(),
                message: localize(error),
            }),
        }
    }
}

impl<T: Serialize> From<Result<T, LedgerError>> for Envelope<T> {
    fn from(result: Result<T, LedgerError>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(e) => Envelope::err(&e),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DisburseResponse {
    pub loan: crate::model::Loan,
    pub transaction: crate::model::Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsidy_used: Option<crate::model::SubsidyUsage>,
}

impl From<Disbursed> for DisburseResponse {
    fn from(d: Disbursed) -> Self {
        Self {
            loan: d.loan,
            transaction: d.transaction,
            subsidy_used: d.subsidy_used,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub payment: crate::model::Payment,
    pub loan: crate::model::Loan,
    pub penalty_applied: Option<Amount>,
    pub fully_paid: bool,
}

impl From<PaymentOutcome> for PaymentResponse {
    fn from(p: PaymentOutcome) -> Self {
        Self {
            penalty_applied: p.penalty.as_ref().map(|pen| pen.amount),
            payment: p.payment,
            loan: p.loan,
            fully_paid: p.fully_paid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseSessionResponse {
    pub closing_balance: Amount,
    pub expected_balance: Amount,
    pub difference: Amount,
    pub requires_validation: bool,
}

impl From<CloseSummary> for CloseSessionResponse {
    fn from(s: CloseSummary) -> Self {
        Self {
            closing_balance: s.closing_balance,
            expected_balance: s.expected_balance,
            difference: s.difference,
            requires_validation: s.requires_validation,
        }
    }
}

/// Webhook acknowledgement; 200 even for unknown users per the provider
/// contract.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    pub webhook_id: crate::model::WebhookId,
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(o: WebhookOutcome) -> Self {
        let message = if o.duplicate {
            "Webhook déjà traité.".to_string()
        } else if o.transaction_id.is_some() {
            "Webhook traité, transaction enregistrée.".to_string()
        } else {
            "Webhook enregistré.".to_string()
        };
        Self {
            success: true,
            message,
            webhook_id: o.webhook_id,
        }
    }
}

/// User-facing message for a failed call.
fn localize(error: &LedgerError) -> String {
    use crate::engine::{DisburseError, PaymentError, SessionError};
    match error {
        LedgerError::Session(SessionError::NegativeOpeningBalance(_)) => {
            "Le solde d'ouverture ne peut pas être négatif.".to_string()
        }
        LedgerError::Session(SessionError::AlreadyOpen(_)) => {
            "Une session de caisse est déjà ouverte pour ce caissier.".to_string()
        }
        LedgerError::Session(SessionError::NotOpen(_)) => {
            "Session de caisse introuvable ou déjà fermée.".to_string()
        }
        LedgerError::Session(_) => "Opération de caisse non autorisée.".to_string(),
        LedgerError::Disburse(DisburseError::NotApproved(..)) => {
            "Ce prêt n'est pas en statut approuvé.".to_string()
        }
        LedgerError::Disburse(DisburseError::NoOpenSession(_)) => {
            "Aucune session de caisse ouverte. Veuillez d'abord ouvrir votre caisse.".to_string()
        }
        LedgerError::Disburse(DisburseError::InsufficientCash { .. }) => {
            "Solde de caisse insuffisant pour décaisser ce prêt.".to_string()
        }
        LedgerError::Disburse(DisburseError::LoanNotFound(_)) => "Prêt introuvable.".to_string(),
        LedgerError::Disburse(_) => "Décaissement non autorisé.".to_string(),
        LedgerError::Payment(PaymentError::BelowMinimum { minimum, .. }) => {
            format!("Montant inférieur à la mensualité minimale de {minimum} FCFA.")
        }
        LedgerError::Payment(PaymentError::ExceedsBalance { remaining, .. }) => {
            format!("Montant supérieur au solde restant de {remaining} FCFA.")
        }
        LedgerError::Payment(PaymentError::NotActive(..)) => {
            "Ce prêt n'est pas actif.".to_string()
        }
        LedgerError::Payment(PaymentError::LoanNotFound(_)) => "Prêt introuvable.".to_string(),
        LedgerError::Payment(_) => "Paiement non autorisé.".to_string(),
        LedgerError::Webhook(_) => "Données du webhook invalides.".to_string(),
        LedgerError::Sync(_) => "Utilisateur introuvable.".to_string(),
    }
}
