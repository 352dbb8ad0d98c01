//! Fire-and-forget client notifications.
//!
//! The engine publishes events onto a channel and moves on; delivery (SMS,
//! push, ...) is someone else's job. A dropped event is logged, never an
//! operation failure.

use tokio::sync::mpsc;
use tracing::warn;

use crate::Amount;
use crate::model::{LoanId, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    LoanDisbursed {
        user_id: UserId,
        loan_id: LoanId,
        amount: Amount,
    },
    PaymentReceived {
        user_id: UserId,
        loan_id: LoanId,
        amount: Amount,
        remaining: Amount,
    },
    LoanCompleted {
        user_id: UserId,
        loan_id: LoanId,
    },
    DepositCredited {
        user_id: UserId,
        amount: Amount,
    },
}

impl Notification {
    /// User-facing message, in the platform's language.
    pub fn message(&self) -> String {
        match self {
            Notification::LoanDisbursed { amount, .. } => {
                format!("Votre prêt de {amount} FCFA a été décaissé.")
            }
            Notification::PaymentReceived {
                amount, remaining, ..
            } => format!(
                "Paiement de {amount} FCFA reçu. Solde restant : {remaining} FCFA."
            ),
            Notification::LoanCompleted { .. } => {
                "Félicitations, votre prêt est entièrement remboursé.".to_string()
            }
            Notification::DepositCredited { amount, .. } => {
                format!("Dépôt mobile money de {amount} FCFA crédité sur votre compte.")
            }
        }
    }

    fn user_id(&self) -> UserId {
        match self {
            Notification::LoanDisbursed { user_id, .. }
            | Notification::PaymentReceived { user_id, .. }
            | Notification::LoanCompleted { user_id, .. }
            | Notification::DepositCredited { user_id, .. } => *user_id,
        }
    }
}

/// Publishing half. `disabled()` drops everything silently, for contexts
/// (tests, benches) with no delivery pipeline attached.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    sender: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Best effort: a closed channel is a delivery-side problem, not ours.
    pub fn send(&self, notification: Notification) {
        if let Some(sender) = &self.sender {
            if sender.send(notification.clone()).is_err() {
                warn!(
                    user = %notification.user_id(),
                    "notification receiver gone, event dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn channel_delivers_events() {
        let (notifier, mut receiver) = Notifier::channel();
        let user_id = Uuid::new_v4();
        notifier.send(Notification::LoanCompleted {
            user_id,
            loan_id: Uuid::new_v4(),
        });
        let event = receiver.try_recv().unwrap();
        assert!(matches!(event, Notification::LoanCompleted { .. }));
    }

    #[test]
    fn disabled_notifier_drops_silently() {
        let notifier = Notifier::disabled();
        notifier.send(Notification::DepositCredited {
            user_id: Uuid::new_v4(),
            amount: Amount::from_major(100),
        });
    }

    #[test]
    fn closed_receiver_does_not_panic() {
        let (notifier, receiver) = Notifier::channel();
        drop(receiver);
        notifier.send(Notification::LoanCompleted {
            user_id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
        });
    }

    #[test]
    fn completed_and_received_have_distinct_messages() {
        let user_id = Uuid::new_v4();
        let loan_id = Uuid::new_v4();
        let received = Notification::PaymentReceived {
            user_id,
            loan_id,
            amount: Amount::from_major(10_000),
            remaining: Amount::from_major(90_500),
        };
        let completed = Notification::LoanCompleted { user_id, loan_id };
        assert_ne!(received.message(), completed.message());
        assert!(received.message().contains("90500.00"));
    }
}
