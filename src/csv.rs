use std::collections::HashMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::amount::Amount;
use crate::engine::{Ledger, LedgerError, Operation};
use crate::model::{LoanId, LoanStatus, PaymentMethod, Role};

/// Errors that can occur when parsing journal rows
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: unrecognized payment method '{method}'")]
    UnrecognizedMethod { line: usize, method: String },

    #[error("line {line}: {op} missing field '{field}'")]
    MissingField {
        line: usize,
        op: String,
        field: &'static str,
    },
}

/// Errors that can occur when replaying a journal row against the ledger
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("unknown reference '{0}'")]
    UnknownRef(String),

    #[error("duplicate reference '{0}'")]
    DuplicateRef(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One journal row, with identities still symbolic. Seed rows declare
/// institutions, people, loans and subsidies under a `ref` name; operation
/// rows then name those refs instead of ids.
#[derive(Debug, Clone)]
pub enum JournalRow {
    Sfd {
        name: String,
    },
    Cashier {
        name: String,
        sfd: String,
    },
    Member {
        name: String,
        sfd: String,
    },
    Loan {
        name: String,
        sfd: String,
        member: String,
        amount: f64,
    },
    Subsidy {
        name: String,
        sfd: String,
        amount: f64,
    },
    OpenSession {
        name: String,
        sfd: String,
        cashier: String,
        amount: f64,
    },
    CloseSession {
        cashier: String,
        session: String,
        amount: f64,
    },
    Disburse {
        cashier: String,
        loan: String,
        method: PaymentMethod,
    },
    Pay {
        actor: String,
        loan: String,
        amount: f64,
        method: PaymentMethod,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    #[serde(default)]
    r#ref: String,
    #[serde(default)]
    sfd: String,
    #[serde(default)]
    actor: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    method: String,
}

#[derive(Debug, Serialize)]
struct LoanRow {
    loan: String,
    status: String,
    remaining: String,
}

fn field<'a>(
    value: &'a str,
    line: usize,
    op: &str,
    name: &'static str,
) -> Result<&'a str, JournalError> {
    if value.is_empty() {
        return Err(JournalError::MissingField {
            line,
            op: op.to_string(),
            field: name,
        });
    }
    Ok(value)
}

fn amount_field(value: Option<f64>, line: usize, op: &str) -> Result<f64, JournalError> {
    value.ok_or_else(|| JournalError::MissingField {
        line,
        op: op.to_string(),
        field: "amount",
    })
}

fn method_field(value: &str, line: usize) -> Result<PaymentMethod, JournalError> {
    match value {
        "cash" => Ok(PaymentMethod::Cash),
        "bank_transfer" => Ok(PaymentMethod::BankTransfer),
        "mobile_money" => Ok(PaymentMethod::MobileMoney),
        other => Err(JournalError::UnrecognizedMethod {
            line,
            method: other.to_string(),
        }),
    }
}

/// Read journal rows from a csv file
pub fn read_journal(
    path: impl AsRef<Path>,
) -> impl Iterator<Item = Result<JournalRow, JournalError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| JournalError::Parse { line, source })?;
            let op = row.op.as_str();
            match op {
                "sfd" => Ok(JournalRow::Sfd {
                    name: field(&row.r#ref, line, op, "ref")?.to_string(),
                }),
                "cashier" => Ok(JournalRow::Cashier {
                    name: field(&row.r#ref, line, op, "ref")?.to_string(),
                    sfd: field(&row.sfd, line, op, "sfd")?.to_string(),
                }),
                "member" => Ok(JournalRow::Member {
                    name: field(&row.r#ref, line, op, "ref")?.to_string(),
                    sfd: field(&row.sfd, line, op, "sfd")?.to_string(),
                }),
                "loan" => Ok(JournalRow::Loan {
                    name: field(&row.r#ref, line, op, "ref")?.to_string(),
                    sfd: field(&row.sfd, line, op, "sfd")?.to_string(),
                    member: field(&row.actor, line, op, "actor")?.to_string(),
                    amount: amount_field(row.amount, line, op)?,
                }),
                "subsidy" => Ok(JournalRow::Subsidy {
                    name: field(&row.r#ref, line, op, "ref")?.to_string(),
                    sfd: field(&row.sfd, line, op, "sfd")?.to_string(),
                    amount: amount_field(row.amount, line, op)?,
                }),
                "open_session" => Ok(JournalRow::OpenSession {
                    name: field(&row.r#ref, line, op, "ref")?.to_string(),
                    sfd: field(&row.sfd, line, op, "sfd")?.to_string(),
                    cashier: field(&row.actor, line, op, "actor")?.to_string(),
                    amount: amount_field(row.amount, line, op)?,
                }),
                "close_session" => Ok(JournalRow::CloseSession {
                    cashier: field(&row.actor, line, op, "actor")?.to_string(),
                    session: field(&row.target, line, op, "target")?.to_string(),
                    amount: amount_field(row.amount, line, op)?,
                }),
                "disburse" => Ok(JournalRow::Disburse {
                    cashier: field(&row.actor, line, op, "actor")?.to_string(),
                    loan: field(&row.target, line, op, "target")?.to_string(),
                    method: method_field(field(&row.method, line, op, "method")?, line)?,
                }),
                "pay" => Ok(JournalRow::Pay {
                    actor: field(&row.actor, line, op, "actor")?.to_string(),
                    loan: field(&row.target, line, op, "target")?.to_string(),
                    amount: amount_field(row.amount, line, op)?,
                    method: method_field(field(&row.method, line, op, "method")?, line)?,
                }),
                other => Err(JournalError::UnrecognizedOp {
                    line,
                    op: other.to_string(),
                }),
            }
        })
}

/// Feeds a journal through the ledger, resolving symbolic refs to ids.
pub struct Replayer {
    ledger: Ledger,
    refs: HashMap<String, Uuid>,
    loans: Vec<(String, LoanId)>,
}

impl Replayer {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            refs: HashMap::new(),
            loans: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Drain a stream of journal rows. Any single failure is logged and
    /// must not stop the replay.
    pub async fn run(&mut self, mut stream: impl Stream<Item = JournalRow> + Unpin) {
        while let Some(row) = stream.next().await {
            if let Err(e) = self.apply(row) {
                warn!("{e}");
            }
        }
    }

    fn bind(&mut self, name: String, id: Uuid) -> Result<(), ReplayError> {
        if self.refs.contains_key(&name) {
            return Err(ReplayError::DuplicateRef(name));
        }
        self.refs.insert(name, id);
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<Uuid, ReplayError> {
        self.refs
            .get(name)
            .copied()
            .ok_or_else(|| ReplayError::UnknownRef(name.to_string()))
    }

    pub fn apply(&mut self, row: JournalRow) -> Result<(), ReplayError> {
        match row {
            JournalRow::Sfd { name } => {
                let id = self.ledger.store().write().seed_sfd(&name);
                self.bind(name, id)
            }
            JournalRow::Cashier { name, sfd } => {
                let sfd_id = self.resolve(&sfd)?;
                let id = self
                    .ledger
                    .store()
                    .write()
                    .seed_staff(sfd_id, &name, Role::Cashier);
                self.bind(name, id)
            }
            JournalRow::Member { name, sfd } => {
                let sfd_id = self.resolve(&sfd)?;
                let (user_id, client_id) =
                    self.ledger.store().write().seed_member(sfd_id, &name, None);
                self.bind(format!("{name}.client"), client_id)?;
                self.bind(name, user_id)
            }
            JournalRow::Loan {
                name,
                sfd,
                member,
                amount,
            } => {
                let sfd_id = self.resolve(&sfd)?;
                let client_id = self.resolve(&format!("{member}.client"))?;
                let principal = Amount::from_float(amount);
                let monthly = Amount::from_float(amount / 12.0);
                let id = self.ledger.store().write().seed_loan(
                    sfd_id,
                    client_id,
                    principal,
                    monthly,
                    LoanStatus::Approved,
                );
                self.loans.push((name.clone(), id));
                self.bind(name, id)
            }
            JournalRow::Subsidy { name, sfd, amount } => {
                let sfd_id = self.resolve(&sfd)?;
                let id = self.ledger.store().write().seed_subsidy(
                    sfd_id,
                    Amount::from_float(amount),
                    chrono::Utc::now().date_naive(),
                );
                self.bind(name, id)
            }
            JournalRow::OpenSession {
                name,
                sfd,
                cashier,
                amount,
            } => {
                let actor = self.resolve(&cashier)?;
                let sfd_id = self.resolve(&sfd)?;
                let session = self
                    .ledger
                    .open_session(actor, sfd_id, Amount::from_float(amount), None)
                    .map_err(LedgerError::from)?;
                self.bind(name, session.id)
            }
            JournalRow::CloseSession {
                cashier,
                session,
                amount,
            } => {
                let actor = self.resolve(&cashier)?;
                let session = self.resolve(&session)?;
                self.ledger.apply(Operation::CloseSession {
                    actor,
                    session,
                    counted_balance: Amount::from_float(amount),
                    notes: None,
                })?;
                Ok(())
            }
            JournalRow::Disburse {
                cashier,
                loan,
                method,
            } => {
                let actor = self.resolve(&cashier)?;
                let loan = self.resolve(&loan)?;
                self.ledger.apply(Operation::Disburse {
                    actor,
                    loan,
                    method,
                    session: None,
                })?;
                Ok(())
            }
            JournalRow::Pay {
                actor,
                loan,
                amount,
                method,
            } => {
                let actor = self.resolve(&actor)?;
                let loan = self.resolve(&loan)?;
                self.ledger.apply(Operation::Pay {
                    actor,
                    loan,
                    amount: Amount::from_float(amount),
                    method,
                    reference: None,
                    session: None,
                })?;
                Ok(())
            }
        }
    }

    /// Write the state of every seeded loan to `writer` in csv format,
    /// ordered by ref.
    pub fn write_loans(&self, writer: impl io::Write) {
        let mut writer = csv::Writer::from_writer(writer);

        let mut loans = self.loans.clone();
        loans.sort_by(|a, b| a.0.cmp(&b.0));

        let tables = self.ledger.store().read();
        for (name, id) in loans {
            let Some(loan) = tables.loans.get(&id) else {
                continue;
            };
            let row = LoanRow {
                loan: name,
                status: loan.status.to_string(),
                remaining: loan.remaining_amount.to_string(),
            };
            writer.serialize(&row).expect("failed to write csv row");
        }

        writer.flush().expect("failed to flush csv writer");
    }
}
