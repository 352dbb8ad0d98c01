use std::env;
use std::sync::Arc;

use sfd_ledger::csv::{Replayer, read_journal};
use sfd_ledger::engine::Ledger;
use sfd_ledger::store::LedgerStore;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args().nth(1).expect("usage: sfd-ledger <journal.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let ledger = Ledger::new(Arc::new(LedgerStore::new()));
    let mut replayer = Replayer::new(ledger);
    let (row_sender, row_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_journal(&path) {
            match result {
                Ok(row) => {
                    row_sender.send(row).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    replayer.run(ReceiverStream::new(row_receiver)).await;

    replayer.write_loans(std::io::stdout().lock());
}
