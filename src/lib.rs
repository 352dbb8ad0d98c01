pub mod amount;
pub mod api;
pub mod audit;
pub mod csv;
pub mod engine;
pub mod model;
pub mod notify;
pub mod policy;
pub mod store;

pub use amount::Amount;
pub use engine::{Ledger, LedgerError, Operation};
pub use policy::Policies;
pub use store::LedgerStore;
