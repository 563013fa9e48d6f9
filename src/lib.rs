pub mod api;
pub mod config;
pub mod currency;
pub mod error;
pub mod history;
pub mod inquiry;
pub mod ledger;
pub mod pricing;
pub mod response;
pub mod store;
pub mod types;
pub mod utils;
pub mod version;

pub use error::{LedgerError, LedgerResult};
pub use ledger::NegotiationLedger;
