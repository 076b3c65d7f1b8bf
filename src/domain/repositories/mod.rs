pub mod ledger_store;
pub mod market_data;
