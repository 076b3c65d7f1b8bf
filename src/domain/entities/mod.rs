pub mod challenge;
pub mod trade;
