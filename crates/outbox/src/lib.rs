pub mod envelope;
pub mod ledger;
pub mod memory;
pub mod publisher;
pub mod routing;
pub mod store;
