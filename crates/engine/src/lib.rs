pub mod blocks;
pub mod channels;
pub mod directory;
pub mod factory;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod scope;
pub mod sink;
pub mod templates;
