//! Basestation records, the inventory file and discovery.

pub mod discovery;
pub mod inventory;
pub mod record;

pub use inventory::InventoryStore;
pub use record::Basestation;
