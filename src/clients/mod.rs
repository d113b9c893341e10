pub mod broker;
pub mod database;
pub mod health;
pub mod memory_broker;
pub mod memory_store;
pub mod rbmq;
pub mod store;
