pub mod event;
pub mod health;
pub mod notification;
pub mod retry;
