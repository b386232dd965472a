pub mod blocks;
pub mod chat;
pub mod discovery;
pub mod health;
pub mod likes;
pub mod notifications;
pub mod visits;
