pub mod action;
pub mod condition;
pub mod conversation;
pub mod value;
