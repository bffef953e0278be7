//! Request middleware

pub mod audit;
pub mod auth;
