pub mod auth;
pub mod election;
pub mod vote;
