pub mod election;
pub mod user;
pub mod vote;
