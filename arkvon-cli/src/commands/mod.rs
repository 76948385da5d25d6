//! CLI subcommands

pub mod referral;
pub mod send;
pub mod visit;
