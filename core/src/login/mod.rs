//! Login flow
//!
//! `start` sends the user to the broker with a fresh nonce; `verify` checks the
//! ID token the broker posts back. Neither keeps state of its own.

pub mod start;
pub mod verify;
