//! Credential sources: process-wide environment defaults ([`sniff`]) and
//! per-user keys ([`store`]).

pub mod sniff;
pub mod store;
