//! Background context of the wallet extension.
//!
//! Privileged operations are reached through the router from
//! `extension-router`: the `ledger` route manages hardware wallet accounts
//! and the sign/submit round trip, the `transfer` route drives the isolated
//! transfer worker that owns the SDK.

pub mod config;
pub mod context;
pub mod ledger;
pub mod rpc;
pub mod sdk;
pub mod storage;
pub mod transport;
pub mod web_workers;
