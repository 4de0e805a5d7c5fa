//! Core business logic of the fiscal closure service.
//!
//! This crate has no web or database dependencies. Collaborators such as
//! the general ledger, the fixed-asset register and the lock store are
//! traits implemented by `closure-db` (and by in-memory doubles behind the
//! `in-memory` feature).
//!
//! # Modules
//!
//! - `closure` - Monthly and annual closure runs
//! - `ledger` - Journal postings, balances and the posting gateway
//! - `fiscal` - Fiscal periods and period locks
//! - `currency` - Exchange rates and money rounding
//! - `auth` - Organization roles

pub mod auth;
pub mod closure;
pub mod currency;
pub mod fiscal;
pub mod ledger;
