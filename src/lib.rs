//! Card payment gateway core: BIN resolution, tokenization, least-cost
//! network routing, fraud scoring and the payment lifecycle.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
