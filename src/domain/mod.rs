//! Domain types and the ports the application layer depends on.

pub mod bin;
pub mod card;
pub mod money;
pub mod network;
pub mod payment;
pub mod ports;
pub mod risk;
pub mod routing;
pub mod token;
