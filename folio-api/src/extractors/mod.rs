//! Custom request extractors.

pub mod client_ip;

pub use client_ip::{client_ip_from_parts, ClientIp};
