//! Protocol implementations.
//!
//! - `upload`: fixed-size raw frame upload over a minimal HTTP/1.1 exchange

pub mod upload;
