//! Cartwheel storefront synchronization engine.
//!
//! Keeps a storefront's cart, checkout, and session state in step with a
//! remote commerce service. The service is the source of truth: every cart
//! operation sends a request, and the full cart it returns replaces the
//! local copy.
//!
//! # Modules
//!
//! - [`cart`] - Cart store, orchestrator, address mapping, promotion checks
//! - [`session`] - Single-flight identity hydration and request coordination
//! - [`commerce`] - `CommerceApi` trait and its HTTP client
//! - [`order`] - Remote order → UI order mapping
//! - [`wishlist`] / [`search`] - Small client-side features
//! - [`storage`] - Persisted client state
//! - [`state`] - [`Storefront`], which wires everything together

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod commerce;
pub mod config;
pub mod error;
pub mod order;
pub mod search;
pub mod session;
pub mod state;
pub mod storage;
pub mod wishlist;

pub use config::{ConfigError, SyncConfig};
pub use error::SyncError;
pub use state::{OrderPage, Storefront};
