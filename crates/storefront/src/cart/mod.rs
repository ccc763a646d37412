//! Cart state and the operations that change it.
//!
//! - [`CartOrchestrator`] performs every mutation against the commerce
//!   service and writes the result into the [`CartStore`]
//! - [`CartStore`] holds the last server-confirmed cart plus request status
//! - [`map_address`] turns a saved address into the service's shape
//! - [`PromotionCheck`] decides whether a promotion code took effect

pub mod address;
pub mod orchestrator;
pub mod promotion;
pub mod store;

pub use address::{AddressError, AddressPayload, AddressRole, AddressType, SavedAddress, map_address};
pub use orchestrator::{
    AddressUpdateOptions, CartCoordinator, CartOrchestrator, CartSettings, CompletionOutcome,
    LineItemInput, LineItemUpdate, Notice,
};
pub use promotion::{DiffPromotionCheck, PromotionCheck, PromotionSnapshot};
pub use store::{CartState, CartStore, MutationTicket};
