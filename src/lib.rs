#![forbid(unsafe_code)]

//! # steepdesk
//!
//! Customer registration and referral tracking for a small tea business,
//! with a hybrid query layer on top of the same data.
//!
//! Each customer gets exactly three single-use referral codes at
//! registration; three redemptions earn the owner a discount. Free-text
//! questions are routed to deterministic lookups where a rule matches and to
//! a hosted conversational model otherwise, degrading model -> rules ->
//! generic help when the model is unavailable.

pub mod chat;
pub mod engine;
pub mod gateway;
pub mod persist;
pub mod router;
pub mod store;

pub use chat::{Reply, ReplySource, Responder};
pub use engine::{
    generate_customer_id, generate_referral_codes, validate_input, CodeCheck, CodeOwner,
    CodeRejection, EngineError, Redemption, ReferralEngine, Registration,
};
pub use gateway::{ChatGateway, OpenAiAdapter, ProviderError};
pub use persist::{MemoryPersistence, Persistence, SqlitePersistence, StoreError};
pub use router::{route, DataIntent, QueryRoute};
pub use store::{CodeStatus, Customer, CustomerStatus, ReferralCode};
