//! # sofia-channels
//!
//! Meta platform plumbing: webhook signature verification, payload
//! extraction, and outbound Graph API delivery.

pub mod extract;
pub mod meta;
pub mod signature;

pub use meta::MetaChannel;
