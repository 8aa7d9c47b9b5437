//! Repository traits, one per concern.

pub mod exposed;
pub mod lease;
pub mod redeem;

pub use exposed::ExposedKeyRepo;
pub use lease::LeaseRepo;
pub use redeem::RedeemRepo;
