//! Export bundle assembly for the lantern exposure-notification backend.
//!
//! Covers everything between "a list of exposed keys" and "the bytes a
//! client downloads":
//! - GAEN protobuf wire messages
//! - the V2-UMA Cuckoo membership filter
//! - ECDSA P-256 signing and the named key vault
//! - zip packaging of `export.bin` + `export.sig`

pub mod bundle;
pub mod cuckoo;
pub mod error;
pub mod proto;
pub mod signer;
pub mod vault;

pub use bundle::{BundleVersion, ExportBundler};
pub use cuckoo::{CuckooFilter, DECLARED_FALSE_POSITIVE_RATE, key_hash};
pub use error::{ExportError, ExportResult};
pub use signer::EcKeyPair;
pub use vault::KeyVault;
