//! Export bundle assembly.
//!
//! Builds the zipped artifact clients download: `export.bin` (protobuf key
//! export for V1/V2, Cuckoo filter bytes for V2-UMA) plus `export.sig`
//! (protobuf `TEKSignatureList` carrying one detached ECDSA signature over
//! the `export.bin` bytes).
//!
//! Keys are sorted by `key_data` before encoding; the order is an external
//! contract clients rely on for signature verification, and it makes the
//! artifact a deterministic function of the key set.

use crate::cuckoo::{CuckooFilter, key_hash};
use crate::error::ExportResult;
use crate::proto;
use crate::signer::EcKeyPair;
use lantern_core::config::SigningConfig;
use lantern_core::{TemporaryExposureKey, UtcInstant};
use prost::Message;
use std::io::Write;
use std::sync::Arc;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Which artifact layout to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleVersion {
    V1,
    V2,
    V2Uma,
}

/// Assembles and signs export bundles.
pub struct ExportBundler {
    keypair: Arc<EcKeyPair>,
    region: String,
    key_version: String,
    key_identifier: String,
    algorithm_oid: String,
}

impl ExportBundler {
    pub fn new(keypair: Arc<EcKeyPair>, signing: &SigningConfig, region: impl Into<String>) -> Self {
        Self {
            keypair,
            region: region.into(),
            key_version: signing.key_version.clone(),
            key_identifier: signing.key_identifier.clone(),
            algorithm_oid: signing.algorithm_oid.clone(),
        }
    }

    /// Build the zipped artifact over the given keys and export window.
    pub fn assemble(
        &self,
        keys: &[TemporaryExposureKey],
        version: BundleVersion,
        window_start: UtcInstant,
        window_end: UtcInstant,
    ) -> ExportResult<Vec<u8>> {
        let mut sorted: Vec<&TemporaryExposureKey> = keys.iter().collect();
        sorted.sort_by(|a, b| a.key_data.cmp(&b.key_data));

        let payload = match version {
            BundleVersion::V1 | BundleVersion::V2 => {
                self.export_payload(&sorted, window_start, window_end)
            }
            BundleVersion::V2Uma => self.filter_payload(&sorted)?,
        };

        let signature = proto::TekSignatureList {
            signatures: vec![proto::TekSignature {
                signature_info: Some(self.signature_info()),
                batch_num: Some(1),
                batch_size: Some(1),
                signature: Some(self.keypair.sign_der(&payload)),
            }],
        };

        self.package(&payload, &signature.encode_to_vec())
    }

    fn signature_info(&self) -> proto::SignatureInfo {
        proto::SignatureInfo {
            verification_key_version: Some(self.key_version.clone()),
            verification_key_id: Some(self.key_identifier.clone()),
            signature_algorithm: Some(self.algorithm_oid.clone()),
        }
    }

    /// `export.bin` for V1/V2: the fixed 16-byte header followed by the
    /// protobuf export message.
    fn export_payload(
        &self,
        sorted: &[&TemporaryExposureKey],
        window_start: UtcInstant,
        window_end: UtcInstant,
    ) -> Vec<u8> {
        let export = proto::TemporaryExposureKeyExport {
            start_timestamp: Some((window_start.timestamp_millis() / 1_000).max(0) as u64),
            end_timestamp: Some((window_end.timestamp_millis() / 1_000).max(0) as u64),
            region: Some(self.region.clone()),
            batch_num: Some(1),
            batch_size: Some(1),
            signature_infos: vec![self.signature_info()],
            keys: sorted
                .iter()
                .map(|key| proto::TemporaryExposureKey {
                    key_data: Some(key.key_data.clone()),
                    transmission_risk_level: Some(key.transmission_risk_level),
                    rolling_start_interval_number: Some(key.rolling_start_number as i32),
                    rolling_period: Some(key.rolling_period),
                    report_type: key.report_type,
                    days_since_onset_of_symptoms: key.days_since_onset_of_symptoms,
                })
                .collect(),
        };

        let mut payload = proto::EXPORT_BIN_HEADER.to_vec();
        export.encode(&mut payload).expect("vec write cannot fail");
        payload
    }

    /// `export.bin` for V2-UMA: the serialized Cuckoo filter over the
    /// hashed keys.
    fn filter_payload(&self, sorted: &[&TemporaryExposureKey]) -> ExportResult<Vec<u8>> {
        let digests: Vec<[u8; 32]> = sorted.iter().map(|key| key_hash(&key.key_data)).collect();
        let filter = CuckooFilter::build(&digests)?;
        Ok(filter.to_bytes())
    }

    /// Zip `export.bin` and `export.sig` with stored (uncompressed)
    /// entries and fixed metadata so the archive stays deterministic.
    fn package(&self, payload: &[u8], signature: &[u8]) -> ExportResult<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        writer.start_file("export.bin", options)?;
        writer.write_all(payload)?;
        writer.start_file("export.sig", options)?;
        writer.write_all(signature)?;

        Ok(writer.finish()?.into_inner())
    }
}
