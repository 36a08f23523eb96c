//! Soulbound course certificates
//!
//! At most one certificate per (owner, course). Certificates are bound to
//! the learner: every transfer or approval is refused.

use crate::error::{Result, ServiceError};
use poc_core::{serde_amount, Address, CourseId, SharedClock, Wei};
use poc_storage::{collections, Collection, DocumentStore, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Refusal reason for transfers and approvals
pub const NON_TRANSFERABLE: &str = "SBT non-transferable";

/// Default IPFS gateway for certificate metadata
pub const DEFAULT_GATEWAY: &str = "https://gateway.lighthouse.storage/ipfs";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub token_id: u64,
    pub owner: Address,
    pub course_id: CourseId,
    pub course_title: String,
    pub cid: String,
    pub metadata_url: String,
    pub modules_completed: u32,
    #[serde(with = "serde_amount")]
    pub stake_amount: Wei,
    /// YYYY-MM-DD
    pub completion_date: String,
    pub issued_at: i64,
    pub issued_by: Address,
}

/// Input for `CertificateRegistry::issue`
#[derive(Clone, Debug)]
pub struct CertificateRequest {
    pub owner: Address,
    pub course_id: CourseId,
    pub course_title: String,
    pub cid: String,
    pub modules_completed: u32,
    pub stake_amount: Wei,
    pub issued_by: Address,
}

/// Content id for a certificate's metadata
///
/// CIDv0-shaped ("Qm" + 44 characters), derived from the owner, course and
/// issue time so the same completion always names the same document.
pub fn certificate_cid(owner: &Address, course_id: CourseId, issued_at: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"certificate");
    hasher.update(owner.as_bytes());
    hasher.update(&course_id.to_be_bytes());
    hasher.update(&issued_at.to_be_bytes());
    let digest = hex::encode(hasher.finalize().as_bytes());
    format!("Qm{}", &digest[..44])
}

/// Token id for (owner, course), kept below 2^53 so it survives JSON numbers
pub fn certificate_token_id(owner: &Address, course_id: CourseId) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(owner.as_bytes());
    hasher.update(&course_id.to_be_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_be_bytes(bytes) & ((1 << 53) - 1)
}

/// Certificate registry
#[derive(Clone)]
pub struct CertificateRegistry {
    certificates: Collection<Certificate>,
    clock: SharedClock,
    gateway: String,
}

impl CertificateRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self {
            certificates: Collection::new(store, collections::CERTIFICATES),
            clock,
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into().trim_end_matches('/').to_string();
        self
    }

    fn id(owner: &Address, course_id: CourseId) -> String {
        format!("{}_{}", owner.to_hex(), course_id)
    }

    pub async fn issue(&self, request: CertificateRequest) -> Result<Certificate> {
        let issued_at = self.clock.now();
        let completion_date = chrono::DateTime::from_timestamp(issued_at, 0)
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let certificate = Certificate {
            token_id: certificate_token_id(&request.owner, request.course_id),
            owner: request.owner,
            course_id: request.course_id,
            course_title: request.course_title,
            metadata_url: format!("{}/{}", self.gateway, request.cid),
            cid: request.cid,
            modules_completed: request.modules_completed,
            stake_amount: request.stake_amount,
            completion_date,
            issued_at,
            issued_by: request.issued_by,
        };

        match self
            .certificates
            .create(&Self::id(&certificate.owner, certificate.course_id), &certificate)
            .await
        {
            Ok(_) => {
                tracing::info!(
                    owner = %certificate.owner,
                    course_id = certificate.course_id,
                    token_id = certificate.token_id,
                    "Certificate issued"
                );
                Ok(certificate)
            }
            Err(StorageError::AlreadyExists { .. }) => {
                Err(ServiceError::conflict("Certificate already issued for this course"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, owner: &Address, course_id: CourseId) -> Result<Option<Certificate>> {
        Ok(self
            .certificates
            .get(&Self::id(owner, course_id))
            .await?
            .map(|v| v.value))
    }

    pub async fn list_for_owner(&self, owner: &Address) -> Result<Vec<Certificate>> {
        let mut certificates = self.certificates.find(|c: &Certificate| c.owner == *owner).await?;
        certificates.sort_by_key(|c| c.course_id);
        Ok(certificates)
    }

    /// Always refused
    pub fn transfer(&self, _from: Address, _to: Address, _token_id: u64) -> Result<()> {
        Err(ServiceError::Forbidden(NON_TRANSFERABLE.to_string()))
    }

    /// Always refused
    pub fn approve(&self, _owner: Address, _spender: Address, _token_id: u64) -> Result<()> {
        Err(ServiceError::Forbidden(NON_TRANSFERABLE.to_string()))
    }
}
