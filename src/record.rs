//! Synthetic transaction records and their wire encoding.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;

pub const MIN_AMOUNT: f64 = 50_000.0;
pub const MAX_AMOUNT: f64 = 150_000.0;
pub const USERS: u32 = 100;
pub const MERCHANTS: u32 = 3;
pub const LOCATIONS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Usd, Currency::Eur, Currency::Gbp];
}

/// One synthetic financial transaction. Field names on the wire follow the
/// downstream consumers' schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
    pub user_id: String,
    pub amount: f64,
    pub transaction_time: i64,
    pub merchant_id: String,
    pub transaction_type: TransactionType,
    pub location: String,
    pub payment_method: bool,
    pub is_international: bool,
    pub currency: Currency,
}

/// Produces records from its own random source. Each worker owns one, so no
/// generator state is shared across tasks.
pub struct RecordGenerator {
    rng: StdRng,
}

impl RecordGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self) -> TransactionRecord {
        let rng = &mut self.rng;
        let raw = MIN_AMOUNT + rng.gen_range(0.0..1.0) * (MAX_AMOUNT - MIN_AMOUNT);
        TransactionRecord {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            user_id: format!("user_{}", rng.gen_range(0..USERS)),
            amount: round_cents(raw),
            transaction_time: chrono::Utc::now().timestamp(),
            merchant_id: format!("merchant_{}", rng.gen_range(1..=MERCHANTS)),
            transaction_type: if rng.gen_bool(0.5) {
                TransactionType::Purchase
            } else {
                TransactionType::Refund
            },
            location: format!("location_{}", rng.gen_range(1..=LOCATIONS)),
            payment_method: rng.gen_bool(0.5),
            is_international: rng.gen_bool(0.5),
            currency: Currency::ALL[rng.gen_range(0..Currency::ALL.len())],
        }
    }
}

impl Default for RecordGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn round_cents(v: f64) -> f64 {
    ((v * 100.0).round() / 100.0).clamp(MIN_AMOUNT, MAX_AMOUNT)
}

/// Turns a record into the payload bytes handed to the broker.
pub trait RecordEncoder: Send + Sync {
    fn encode(&self, record: &TransactionRecord) -> Result<Bytes, SubmissionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl RecordEncoder for JsonEncoder {
    fn encode(&self, record: &TransactionRecord) -> Result<Bytes, SubmissionError> {
        serde_json::to_vec(record)
            .map(Bytes::from)
            .map_err(|e| SubmissionError::Serialization(e.to_string()))
    }
}
