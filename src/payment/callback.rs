//! Inbound gateway callback
//!
//! The gateway delivers a flat set of named string fields. They are kept as
//! received (a sorted map) because the signature covers exactly what was sent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::signing::SECURE_HASH_FIELD;
use crate::money::Money;

pub const AMOUNT: &str = "vnp_Amount";
pub const BANK_CODE: &str = "vnp_BankCode";
pub const BANK_TRAN_NO: &str = "vnp_BankTranNo";
pub const CARD_TYPE: &str = "vnp_CardType";
pub const ORDER_INFO: &str = "vnp_OrderInfo";
pub const PAY_DATE: &str = "vnp_PayDate";
pub const RESPONSE_CODE: &str = "vnp_ResponseCode";
pub const TMN_CODE: &str = "vnp_TmnCode";
pub const TRANSACTION_NO: &str = "vnp_TransactionNo";
pub const TXN_REF: &str = "vnp_TxnRef";
pub const TRANSACTION_STATUS: &str = "vnp_TransactionStatus";

/// Fields without which a callback is never valid
pub const REQUIRED_FIELDS: [&str; 5] = [AMOUNT, RESPONSE_CODE, TMN_CODE, TXN_REF, SECURE_HASH_FIELD];

/// Gateway code for an approved payment
pub const RESPONSE_SUCCESS: &str = "00";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayCallback {
    params: BTreeMap<String, String>,
}

impl GatewayCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn txn_ref(&self) -> Option<&str> {
        self.get(TXN_REF)
    }

    pub fn response_code(&self) -> Option<&str> {
        self.get(RESPONSE_CODE)
    }

    pub fn secure_hash(&self) -> Option<&str> {
        self.get(SECURE_HASH_FIELD)
    }

    pub fn amount(&self) -> Option<Money> {
        self.get(AMOUNT).and_then(|a| a.parse().ok())
    }

    pub fn has_required_fields(&self) -> bool {
        REQUIRED_FIELDS.iter().all(|f| self.params.contains_key(*f))
    }
}

/// Result of checking a callback against the shared secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackVerification {
    pub valid: bool,
    pub reference: Option<String>,
    pub response_code: Option<String>,
    pub amount: Option<Money>,
}

impl CallbackVerification {
    pub fn invalid(callback: &GatewayCallback) -> Self {
        Self {
            valid: false,
            reference: callback.txn_ref().map(str::to_string),
            response_code: callback.response_code().map(str::to_string),
            amount: callback.amount(),
        }
    }
}
