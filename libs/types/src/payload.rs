//! Typed message payloads and the decode-time schema table.
//!
//! Payloads form a closed set keyed by the envelope type tag. Decoding goes
//! through [`MessagePayload::from_value`], which validates the fields the
//! schema requires for that tag; types outside the known set decode to
//! [`MessagePayload::Custom`] so that receivers can drop them without
//! failing the whole receive path.

use serde_json::{json, Map, Value};

use crate::envelope::{Envelope, Metadata, Priority};
use crate::error::{PayloadError, PayloadResult};

/// Well-known envelope type tags.
pub mod kind {
    pub const SETTLEMENT_UPDATE: &str = "SETTLEMENT_UPDATE";
    pub const COMMISSION_CALCULATED: &str = "COMMISSION_CALCULATED";
    pub const BONUS_AWARDED: &str = "BONUS_AWARDED";
    pub const BALANCE_UPDATED: &str = "BALANCE_UPDATED";

    /// Type tag reserved for batch envelopes; distinct from every regular tag.
    pub const BATCH_MESSAGE: &str = "BATCH_MESSAGE";
}

/// Settlement state change for a pending or completed settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementUpdate {
    pub settlement_id: String,
    pub amount: f64,
    pub currency: Option<String>,
    pub status: Option<String>,
}

/// Commission amount computed for an agent over a period.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionCalculated {
    pub agent_id: String,
    pub amount: f64,
    pub period: Option<String>,
}

/// Bonus granted to a player account.
#[derive(Debug, Clone, PartialEq)]
pub struct BonusAwarded {
    pub player_id: String,
    pub amount: f64,
    pub reason: Option<String>,
}

/// New balance observed for an account.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceUpdated {
    pub account_id: String,
    pub balance: f64,
}

/// Payload of a `BATCH_MESSAGE` envelope: the grouped envelopes plus the
/// bookkeeping the flush path computed.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPayload {
    pub batch_id: String,
    pub messages: Vec<Envelope>,
    pub total_size_bytes: u64,
    pub compression_ratio: f64,
    pub priority: Priority,
}

/// Closed set of message payloads, keyed by envelope type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    SettlementUpdate(SettlementUpdate),
    CommissionCalculated(CommissionCalculated),
    BonusAwarded(BonusAwarded),
    BalanceUpdated(BalanceUpdated),
    Batch(BatchPayload),

    /// Well-formed payload for a type tag outside the known set. Carried
    /// through decode so the dispatch layer can log and drop it.
    Custom(Value),
}

impl MessagePayload {
    /// Serialize to the wire document shape for this payload's tag.
    pub fn to_value(&self) -> Value {
        match self {
            MessagePayload::SettlementUpdate(s) => {
                let mut inner = Map::new();
                inner.insert("id".into(), json!(s.settlement_id));
                inner.insert("amount".into(), json!(s.amount));
                if let Some(currency) = &s.currency {
                    inner.insert("currency".into(), json!(currency));
                }
                if let Some(status) = &s.status {
                    inner.insert("status".into(), json!(status));
                }
                json!({ "settlement": inner })
            }
            MessagePayload::CommissionCalculated(c) => {
                let mut inner = Map::new();
                inner.insert("agentId".into(), json!(c.agent_id));
                inner.insert("amount".into(), json!(c.amount));
                if let Some(period) = &c.period {
                    inner.insert("period".into(), json!(period));
                }
                json!({ "commission": inner })
            }
            MessagePayload::BonusAwarded(b) => {
                let mut inner = Map::new();
                inner.insert("playerId".into(), json!(b.player_id));
                inner.insert("amount".into(), json!(b.amount));
                if let Some(reason) = &b.reason {
                    inner.insert("reason".into(), json!(reason));
                }
                json!({ "bonus": inner })
            }
            MessagePayload::BalanceUpdated(b) => {
                json!({ "balance": { "accountId": b.account_id, "balance": b.balance } })
            }
            MessagePayload::Batch(batch) => {
                let messages: Vec<Value> =
                    batch.messages.iter().map(Envelope::to_wire_value).collect();
                json!({
                    "batchId": batch.batch_id,
                    "messages": messages,
                    "totalSizeBytes": batch.total_size_bytes,
                    "compressionRatio": batch.compression_ratio,
                    "priority": batch.priority,
                })
            }
            MessagePayload::Custom(value) => value.clone(),
        }
    }

    /// Schema table: validate and build the typed payload for `kind`.
    ///
    /// Unknown tags become [`MessagePayload::Custom`] without validation.
    pub fn from_value(kind_tag: &str, value: &Value) -> PayloadResult<Self> {
        match kind_tag {
            kind::SETTLEMENT_UPDATE => {
                let inner = require_object(kind_tag, value, "settlement")?;
                Ok(MessagePayload::SettlementUpdate(SettlementUpdate {
                    settlement_id: require_string(kind_tag, inner, "settlement.id", "id")?,
                    amount: require_number(kind_tag, inner, "settlement.amount", "amount")?,
                    currency: optional_string(inner, "currency"),
                    status: optional_string(inner, "status"),
                }))
            }
            kind::COMMISSION_CALCULATED => {
                let inner = require_object(kind_tag, value, "commission")?;
                Ok(MessagePayload::CommissionCalculated(CommissionCalculated {
                    agent_id: require_string(kind_tag, inner, "commission.agentId", "agentId")?,
                    amount: require_number(kind_tag, inner, "commission.amount", "amount")?,
                    period: optional_string(inner, "period"),
                }))
            }
            kind::BONUS_AWARDED => {
                let inner = require_object(kind_tag, value, "bonus")?;
                Ok(MessagePayload::BonusAwarded(BonusAwarded {
                    player_id: require_string(kind_tag, inner, "bonus.playerId", "playerId")?,
                    amount: require_number(kind_tag, inner, "bonus.amount", "amount")?,
                    reason: optional_string(inner, "reason"),
                }))
            }
            kind::BALANCE_UPDATED => {
                let inner = require_object(kind_tag, value, "balance")?;
                Ok(MessagePayload::BalanceUpdated(BalanceUpdated {
                    account_id: require_string(kind_tag, inner, "balance.accountId", "accountId")?,
                    balance: require_number(kind_tag, inner, "balance.balance", "balance")?,
                }))
            }
            kind::BATCH_MESSAGE => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| PayloadError::NotAnObject {
                        kind: kind_tag.to_string(),
                    })?;
                let batch_id = require_string(kind_tag, obj, "batchId", "batchId")?;
                let raw_messages = obj
                    .get("messages")
                    .and_then(Value::as_array)
                    .ok_or_else(|| PayloadError::missing(kind_tag, "messages"))?;
                let messages = raw_messages
                    .iter()
                    .map(Envelope::from_wire_value)
                    .collect::<PayloadResult<Vec<_>>>()?;
                let priority = obj
                    .get("priority")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| PayloadError::invalid(kind_tag, "priority", e.to_string()))?
                    .unwrap_or_default();
                Ok(MessagePayload::Batch(BatchPayload {
                    batch_id,
                    messages,
                    total_size_bytes: obj
                        .get("totalSizeBytes")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                    compression_ratio: obj
                        .get("compressionRatio")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                    priority,
                }))
            }
            _ => Ok(MessagePayload::Custom(value.clone())),
        }
    }
}

impl Envelope {
    /// Render the wire document: top-level `type`, `metadata`, `payload`.
    pub fn to_wire_value(&self) -> Value {
        json!({
            "type": self.kind,
            "metadata": self.metadata,
            "payload": self.payload.to_value(),
        })
    }

    /// Rebuild an envelope from a wire document, validating the fields the
    /// envelope schema requires.
    pub fn from_wire_value(value: &Value) -> PayloadResult<Self> {
        let obj = value.as_object().ok_or_else(|| PayloadError::NotAnObject {
            kind: "<envelope>".to_string(),
        })?;

        let kind_tag = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| PayloadError::missing("<envelope>", "type"))?
            .to_string();

        let metadata_value = obj
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| PayloadError::missing(&kind_tag, "metadata"))?;
        for field in [
            "correlationId",
            "timestamp",
            "version",
            "sourceDomain",
            "targetDomain",
        ] {
            if !metadata_value.contains_key(field) {
                return Err(PayloadError::missing(&kind_tag, format!("metadata.{field}")));
            }
        }
        let metadata: Metadata = serde_json::from_value(Value::Object(metadata_value.clone()))
            .map_err(|e| PayloadError::invalid(&kind_tag, "metadata", e.to_string()))?;

        let payload_value = obj
            .get("payload")
            .ok_or_else(|| PayloadError::missing(&kind_tag, "payload"))?;
        let payload = MessagePayload::from_value(&kind_tag, payload_value)?;

        Ok(Envelope::new(kind_tag, metadata, payload))
    }
}

fn require_object<'a>(
    kind_tag: &str,
    value: &'a Value,
    field: &str,
) -> PayloadResult<&'a Map<String, Value>> {
    value
        .get(field)
        .and_then(Value::as_object)
        .ok_or_else(|| PayloadError::missing(kind_tag, field))
}

fn require_string(
    kind_tag: &str,
    obj: &Map<String, Value>,
    path: &str,
    field: &str,
) -> PayloadResult<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PayloadError::missing(kind_tag, path))
}

fn require_number(
    kind_tag: &str,
    obj: &Map<String, Value>,
    path: &str,
    field: &str,
) -> PayloadResult<f64> {
    obj.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| PayloadError::missing(kind_tag, path))
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field).and_then(Value::as_str).map(str::to_string)
}
