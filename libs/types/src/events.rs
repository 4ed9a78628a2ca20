//! Domain events published by the worker messenger for out-of-band
//! collaborators (settlement and VIP services subscribe to these).

use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::payload::MessagePayload;

/// Named event published after an inbound envelope is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Normalized event emitted for every processed message.
    WorkerMessageProcessed {
        kind: String,
        correlation_id: String,
        source_domain: String,
    },
    SettlementUpdateReceived {
        settlement_id: String,
        amount: f64,
    },
    CommissionCalculatedReceived {
        agent_id: String,
        amount: f64,
    },
    BonusAwardedReceived {
        player_id: String,
        amount: f64,
    },
    BalanceUpdatedReceived {
        account_id: String,
        balance: f64,
    },
}

impl DomainEvent {
    /// Wire name collaborators subscribe on.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::WorkerMessageProcessed { .. } => "worker.message.processed",
            DomainEvent::SettlementUpdateReceived { .. } => "settlement.update.received",
            DomainEvent::CommissionCalculatedReceived { .. } => "commission.calculated.received",
            DomainEvent::BonusAwardedReceived { .. } => "bonus.awarded.received",
            DomainEvent::BalanceUpdatedReceived { .. } => "balance.updated.received",
        }
    }

    /// Event payload as a plain mapping, for sinks that re-publish outward.
    pub fn to_value(&self) -> Value {
        match self {
            DomainEvent::WorkerMessageProcessed {
                kind,
                correlation_id,
                source_domain,
            } => json!({
                "type": kind,
                "correlationId": correlation_id,
                "sourceDomain": source_domain,
            }),
            DomainEvent::SettlementUpdateReceived {
                settlement_id,
                amount,
            } => json!({ "settlementId": settlement_id, "amount": amount }),
            DomainEvent::CommissionCalculatedReceived { agent_id, amount } => {
                json!({ "agentId": agent_id, "amount": amount })
            }
            DomainEvent::BonusAwardedReceived { player_id, amount } => {
                json!({ "playerId": player_id, "amount": amount })
            }
            DomainEvent::BalanceUpdatedReceived {
                account_id,
                balance,
            } => json!({ "accountId": account_id, "balance": balance }),
        }
    }

    /// The domain event a processed envelope maps to, if its payload has one.
    pub fn for_envelope(envelope: &Envelope) -> Option<DomainEvent> {
        match &envelope.payload {
            MessagePayload::SettlementUpdate(s) => Some(DomainEvent::SettlementUpdateReceived {
                settlement_id: s.settlement_id.clone(),
                amount: s.amount,
            }),
            MessagePayload::CommissionCalculated(c) => {
                Some(DomainEvent::CommissionCalculatedReceived {
                    agent_id: c.agent_id.clone(),
                    amount: c.amount,
                })
            }
            MessagePayload::BonusAwarded(b) => Some(DomainEvent::BonusAwardedReceived {
                player_id: b.player_id.clone(),
                amount: b.amount,
            }),
            MessagePayload::BalanceUpdated(b) => Some(DomainEvent::BalanceUpdatedReceived {
                account_id: b.account_id.clone(),
                balance: b.balance,
            }),
            MessagePayload::Batch(_) | MessagePayload::Custom(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Metadata;
    use crate::payload::{kind, SettlementUpdate};

    #[test]
    fn test_event_names() {
        let event = DomainEvent::SettlementUpdateReceived {
            settlement_id: "PEN_001".to_string(),
            amount: 166.67,
        };
        assert_eq!(event.name(), "settlement.update.received");
        assert_eq!(event.to_value()["settlementId"], "PEN_001");
    }

    #[test]
    fn test_for_envelope_maps_settlement() {
        let envelope = Envelope::new(
            kind::SETTLEMENT_UPDATE,
            Metadata::mint("settlement", "dashboard"),
            MessagePayload::SettlementUpdate(SettlementUpdate {
                settlement_id: "PEN_001".to_string(),
                amount: 166.67,
                currency: None,
                status: None,
            }),
        );

        match DomainEvent::for_envelope(&envelope) {
            Some(DomainEvent::SettlementUpdateReceived {
                settlement_id,
                amount,
            }) => {
                assert_eq!(settlement_id, "PEN_001");
                assert!((amount - 166.67).abs() < f64::EPSILON);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
