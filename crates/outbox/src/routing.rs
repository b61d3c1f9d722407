//! Queue selection for outbox events.

use herald_common::error::AppError;
use herald_common::payload;
use herald_common::queues;
use herald_common::types::{AggregateType, OutboxEvent, RecipientCategory};

/// Payload key naming who started a reservation flow.
pub const INITIATED_BY: &str = "initiated_by";

/// Payload key naming the category a broadcast addresses.
pub const AUDIENCE: &str = "audience";

pub fn is_reservation(event_type: &str) -> bool {
    event_type.to_ascii_uppercase().contains("RESERVATION")
}

/// Pick the one queue an event is published to.
///
/// Deterministic in the event alone. Fails with `UnknownRecipientType` for an
/// aggregate tag or broadcast audience that maps to no queue.
pub fn route(event: &OutboxEvent) -> Result<&'static str, AppError> {
    let aggregate: AggregateType = event.aggregate_type.parse()?;

    if is_reservation(&event.event_type)
        && matches!(aggregate, AggregateType::Restaurant | AggregateType::Customer)
    {
        return Ok(reservation_queue(&event.payload));
    }

    Ok(match aggregate {
        AggregateType::Restaurant => queues::RESTAURANT,
        AggregateType::Customer => queues::CUSTOMER,
        AggregateType::Agency => queues::AGENCY,
        AggregateType::Admin => queues::ADMIN,
        AggregateType::Chat => queues::CHAT,
        AggregateType::Social => queues::SOCIAL,
        AggregateType::Broadcast => {
            broadcast_audience(&event.payload)?;
            queues::BROADCAST
        }
    })
}

/// Reservations go to the side that did not start them.
fn reservation_queue(payload: &serde_json::Value) -> &'static str {
    match payload::opt_str(payload, INITIATED_BY).map(str::to_ascii_uppercase) {
        Some(initiator) if initiator == "RESTAURANT" => queues::CUSTOMER,
        _ => queues::RESTAURANT_RESERVATIONS,
    }
}

/// Category named by a broadcast's `audience` field.
pub fn broadcast_audience(payload: &serde_json::Value) -> Result<RecipientCategory, AppError> {
    payload::opt_str(payload, AUDIENCE)
        .ok_or_else(|| AppError::UnknownRecipientType("BROADCAST without audience".to_string()))?
        .parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herald_common::types::OutboxStatus;
    use serde_json::json;

    fn event(event_type: &str, aggregate_type: &str, payload: serde_json::Value) -> OutboxEvent {
        OutboxEvent {
            id: 1,
            event_id: "evt".to_string(),
            event_type: event_type.to_string(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: Some(9),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    #[test]
    fn test_routes_by_aggregate_type() {
        let cases = [
            ("RESTAURANT", queues::RESTAURANT),
            ("customer", queues::CUSTOMER),
            ("AGENCY", queues::AGENCY),
            ("ADMIN", queues::ADMIN),
            ("CHAT", queues::CHAT),
            ("SOCIAL", queues::SOCIAL),
        ];
        for (aggregate, queue) in cases {
            assert_eq!(route(&event("SOMETHING", aggregate, json!({}))).unwrap(), queue);
        }
    }

    #[test]
    fn test_reservations_route_by_initiator() {
        let by_customer = event("RESERVATION_REQUESTED", "RESTAURANT", json!({"initiated_by": "customer"}));
        assert_eq!(route(&by_customer).unwrap(), queues::RESTAURANT_RESERVATIONS);

        let by_restaurant = event("RESERVATION_CONFIRMED", "CUSTOMER", json!({"initiated_by": "RESTAURANT"}));
        assert_eq!(route(&by_restaurant).unwrap(), queues::CUSTOMER);

        let unknown = event("RESERVATION_CANCELLED", "CUSTOMER", json!({}));
        assert_eq!(route(&unknown).unwrap(), queues::RESTAURANT_RESERVATIONS);

        // Agency reservations keep their own queue.
        let agency = event("RESERVATION_REQUESTED", "AGENCY", json!({"initiated_by": "RESTAURANT"}));
        assert_eq!(route(&agency).unwrap(), queues::AGENCY);
    }

    #[test]
    fn test_broadcast_needs_a_known_audience() {
        let ok = event("MAINTENANCE_WINDOW", "BROADCAST", json!({"audience": "RESTAURANT"}));
        assert_eq!(route(&ok).unwrap(), queues::BROADCAST);

        let missing = event("MAINTENANCE_WINDOW", "BROADCAST", json!({}));
        assert!(matches!(route(&missing), Err(AppError::UnknownRecipientType(_))));

        let bogus = event("MAINTENANCE_WINDOW", "BROADCAST", json!({"audience": "ROBOTS"}));
        assert!(matches!(route(&bogus), Err(AppError::UnknownRecipientType(_))));
    }

    #[test]
    fn test_unknown_aggregate_is_routing_error() {
        let err = route(&event("X", "WAREHOUSE", json!({}))).unwrap_err();
        assert!(matches!(err, AppError::UnknownRecipientType(_)));
        assert!(!err.is_retryable());
    }
}
