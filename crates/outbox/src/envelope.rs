//! Builds the lightweight bus message for an outbox event.

use herald_common::error::AppError;
use herald_common::payload;
use herald_common::types::{AggregateType, OutboxEvent, RecipientType, RoutingMessage};

/// Wrap `event` as the message its queue's consumer expects.
///
/// The aggregate id becomes the type-specific id of its aggregate; ids for the
/// other sides of the event are lifted from the payload when present.
pub fn routing_message(event: &OutboxEvent) -> Result<RoutingMessage, AppError> {
    let aggregate: AggregateType = event.aggregate_type.parse()?;
    let body = &event.payload;

    let recipient_type = match aggregate {
        AggregateType::Broadcast => RecipientType::Broadcast,
        _ => payload::opt_str(body, "recipientType")
            .map(RecipientType::from_hint)
            .unwrap_or_default(),
    };

    let own_id = |kind: AggregateType| {
        if aggregate == kind {
            event.aggregate_id
        } else {
            None
        }
    };

    Ok(RoutingMessage {
        event_id: event.event_id.clone(),
        event_type: event.event_type.clone(),
        aggregate_type: aggregate.to_string(),
        aggregate_id: event.aggregate_id,
        recipient_type,
        recipient_id: payload::opt_i64(body, "recipientId")?,
        hub_id: payload::opt_i64(body, "hubId")?,
        restaurant_id: own_id(AggregateType::Restaurant)
            .or(payload::opt_i64(body, "restaurantId")?),
        customer_id: own_id(AggregateType::Customer).or(payload::opt_i64(body, "customerId")?),
        agency_id: own_id(AggregateType::Agency).or(payload::opt_i64(body, "agencyId")?),
        admin_id: own_id(AggregateType::Admin),
        payload: body.clone(),
    })
}
