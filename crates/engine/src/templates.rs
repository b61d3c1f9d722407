//! Title and body templates per recipient category and event type.
//!
//! Placeholders are `{field}` or `{field|fallback}` and are filled from the
//! event payload. A `{field}` without fallback is required: a payload missing
//! it is malformed. A payload that carries its own `title` / `body` wins over
//! the template.

use serde_json::Value;

use herald_common::error::AppError;
use herald_common::payload;
use herald_common::types::RecipientCategory;

/// Longest preview of user-written content shown in a notification body.
pub const PREVIEW_CHARS: usize = 150;

/// `(title, body)` template for an event.
pub fn template(category: RecipientCategory, event_type: &str) -> (&'static str, &'static str) {
    match category {
        RecipientCategory::Admin => match event_type {
            "SYSTEM_ERROR" => ("System error", "{message|A system error was reported}"),
            "CRITICAL_INCIDENT" => ("Critical incident", "{message|A critical incident is in progress}"),
            "DATABASE_ALERT" => ("Database alert", "{message|A database alert was raised}"),
            "SERVICE_DOWN" => ("Service down", "{service|A service} is not responding"),
            "SECURITY_INCIDENT" => ("Security incident", "{message|A security incident was detected}"),
            "RESOURCE_QUOTA" => ("Resource quota", "{resource|A resource} is close to its quota"),
            "SUPPORT_TICKET_CREATED" => ("New support ticket", "Ticket #{ticketId} opened: {subject|no subject}"),
            "SUPPORT_TICKET_ESCALATED" => ("Support ticket escalated", "Ticket #{ticketId} was escalated"),
            "SUPPORT_TICKET_RESOLVED" => ("Support ticket resolved", "Ticket #{ticketId} was resolved"),
            "SUPPORT_TICKET_REOPENED" => ("Support ticket reopened", "Ticket #{ticketId} was reopened"),
            _ => ("Admin notification", "{message|You have a new admin notification}"),
        },
        RecipientCategory::Customer => match event_type {
            "RESERVATION_CONFIRMED" => (
                "Reservation confirmed",
                "Your reservation at {restaurantName|the restaurant} on {date|the selected date} is confirmed",
            ),
            "RESERVATION_REJECTED" => (
                "Reservation declined",
                "{restaurantName|The restaurant} could not accept your reservation",
            ),
            "RESERVATION_REMINDER" => (
                "Reservation reminder",
                "See you at {restaurantName|the restaurant} on {date|the selected date}",
            ),
            "ORDER_READY" => ("Order ready", "Your order #{orderId} is ready"),
            "ORDER_STATUS_UPDATE" => ("Order update", "Order #{orderId} is now {status|updated}"),
            _ => ("Notification", "{message|You have a new notification}"),
        },
        RecipientCategory::RestaurantUser => match event_type {
            "RESERVATION_REQUESTED" => (
                "New reservation",
                "{customerName|A customer} requested a table for {pax|1} on {date|an unspecified date}",
            ),
            "NEW_ORDER" => ("New order", "Order #{orderId} was placed"),
            "KITCHEN_ALERT" => ("Kitchen alert", "{message|The kitchen needs attention}"),
            "TASK_ASSIGNMENT" => ("New task", "{task|A task} was assigned to you"),
            "DIRECT_MESSAGE" => ("New message", "{senderName|A colleague} sent you a message"),
            _ => ("Restaurant notification", "{message|You have a new notification}"),
        },
        RecipientCategory::RestaurantTeam => match event_type {
            "RESERVATION_REQUESTED" => (
                "New reservation",
                "New reservation from {customerName|a customer} for {pax|1} people on {date|an unspecified date}",
            ),
            "RESERVATION_CANCELLED" => (
                "Reservation cancelled",
                "Reservation of {customerName|a customer} for {pax|1} people was cancelled",
            ),
            "RESERVATION_MODIFIED" => (
                "Reservation modified",
                "Reservation of {customerName|a customer} changed to {pax|1} people on {date|an unspecified date}",
            ),
            "RESERVATION_CONFIRMED" => (
                "Reservation confirmed",
                "Reservation of {customerName|a customer} for {pax|1} people is confirmed",
            ),
            "RESERVATION_REJECTED" => (
                "Reservation rejected",
                "Reservation of {customerName|a customer} was rejected",
            ),
            _ => ("Restaurant notification", "New notification from the restaurant"),
        },
        RecipientCategory::Agency => match event_type {
            "BOOKING_REQUEST" => ("Booking request", "{customerName|A customer} requested a booking"),
            "NEW_BOOKING" => ("New booking", "Booking #{bookingId} was created"),
            "URGENT_BOOKING" => ("Urgent booking", "Booking #{bookingId} needs immediate attention"),
            "ASSIGNMENT_AVAILABLE" => ("Assignment available", "A new assignment is available"),
            _ => ("Agency notification", "{message|You have a new notification}"),
        },
        RecipientCategory::Chat => match event_type {
            "CHAT_MESSAGE_RECEIVED" | "CHAT_GROUP_MESSAGE" | "CHAT_RESERVATION_MESSAGE" => {
                ("New message from {senderName|Someone}", "{content|}")
            }
            "CHAT_TYPING_INDICATOR" => ("{senderName|Someone} is typing...", ""),
            "CHAT_USER_JOINED" => ("{senderName|Someone} joined the conversation", ""),
            "CHAT_USER_LEFT" => ("{senderName|Someone} left the conversation", ""),
            "CHAT_MESSAGES_READ" => ("Messages read", ""),
            _ => ("Chat update", "{content|}"),
        },
        RecipientCategory::Social => match event_type {
            "SOCIAL_NEW_POST" => ("{authorName|Someone} published a new post", "{content|}"),
            "SOCIAL_NEW_STORY" => ("{authorName|Someone} added a story", ""),
            "SOCIAL_POST_LIKED" => ("{actorName|Someone} liked your post", ""),
            "SOCIAL_POST_COMMENTED" => ("{actorName|Someone} commented on your post", "{content|}"),
            "SOCIAL_POST_SHARED" => ("{actorName|Someone} shared your post", ""),
            "SOCIAL_USER_MENTIONED" => ("{actorName|Someone} mentioned you", ""),
            "SOCIAL_NEW_FOLLOWER" => ("{actorName|Someone} started following you", ""),
            "SOCIAL_FOLLOW_REQUEST" => ("{actorName|Someone} wants to follow you", ""),
            "SOCIAL_FOLLOW_ACCEPTED" => ("{followingName|Someone} accepted your request", ""),
            "SOCIAL_STORY_REPLY" => ("{actorName|Someone} replied to your story", "{content|}"),
            "EVENT_CREATED" => ("New event from {restaurantName|a restaurant}", "Date: {eventDate|to be announced}"),
            "EVENT_REMINDER" => ("Reminder: {eventTitle|the event}", "Date: {eventDate|to be announced}"),
            "EVENT_UPDATED" => ("Event updated", ""),
            "EVENT_CANCELLED" => ("Event cancelled", "{message|}"),
            "EVENT_RSVP_STATUS_CHANGED" => ("Attendance update", ""),
            _ => ("Social notification", ""),
        },
    }
}

/// Fill `{field}` / `{field|fallback}` placeholders from `payload`.
pub fn render(template: &str, payload: &Value) -> Result<String, AppError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };

        let placeholder = &after[..close];
        let (key, fallback) = match placeholder.split_once('|') {
            Some((key, fallback)) => (key, Some(fallback)),
            None => (placeholder, None),
        };
        match (payload::text(payload, key), fallback) {
            (Some(value), _) => out.push_str(&value),
            (None, Some(fallback)) => out.push_str(fallback),
            (None, None) => {
                return Err(AppError::MalformedPayload(format!(
                    "missing required field '{}'",
                    key
                )));
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Shorten user-written content to `max` characters, ending in `...`.
pub fn preview(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        return content.to_string();
    }
    let kept: String = content.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Title and body for an event, honouring payload-supplied text.
pub fn compose(
    category: RecipientCategory,
    event_type: &str,
    payload: &Value,
) -> Result<(String, String), AppError> {
    let (title_template, body_template) = template(category, event_type);

    let title = match payload::opt_str(payload, "title").filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => render(title_template, payload)?,
    };

    let body = match payload::opt_str(payload, "body").filter(|b| !b.is_empty()) {
        Some(body) => body.to_string(),
        None => {
            let rendered = render(body_template, payload)?;
            match category {
                RecipientCategory::Chat | RecipientCategory::Social => {
                    preview(&rendered, PREVIEW_CHARS)
                }
                _ => rendered,
            }
        }
    };

    Ok((title, body))
}
