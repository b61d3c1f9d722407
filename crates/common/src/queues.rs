//! Queue names shared by the publisher and the notifier.

use crate::types::RecipientCategory;

pub const ADMIN: &str = "notification.admin";
pub const CUSTOMER: &str = "notification.customer";
pub const RESTAURANT: &str = "notification.restaurant";
pub const RESTAURANT_RESERVATIONS: &str = "notification.restaurant.reservations";
pub const AGENCY: &str = "notification.agency";
pub const CHAT: &str = "notification.chat";
pub const SOCIAL: &str = "notification.social";
pub const BROADCAST: &str = "notification.broadcast";
pub const DEAD_LETTER: &str = "notification.dlq";

/// Every queue the notifier consumes.
pub const CONSUMED: [&str; 8] = [
    ADMIN,
    CUSTOMER,
    RESTAURANT,
    RESTAURANT_RESERVATIONS,
    AGENCY,
    CHAT,
    SOCIAL,
    BROADCAST,
];

/// Queue carrying targeted messages for `category`.
pub fn for_category(category: RecipientCategory) -> &'static str {
    match category {
        RecipientCategory::Admin => ADMIN,
        RecipientCategory::Customer => CUSTOMER,
        RecipientCategory::RestaurantUser => RESTAURANT,
        RecipientCategory::RestaurantTeam => RESTAURANT_RESERVATIONS,
        RecipientCategory::Agency => AGENCY,
        RecipientCategory::Chat => CHAT,
        RecipientCategory::Social => SOCIAL,
    }
}

/// Category whose orchestrator handles messages from `queue`.
///
/// `None` for the broadcast queue, where the category travels in the
/// message's `audience` field, and for unknown queues.
pub fn category_of(queue: &str) -> Option<RecipientCategory> {
    RecipientCategory::ALL
        .into_iter()
        .find(|category| for_category(*category) == queue)
}
