use herald_common::types::RecipientCategory;

/// Organisational scope a notification is evaluated in.
///
/// `scope_id` is the organisation (restaurant, agency, conversation) and
/// `sub_scope_id` an optional hub inside it. Customers and admins have no
/// organisation, so both ids are `None` for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeContext {
    pub category: RecipientCategory,
    pub scope_id: Option<i64>,
    pub sub_scope_id: Option<i64>,
}

impl ScopeContext {
    pub fn new(category: RecipientCategory, scope_id: Option<i64>, sub_scope_id: Option<i64>) -> Self {
        Self {
            category,
            scope_id,
            sub_scope_id,
        }
    }

    /// Scope with no organisation attached.
    pub fn unscoped(category: RecipientCategory) -> Self {
        Self::new(category, None, None)
    }
}
