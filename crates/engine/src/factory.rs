//! Orchestrator factory: dispatch table from recipient-category tag to the
//! orchestrator that disaggregates it.

use std::collections::HashMap;
use std::sync::Arc;

use herald_common::error::AppError;
use herald_common::types::RecipientCategory;

use crate::orchestrator::{
    AdminOrchestrator, AgencyOrchestrator, ChatOrchestrator, Collaborators, CustomerOrchestrator,
    Orchestrator, RestaurantTeamOrchestrator, RestaurantUserOrchestrator, SocialOrchestrator,
};

/// Registry of every orchestrator, keyed by the tag the publisher routes on.
pub struct OrchestratorFactory {
    orchestrators: HashMap<RecipientCategory, Arc<dyn Orchestrator>>,
}

impl OrchestratorFactory {
    /// Build the registry with all seven orchestrators sharing `collaborators`.
    pub fn new(collaborators: Collaborators) -> Self {
        let orchestrators: Vec<Arc<dyn Orchestrator>> = vec![
            Arc::new(AdminOrchestrator::new(collaborators.clone())),
            Arc::new(CustomerOrchestrator::new(collaborators.clone())),
            Arc::new(RestaurantUserOrchestrator::new(collaborators.clone())),
            Arc::new(RestaurantTeamOrchestrator::new(collaborators.clone())),
            Arc::new(AgencyOrchestrator::new(collaborators.clone())),
            Arc::new(ChatOrchestrator::new(collaborators.clone())),
            Arc::new(SocialOrchestrator::new(collaborators)),
        ];

        Self {
            orchestrators: orchestrators
                .into_iter()
                .map(|o| (o.category(), o))
                .collect(),
        }
    }

    /// Orchestrator for a category tag such as `RESTAURANT_TEAM`.
    ///
    /// An unknown tag is a configuration error and is returned, never
    /// defaulted.
    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn Orchestrator>, AppError> {
        let category: RecipientCategory = tag.parse()?;
        self.for_category(category)
    }

    pub fn for_category(
        &self,
        category: RecipientCategory,
    ) -> Result<Arc<dyn Orchestrator>, AppError> {
        self.orchestrators
            .get(&category)
            .cloned()
            .ok_or_else(|| AppError::UnknownRecipientType(category.to_string()))
    }

    /// Categories with a registered orchestrator.
    pub fn categories(&self) -> Vec<RecipientCategory> {
        let mut categories: Vec<_> = self.orchestrators.keys().copied().collect();
        categories.sort();
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{StaticBlocks, StaticDirectory, StaticPolicy};
    use crate::orchestrator::test_support::collaborators;

    fn factory() -> OrchestratorFactory {
        OrchestratorFactory::new(collaborators(
            StaticPolicy::new(),
            StaticDirectory::new(),
            StaticBlocks::new(),
        ))
    }

    #[test]
    fn test_every_category_is_registered() {
        assert_eq!(factory().categories(), RecipientCategory::ALL.to_vec());
    }

    #[test]
    fn test_resolve_by_tag() {
        let factory = factory();
        for category in RecipientCategory::ALL {
            let orchestrator = factory.resolve(category.tag()).unwrap();
            assert_eq!(orchestrator.category(), category);
        }
        assert_eq!(
            factory.resolve("restaurant_team").unwrap().category(),
            RecipientCategory::RestaurantTeam
        );
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let err = factory().resolve("SUPPLIER").err().unwrap();
        assert!(matches!(err, AppError::UnknownRecipientType(tag) if tag == "SUPPLIER"));
    }
}
