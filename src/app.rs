//! The assembled concept set and the orchestration that spans concepts.

use sqlx::SqlitePool;

use crate::concepts::{
    Authenticating, Friending, Graphing, Posting, Sessioning, Tagging, Webapping,
};
use crate::config::Config;
use crate::db::CollectionRegistry;
use crate::errors::AppError;

/// Every concept, each bound to its own collections.
pub struct App {
    pub authenticating: Authenticating,
    pub webapping: Webapping,
    pub tagging: Tagging,
    pub friending: Friending,
    pub posting: Posting,
    pub sessioning: Sessioning,
    pub graphing: Graphing,
    registry: CollectionRegistry,
}

impl App {
    pub async fn new(pool: SqlitePool, config: &Config) -> Result<Self, AppError> {
        let registry = CollectionRegistry::new();

        let app = Self {
            authenticating: Authenticating::new(&registry, pool.clone()).await?,
            webapping: Webapping::new(&registry, pool.clone()).await?,
            tagging: Tagging::new(&registry, pool.clone(), config.tag_delete_policy).await?,
            friending: Friending::new(&registry, pool.clone()).await?,
            posting: Posting::new(&registry, pool.clone()).await?,
            sessioning: Sessioning,
            graphing: Graphing::new(&registry, pool).await?,
            registry,
        };

        tracing::info!("Bound collections: {}", app.registry.names().join(", "));
        Ok(app)
    }

    /// Recompute the similarity edges of `item` against the user's other webapps.
    ///
    /// Run after every tag change on `item`.
    pub async fn refresh_edges(&self, user: &str, item: &str) -> Result<(), AppError> {
        let others: Vec<String> = self
            .webapping
            .get_webapps(Some(user))
            .await?
            .into_iter()
            .map(|webapp| webapp.id)
            .filter(|id| id != item)
            .collect();

        let connected = self.tagging.get_matching_items(item, &others).await?;
        self.graphing
            .update_edges_for_user_node(user, item, &connected)
            .await
    }

    /// Replace the user ids inside a concept failure with usernames.
    ///
    /// If the lookup itself fails the original error is returned unchanged.
    pub async fn humanize(&self, err: AppError) -> AppError {
        let concept = match err {
            AppError::Concept(concept) if !concept.user_args().is_empty() => concept,
            other => return other,
        };

        let ids: Vec<String> = concept
            .user_args()
            .iter()
            .filter_map(|&pos| concept.args().get(pos).cloned())
            .collect();

        match self.authenticating.ids_to_usernames(&ids).await {
            Ok(usernames) => {
                let mut args = concept.args().to_vec();
                for (&pos, username) in concept.user_args().iter().zip(usernames) {
                    if let Some(slot) = args.get_mut(pos) {
                        *slot = username;
                    }
                }
                AppError::Concept(concept.format_with(args))
            }
            Err(lookup) => {
                tracing::warn!("Could not resolve usernames for error message: {}", lookup);
                AppError::Concept(concept)
            }
        }
    }
}
