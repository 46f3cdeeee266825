use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use recipe_core::{Recipe, RecipeDraft, RecipeError, RecipeRepository, SeedRecipe};
use serde::{Deserialize, Serialize};

pub const DELETED_MESSAGE: &str = "Recipe has been deleted";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub message: String,
}

/// Query string of `GET /recipes/search`. A missing `tag` is the empty tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub tag: String,
}

/// Decode a create or update payload.
///
/// # Errors
/// Returns [`RecipeError::Validation`] when the body is not a JSON object with
/// a string `name` and optional string-array `tags` / `ingredients`.
pub fn decode_draft(body: &[u8]) -> Result<RecipeDraft, RecipeError> {
    serde_json::from_slice(body)
        .map_err(|err| RecipeError::Validation(format!("invalid recipe payload: {err}")))
}

/// Read a JSON array of recipes from disk.
///
/// # Errors
/// Returns an error when the file cannot be read or is not a recipe array.
pub fn load_dataset(path: &Path) -> Result<Vec<SeedRecipe>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read recipes dataset {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse recipes dataset {}", path.display()))
}

/// Request-facing handle over one shared [`RecipeRepository`].
///
/// Cloning is cheap; every clone sees the same collection.
#[derive(Debug, Clone, Default)]
pub struct RecipeApi {
    repository: Arc<RecipeRepository>,
}

impl RecipeApi {
    #[must_use]
    pub fn new(repository: Arc<RecipeRepository>) -> Self {
        Self { repository }
    }

    /// Build an API over a repository seeded from `dataset`, or an empty one.
    ///
    /// # Errors
    /// Returns an error when the dataset cannot be loaded or violates id
    /// uniqueness.
    pub fn from_dataset(dataset: Option<&Path>) -> Result<Self> {
        let repository = RecipeRepository::new();
        match dataset {
            Some(path) => {
                let records = load_dataset(path)?;
                let count = repository
                    .seed(records)
                    .with_context(|| format!("failed to seed recipes from {}", path.display()))?;
                tracing::info!("Seeded {} recipes from {}", count, path.display());
            }
            None => {
                tracing::warn!("No recipes dataset configured; starting with an empty collection");
            }
        }
        Ok(Self::new(Arc::new(repository)))
    }

    #[must_use]
    pub fn repository(&self) -> &RecipeRepository {
        &self.repository
    }

    /// # Errors
    /// Returns [`RecipeError::Validation`] when the draft is invalid.
    pub fn create_recipe(&self, draft: RecipeDraft) -> Result<Recipe, RecipeError> {
        let recipe = self.repository.create(draft)?;
        tracing::info!(recipe_id = %recipe.id, "Recipe created");
        Ok(recipe)
    }

    #[must_use]
    pub fn list_recipes(&self) -> Vec<Recipe> {
        self.repository.list()
    }

    /// # Errors
    /// Returns [`RecipeError::NotFound`] for an unknown id.
    pub fn get_recipe(&self, id: &str) -> Result<Recipe, RecipeError> {
        self.repository.get(id)
    }

    /// # Errors
    /// Returns [`RecipeError::NotFound`] for an unknown id.
    pub fn update_recipe(&self, id: &str, replacement: RecipeDraft) -> Result<Recipe, RecipeError> {
        let recipe = self.repository.update(id, replacement)?;
        tracing::info!(recipe_id = %recipe.id, "Recipe updated");
        Ok(recipe)
    }

    /// # Errors
    /// Returns [`RecipeError::NotFound`] for an unknown id.
    pub fn delete_recipe(&self, id: &str) -> Result<DeleteResult, RecipeError> {
        tracing::info!(recipe_id = id, "Deleting recipe");
        let removed = self.repository.delete(id)?;
        tracing::info!(recipe_id = %removed.id, "Recipe deleted");
        Ok(DeleteResult { message: DELETED_MESSAGE.to_string() })
    }

    #[must_use]
    pub fn search_recipes(&self, query: &SearchQuery) -> Vec<Recipe> {
        let hits = self.repository.search_by_tag(&query.tag);
        tracing::debug!(tag = %query.tag, hits = hits.len(), "Searched recipes by tag");
        hits
    }
}
