use std::fmt::{Display, Formatter};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::{Generator, Ulid};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RecipeError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("recipe not found: {0}")]
    NotFound(RecipeId),
    #[error("recipe id generator exhausted for the current millisecond")]
    IdExhausted,
}

/// Opaque recipe identifier.
///
/// Freshly created recipes get a ULID string; seeded recipes keep whatever id
/// the dataset carried.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct RecipeId(String);

impl RecipeId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Ulid> for RecipeId {
    fn from(value: Ulid) -> Self {
        Self(value.to_string())
    }
}

impl Display for RecipeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ingredients: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
}

impl Recipe {
    /// True when any tag equals `tag` under Unicode case folding.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| eq_ignore_case(candidate, tag))
    }
}

/// Caller-supplied recipe fields, used for both create and full replacement.
///
/// Unknown fields (including `id` and `publishedAt`) are ignored on decode;
/// absent or `null` lists decode as empty.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct RecipeDraft {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ingredients: Vec<String>,
}

impl RecipeDraft {
    /// # Errors
    /// Returns [`RecipeError::Validation`] when `name` is empty.
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.name.is_empty() {
            return Err(RecipeError::Validation("recipe name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A dataset record loaded at startup. Unlike [`RecipeDraft`] it may carry
/// an existing `id` and `publishedAt`, which seeding preserves.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeedRecipe {
    #[serde(default)]
    pub id: Option<RecipeId>,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ingredients: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Default)]
struct RepositoryState {
    recipes: Vec<Recipe>,
    ids: Generator,
}

impl std::fmt::Debug for RepositoryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryState").field("recipes", &self.recipes).finish_non_exhaustive()
    }
}

impl RepositoryState {
    fn position(&self, id: &str) -> Option<usize> {
        self.recipes.iter().position(|recipe| recipe.id.as_str() == id)
    }

    fn contains(&self, id: &RecipeId) -> bool {
        self.recipes.iter().any(|recipe| &recipe.id == id)
    }

    // Generator output is strictly increasing, so an id is never handed out
    // twice; the scan only guards against a seeded record that already owns it.
    fn next_id(&mut self, pending: &[Recipe]) -> Result<RecipeId, RecipeError> {
        loop {
            let id = RecipeId::from(self.ids.generate().map_err(|_| RecipeError::IdExhausted)?);
            if !self.contains(&id) && !pending.iter().any(|recipe| recipe.id == id) {
                return Ok(id);
            }
        }
    }
}

/// In-memory recipe collection.
///
/// A single reader/writer lock guards the whole collection: `list`, `get` and
/// `search_by_tag` share it, `create`, `update`, `delete` and `seed` take it
/// exclusively. Nothing performs I/O while the lock is held. Records are kept
/// in insertion order and every lookup is a linear scan in that order.
#[derive(Debug, Default)]
pub struct RecipeRepository {
    state: RwLock<RepositoryState>,
}

impl RecipeRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert dataset records in order, preserving their `id` and `publishedAt`.
    ///
    /// Records without an id get a fresh one; records without a publish time
    /// get the seeding instant. The batch is all-or-nothing.
    ///
    /// # Errors
    /// Returns [`RecipeError::Validation`] for an empty name or an id already
    /// present in the repository or earlier in the batch.
    pub fn seed<I>(&self, records: I) -> Result<usize, RecipeError>
    where
        I: IntoIterator<Item = SeedRecipe>,
    {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.write();
        let mut staged: Vec<Recipe> = Vec::new();

        for record in records {
            if record.name.is_empty() {
                return Err(RecipeError::Validation(format!(
                    "seed record #{} has an empty name",
                    staged.len() + 1
                )));
            }
            let id = match record.id.filter(|id| !id.is_empty()) {
                Some(id) => {
                    if state.contains(&id) || staged.iter().any(|recipe| recipe.id == id) {
                        return Err(RecipeError::Validation(format!("duplicate recipe id {id}")));
                    }
                    id
                }
                None => state.next_id(&staged)?,
            };
            staged.push(Recipe {
                id,
                name: record.name,
                tags: record.tags,
                ingredients: record.ingredients,
                published_at: record.published_at.unwrap_or(now),
            });
        }

        let count = staged.len();
        state.recipes.extend(staged);
        Ok(count)
    }

    /// Create a recipe with a fresh id, stamped with the current instant.
    ///
    /// # Errors
    /// Returns [`RecipeError::Validation`] when the draft name is empty.
    pub fn create(&self, draft: RecipeDraft) -> Result<Recipe, RecipeError> {
        draft.validate()?;
        let published_at = OffsetDateTime::now_utc();

        let mut state = self.state.write();
        let id = state.next_id(&[])?;
        let recipe = Recipe {
            id,
            name: draft.name,
            tags: draft.tags,
            ingredients: draft.ingredients,
            published_at,
        };
        state.recipes.push(recipe.clone());
        Ok(recipe)
    }

    /// Snapshot of every recipe in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Recipe> {
        self.state.read().recipes.clone()
    }

    /// # Errors
    /// Returns [`RecipeError::NotFound`] when no recipe has this id.
    pub fn get(&self, id: &str) -> Result<Recipe, RecipeError> {
        let state = self.state.read();
        state
            .recipes
            .iter()
            .find(|recipe| recipe.id.as_str() == id)
            .cloned()
            .ok_or_else(|| RecipeError::NotFound(RecipeId::new(id)))
    }

    /// Replace name, tags and ingredients of an existing recipe.
    ///
    /// `id` and `publishedAt` are left as they were. The replacement is taken
    /// as decoded; unlike `create`, an empty name is accepted.
    ///
    /// # Errors
    /// Returns [`RecipeError::NotFound`] for an unknown id.
    pub fn update(&self, id: &str, replacement: RecipeDraft) -> Result<Recipe, RecipeError> {
        let mut state = self.state.write();
        let index = state.position(id).ok_or_else(|| RecipeError::NotFound(RecipeId::new(id)))?;
        let recipe = &mut state.recipes[index];
        recipe.name = replacement.name;
        recipe.tags = replacement.tags;
        recipe.ingredients = replacement.ingredients;
        Ok(recipe.clone())
    }

    /// Remove a recipe, keeping the relative order of the rest.
    ///
    /// # Errors
    /// Returns [`RecipeError::NotFound`] when no recipe has this id.
    pub fn delete(&self, id: &str) -> Result<Recipe, RecipeError> {
        let mut state = self.state.write();
        let index = state.position(id).ok_or_else(|| RecipeError::NotFound(RecipeId::new(id)))?;
        Ok(state.recipes.remove(index))
    }

    /// Every recipe carrying `tag` (case-insensitive), in insertion order.
    ///
    /// An empty `tag` only matches recipes that carry an empty-string tag.
    #[must_use]
    pub fn search_by_tag(&self, tag: &str) -> Vec<Recipe> {
        let state = self.state.read();
        state.recipes.iter().filter(|recipe| recipe.has_tag(tag)).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().recipes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn eq_ignore_case(lhs: &str, rhs: &str) -> bool {
    lhs.chars().flat_map(char::to_lowercase).eq(rhs.chars().flat_map(char::to_lowercase))
}
