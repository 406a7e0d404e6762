use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::ObjectStorageBackend;
use crate::config::ConfigSource;
use crate::error::{AppError, Result};
use crate::lease::{ensure_held, LeaseGuard};
use crate::schema::{SchemaDefinition, SCHEMA_VERSION_FIELD};

/// A validation pass run over a model before it is accepted or persisted.
pub type ModelValidator<T> = fn(&T) -> Result<()>;

/// A source backed by a single versioned document, exposed as a typed model.
///
/// Loading reads the raw document, runs it through the schema's migration chain and maps it into
/// the model. Mutations go through `modify`, which works on a copy and only swaps it in once the
/// mutation and validation succeed.
pub struct ModelConfigSource<T> {
    name: String,
    ordinal: i32,
    prefix: Option<String>,
    key: String,
    backend: Arc<dyn ObjectStorageBackend>,
    schema: SchemaDefinition<T>,
    validator: Option<ModelValidator<T>>,
    loaded: bool,
    model: Option<T>,
    tree: Option<Value>,
}

impl<T> std::fmt::Debug for ModelConfigSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfigSource")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .field("key", &self.key)
            .field("schema", &self.schema)
            .field("loaded", &self.loaded)
            .finish()
    }
}

impl<T> ModelConfigSource<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a new instance reading the document stored under `key` in the given backend.
    pub fn new(name: impl Into<String>, ordinal: i32, key: impl Into<String>, backend: Arc<dyn ObjectStorageBackend>, schema: SchemaDefinition<T>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            prefix: None,
            key: key.into(),
            backend,
            schema,
            validator: None,
            loaded: false,
            model: None,
            tree: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Run the given validation after every load and mutation, and before every write.
    pub fn with_validator(mut self, validator: ModelValidator<T>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn schema(&self) -> &SchemaDefinition<T> {
        &self.schema
    }

    /// Check if this source has been loaded, whether or not a document was found.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The loaded model.
    pub fn model_data(&self) -> Result<&T> {
        match (&self.model, self.loaded) {
            (Some(model), _) => Ok(model),
            (None, true) => Err(AppError::DocumentNotFound(self.describe())),
            (None, false) => Err(AppError::ReadBeforeLoad(self.describe())),
        }
    }

    /// Replace the model wholesale, such as when creating a document which does not yet exist.
    pub fn set_model_data(&mut self, model: T) -> Result<()> {
        self.validate(&model)?;
        self.tree = Some(self.schema.to_raw(&model)?);
        self.model = Some(model);
        self.loaded = true;
        Ok(())
    }

    /// Apply a mutation to a copy of the model, swapping it in only if the mutation and
    /// validation succeed. On failure the previous model is untouched.
    pub fn modify<F>(&mut self, mutation: F) -> Result<()>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        let mut next = match &self.model {
            Some(model) => model.clone(),
            None => return Err(AppError::WriteBeforeLoad(self.describe())),
        };
        mutation(&mut next)?;
        self.validate(&next)?;
        self.tree = Some(self.schema.to_raw(&next)?);
        self.model = Some(next);
        Ok(())
    }

    /// Validate the model and write the whole document to the backend.
    #[tracing::instrument(level = "debug", skip(self), fields(name = %self.name, key = %self.key), err)]
    pub async fn persist(&self) -> Result<()> {
        let model = self.model.as_ref().ok_or_else(|| AppError::WriteBeforeLoad(self.describe()))?;
        self.validate(model)?;
        let mut raw = self.schema.to_raw(model)?;
        if let Value::Object(obj) = &mut raw {
            obj.insert(SCHEMA_VERSION_FIELD.into(), Value::from(self.schema.version()));
        }
        self.backend.write_object(&self.key, &raw).await
    }

    /// As `persist`, for documents which may only be written under the given lease.
    pub async fn persist_with_lease(&self, lease: &dyn LeaseGuard) -> Result<()> {
        ensure_held(lease)?;
        self.persist().await
    }

    fn validate(&self, model: &T) -> Result<()> {
        match self.validator {
            Some(validator) => validator(model),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.name, self.key)
    }
}

#[async_trait]
impl<T> ConfigSource for ModelConfigSource<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn tree(&self) -> Option<&Value> {
        self.tree.as_ref()
    }

    fn is_refreshable(&self) -> bool {
        true
    }

    /// Read, migrate and map the document. Nothing is replaced unless every step succeeds.
    async fn load(&mut self) -> Result<()> {
        let raw = match self.backend.read_object(&self.key).await? {
            Some(raw) => raw,
            None => {
                tracing::debug!(name = %self.name, key = %self.key, "no document found");
                self.model = None;
                self.tree = None;
                self.loaded = true;
                return Ok(());
            }
        };
        let migrated = self.schema.migrate_to_current(&raw)?;
        let model: T = crate::mapper::ObjectMapper::new().from_object(&migrated)?;
        self.validate(&model)?;
        self.tree = Some(self.schema.to_raw(&model)?);
        self.model = Some(model);
        self.loaded = true;
        tracing::debug!(name = %self.name, key = %self.key, schema = self.schema.name(), "loaded document");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
