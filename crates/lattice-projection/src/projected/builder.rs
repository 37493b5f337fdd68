//! Configuration and construction of projected collections.

use std::sync::Arc;

use lattice_projection_core::{DispatchPriority, ExecutionContext};

use super::ProjectedCollection;
use super::sync::{Conversions, Disposer};
use crate::error::{CollectionError, Result};
use crate::source::{BackingSource, Disposable, SourceCollection};

/// How a change raised off-context reaches the execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Post the change and return to the raising thread immediately.
    #[default]
    Posted,
    /// Post the change and block the raising thread until the context has
    /// applied it.
    ///
    /// Raising a change from a thread the context itself is waiting on
    /// deadlocks.
    Blocking,
}

/// Tunables of a projected collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionConfig {
    /// Priority of work posted to the execution context.
    pub priority: DispatchPriority,
    /// How off-context changes are delivered.
    pub delivery: DeliveryMode,
}

/// Builder for [`ProjectedCollection`].
///
/// `source`, `to_projection`, `to_source` and `context` are required;
/// [`build`](Self::build) reports the first one missing.
///
/// # Example
///
/// ```
/// use lattice_projection::{ObservableVec, ProjectedCollectionBuilder};
/// use lattice_projection_core::InlineContext;
/// use std::sync::Arc;
///
/// let source = Arc::new(ObservableVec::from(vec![1, 2, 3]));
/// let labels = ProjectedCollectionBuilder::new()
///     .source(source.clone())
///     .to_projection(|n: &i32| format!("#{n}"))
///     .to_source(|label: &String| label[1..].parse().unwrap_or_default())
///     .context(InlineContext)
///     .build()
///     .unwrap();
///
/// assert_eq!(labels.to_vec().unwrap(), vec!["#1", "#2", "#3"]);
/// ```
pub struct ProjectedCollectionBuilder<S, P> {
    source: Option<Arc<dyn SourceCollection<S>>>,
    to_projection: Option<Arc<dyn Fn(&S) -> P + Send + Sync>>,
    to_source: Option<Arc<dyn Fn(&P) -> S + Send + Sync>>,
    disposer: Option<Disposer<P>>,
    context: Option<Arc<dyn ExecutionContext>>,
    config: ProjectionConfig,
}

impl<S, P> Default for ProjectedCollectionBuilder<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, P> ProjectedCollectionBuilder<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Create a builder with nothing set and the default configuration.
    pub fn new() -> Self {
        Self {
            source: None,
            to_projection: None,
            to_source: None,
            disposer: None,
            context: None,
            config: ProjectionConfig::default(),
        }
    }

    /// Set the source collection to mirror.
    pub fn source<C>(mut self, source: Arc<C>) -> Self
    where
        C: SourceCollection<S> + 'static,
    {
        self.source = Some(source);
        self
    }

    /// Set the source collection from an already type-erased handle.
    pub fn shared_source(mut self, source: Arc<dyn SourceCollection<S>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the source-to-projection conversion.
    pub fn to_projection<F>(mut self, convert: F) -> Self
    where
        F: Fn(&S) -> P + Send + Sync + 'static,
    {
        self.to_projection = Some(Arc::new(convert));
        self
    }

    /// Set the projection-to-source conversion used by the write path.
    pub fn to_source<F>(mut self, convert: F) -> Self
    where
        F: Fn(&P) -> S + Send + Sync + 'static,
    {
        self.to_source = Some(Arc::new(convert));
        self
    }

    /// Convert projection elements back through their backing source,
    /// falling back to `S::default()` for unbound elements.
    pub fn to_source_from_backing(self) -> Self
    where
        P: BackingSource<S>,
        S: Default,
    {
        self.to_source(|item: &P| item.backing_source().unwrap_or_default())
    }

    /// Set the execution context notifications are delivered on.
    pub fn context<C>(mut self, context: C) -> Self
    where
        C: ExecutionContext + 'static,
    {
        self.context = Some(Arc::new(context));
        self
    }

    /// Set the execution context from an already shared handle.
    pub fn shared_context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Dispose projection elements as they leave the collection.
    pub fn dispose_elements(self) -> Self
    where
        P: Disposable,
    {
        self.dispose_with(|item: &P| item.dispose())
    }

    /// Run `dispose` on each projection element as it leaves the collection.
    pub fn dispose_with<F>(mut self, dispose: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.disposer = Some(Arc::new(dispose));
        self
    }

    /// Set the priority of work posted to the execution context.
    pub fn priority(mut self, priority: DispatchPriority) -> Self {
        self.config.priority = priority;
        self
    }

    /// Set how off-context changes are delivered.
    pub fn delivery(mut self, delivery: DeliveryMode) -> Self {
        self.config.delivery = delivery;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ProjectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the collaborators, seed the projection, and subscribe.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidArgument`] if a required collaborator is
    /// missing, the source is read-only, or the source does not raise
    /// property-change notifications.
    pub fn build(self) -> Result<ProjectedCollection<S, P>> {
        let source = self
            .source
            .ok_or_else(|| CollectionError::invalid_argument("source", "a source collection is required"))?;
        let to_projection = self.to_projection.ok_or_else(|| {
            CollectionError::invalid_argument("to_projection", "a source-to-projection conversion is required")
        })?;
        let to_source = self.to_source.ok_or_else(|| {
            CollectionError::invalid_argument("to_source", "a projection-to-source conversion is required")
        })?;
        let context = self
            .context
            .ok_or_else(|| CollectionError::invalid_argument("context", "an execution context is required"))?;

        if source.is_read_only() {
            return Err(CollectionError::invalid_argument(
                "source",
                "the source collection must support indexed ordered mutation",
            ));
        }
        if source.property_changed().is_none() {
            return Err(CollectionError::invalid_argument(
                "source",
                "the source collection must raise property-change notifications",
            ));
        }

        Ok(ProjectedCollection::from_parts(
            source,
            Conversions {
                to_projection,
                to_source,
                disposer: self.disposer,
            },
            context,
            self.config,
        ))
    }
}
