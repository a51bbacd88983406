use crate::{CaptionEngine, ImageCaptionInput, ImageCaptionOutput, ModelError};
use futures::{
    future::{BoxFuture, Shared},
    Future, FutureExt,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type LoadFuture<T> = Shared<BoxFuture<'static, Result<Arc<T>, ModelError>>>;

enum LoadState<T> {
    Unloaded,
    Loading { attempt: u64, future: LoadFuture<T> },
    Loaded(Arc<T>),
}

/// Builds `T` on first use and shares it afterwards.
///
/// Concurrent callers of [`ModelLoader::load`] during a load all wait on the
/// same attempt. A failed attempt puts the loader back to unloaded, so the
/// next call starts over instead of replaying the failure.
pub struct ModelLoader<T> {
    model_id: String, // for better logging
    state: Mutex<LoadState<T>>,
    attempts: AtomicU64,
    create_model_fn: Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>,
}

impl<T> ModelLoader<T>
where
    T: Send + Sync + 'static,
{
    pub fn new<TFut, TFn>(model_id: impl Into<String>, create_model: TFn) -> Self
    where
        TFut: Future<Output = anyhow::Result<T>> + Send + 'static,
        TFn: Fn() -> TFut + Send + Sync + 'static,
    {
        Self {
            model_id: model_id.into(),
            state: Mutex::new(LoadState::Unloaded),
            attempts: AtomicU64::new(0),
            create_model_fn: Box::new(move || create_model().boxed()),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub async fn load(&self) -> Result<Arc<T>, ModelError> {
        let (attempt, future) = {
            let mut state = self.lock_state();

            match &*state {
                LoadState::Loaded(model) => return Ok(model.clone()),
                LoadState::Loading { attempt, future } => (*attempt, future.clone()),
                LoadState::Unloaded => {
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(model_id = %self.model_id, attempt, "loading model");

                    let future = (self.create_model_fn)()
                        .map(|result| result.map(Arc::new).map_err(ModelError::load))
                        .boxed()
                        .shared();

                    *state = LoadState::Loading {
                        attempt,
                        future: future.clone(),
                    };

                    (attempt, future)
                }
            }
        };

        let result = future.await;
        self.settle(attempt, &result);

        result
    }

    /// Load the model ahead of the first request.
    pub async fn preload(&self) -> Result<(), ModelError> {
        let start = Instant::now();

        match self.load().await {
            Ok(_) => {
                info!(
                    "model {} preloaded and ready in {:.2?}",
                    self.model_id,
                    start.elapsed()
                );
                Ok(())
            }
            Err(e) => {
                error!("failed to preload model {}: {}", self.model_id, e);
                Err(e)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(&*self.lock_state(), LoadState::Loaded(_))
    }

    pub fn model(&self) -> Option<Arc<T>> {
        match &*self.lock_state() {
            LoadState::Loaded(model) => Some(model.clone()),
            _ => None,
        }
    }

    /// Every waiter of an attempt calls this, only the first one moves the state.
    fn settle(&self, attempt: u64, result: &Result<Arc<T>, ModelError>) {
        let mut state = self.lock_state();

        let is_current = matches!(
            &*state,
            LoadState::Loading { attempt: current, .. } if *current == attempt
        );
        if !is_current {
            return;
        }

        match result {
            Ok(model) => {
                debug!(model_id = %self.model_id, attempt, "model loaded");
                *state = LoadState::Loaded(model.clone());
            }
            Err(e) => {
                error!(model_id = %self.model_id, attempt, "{}", e);
                *state = LoadState::Unloaded;
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LoadState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> ModelLoader<T>
where
    T: CaptionEngine,
{
    pub async fn caption(&self, item: &ImageCaptionInput) -> Result<ImageCaptionOutput, ModelError> {
        let model = self.load().await?;
        model.caption(item).await.map_err(ModelError::invocation)
    }

    #[tracing::instrument(name = "ModelLoader::caption_many", skip_all, fields(model_id = %self.model_id, items = items.len()))]
    pub async fn caption_many(
        &self,
        items: Vec<ImageCaptionInput>,
    ) -> Result<Vec<Result<ImageCaptionOutput, ModelError>>, ModelError> {
        let model = self.load().await?;
        let total = items.len();

        let results = model
            .caption_many(items)
            .await
            .map_err(ModelError::invocation)?;

        if results.len() != total {
            warn!("expected {} captions, got {}", total, results.len());
        }

        Ok(results
            .into_iter()
            .map(|v| v.map_err(ModelError::invocation))
            .collect())
    }
}
