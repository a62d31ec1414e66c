//! Service context shared by all request handlers.
//!
//! The context owns the inference pipeline, the model lifecycle and the metrics.
//! It is built once at startup and handed to handlers through axum state.

use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::asr::{
    panic_message, warm_up, AudioResolver, InferencePipeline, ModelLoader, SpeechModel,
};
use crate::config::Config;
use crate::error::{AppError, ModelError, Result};
use crate::server::metrics::ServiceMetrics;

/// Model lifecycle.
enum ModelState {
    Loading,
    Ready(Arc<dyn SpeechModel>),
    Failed(String),
}

/// Readiness as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Loading,
    Ready,
    Failed,
}

impl Readiness {
    /// Status string used by the informational root route.
    pub fn as_status(&self) -> &'static str {
        match self {
            Readiness::Loading => "loading",
            Readiness::Ready => "healthy",
            Readiness::Failed => "failed",
        }
    }
}

/// Shared service context.
pub struct ServiceContext {
    /// Per-request transcription work
    pub pipeline: InferencePipeline,

    /// Service metrics
    pub metrics: ServiceMetrics,

    model: RwLock<ModelState>,

    /// Cancelled when the process should stop serving
    shutdown: CancellationToken,
}

impl ServiceContext {
    /// Create a context in the `Loading` state.
    pub fn new(pipeline: InferencePipeline, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            metrics: ServiceMetrics::new(),
            model: RwLock::new(ModelState::Loading),
            shutdown,
        }
    }

    /// Build the context described by the configuration.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let resolver = AudioResolver::new(config.audio_fetch_timeout, config.max_audio_bytes)?;
        let pipeline = InferencePipeline::new(
            resolver,
            config.model_id.clone(),
            config.temp_dir.clone(),
            config.max_concurrent_inferences,
        );
        Ok(Self::new(pipeline, shutdown))
    }

    /// Identifier of the served model.
    pub fn model_id(&self) -> &str {
        self.pipeline.model_id()
    }

    pub fn readiness(&self) -> Readiness {
        match &*self.model.read() {
            ModelState::Loading => Readiness::Loading,
            ModelState::Ready(_) => Readiness::Ready,
            ModelState::Failed(_) => Readiness::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    /// The loaded model, or a retryable error while it is not available.
    pub fn ready_model(&self) -> Result<Arc<dyn SpeechModel>> {
        match &*self.model.read() {
            ModelState::Ready(model) => Ok(Arc::clone(model)),
            ModelState::Loading => Err(AppError::NotReady("model is still loading".to_string())),
            ModelState::Failed(reason) => Err(AppError::NotReady(format!(
                "model failed to load: {}",
                reason
            ))),
        }
    }

    /// Install a loaded model and flip to `Ready`.
    pub fn install_model(&self, model: Arc<dyn SpeechModel>) {
        *self.model.write() = ModelState::Ready(model);
    }

    fn mark_failed(&self, reason: String) {
        *self.model.write() = ModelState::Failed(reason);
    }

    /// Token cancelled when serving should stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the full lifecycle: load, optionally warm up, then become ready.
    pub async fn load(&self, loader: &dyn ModelLoader, warmup: bool) -> Result<()> {
        info!(model = %self.model_id(), "Loading model");
        let start = Instant::now();

        let loaded = AssertUnwindSafe(loader.load())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ModelError::Panicked(panic_message(panic.as_ref()))));

        let model = match loaded {
            Ok(model) => model,
            Err(e) => {
                error!(error = %e, "Model load failed");
                self.mark_failed(e.to_string());
                return Err(e.into());
            }
        };
        info!("Model loaded in {:.2}s", start.elapsed().as_secs_f64());

        if warmup {
            warm_up(model.as_ref(), self.pipeline.temp_dir()).await;
        }

        self.install_model(model);
        info!(model = %self.model_id(), "Model ready");
        Ok(())
    }

    /// Load in the background; a failure cancels the shutdown token.
    pub fn spawn_loading(
        self: Arc<Self>,
        loader: Arc<dyn ModelLoader>,
        warmup: bool,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let result = self.load(loader.as_ref(), warmup).await;
            if result.is_err() {
                self.shutdown.cancel();
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{Behavior, ScriptedModel};
    use crate::error::ModelError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct GatedLoader {
        gate: Arc<Notify>,
        fail: bool,
    }

    #[async_trait]
    impl ModelLoader for GatedLoader {
        async fn load(&self) -> std::result::Result<Arc<dyn SpeechModel>, ModelError> {
            self.gate.notified().await;
            if self.fail {
                Err(ModelError::Unavailable("no runtime".to_string()))
            } else {
                Ok(Arc::new(ScriptedModel::replying("", None)))
            }
        }
    }

    fn context() -> Arc<ServiceContext> {
        let resolver = AudioResolver::new(Duration::from_secs(1), 1024).unwrap();
        let pipeline = InferencePipeline::new(resolver, "test/model", None, 1);
        Arc::new(ServiceContext::new(pipeline, CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_lifecycle_loading_to_ready() {
        let ctx = context();
        let gate = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            gate: gate.clone(),
            fail: false,
        });

        let handle = ctx.clone().spawn_loading(loader, true);
        assert_eq!(ctx.readiness(), Readiness::Loading);
        assert!(matches!(ctx.ready_model(), Err(AppError::NotReady(_))));

        gate.notify_one();
        handle.await.unwrap().unwrap();
        assert!(ctx.is_ready());
        assert!(ctx.ready_model().is_ok());
        assert!(!ctx.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_load_failure_cancels_serving() {
        let ctx = context();
        let gate = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            gate: gate.clone(),
            fail: true,
        });

        let handle = ctx.clone().spawn_loading(loader, true);
        gate.notify_one();
        assert!(handle.await.unwrap().is_err());
        assert_eq!(ctx.readiness(), Readiness::Failed);
        assert!(ctx.shutdown_token().is_cancelled());
        match ctx.ready_model() {
            Err(AppError::NotReady(message)) => assert!(message.contains("no runtime")),
            _ => panic!("expected not ready"),
        }
    }

    #[tokio::test]
    async fn test_failed_state_is_visible_once_cancelled() {
        let ctx = context();
        let gate = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            gate: gate.clone(),
            fail: true,
        });
        let token = ctx.shutdown_token();

        let handle = ctx.clone().spawn_loading(loader, false);
        gate.notify_one();
        token.cancelled().await;

        // Observed before the loading task is joined
        assert_eq!(ctx.readiness(), Readiness::Failed);
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_loader_panic_marks_failed_and_cancels() {
        struct PanickingLoader;

        #[async_trait]
        impl ModelLoader for PanickingLoader {
            async fn load(&self) -> std::result::Result<Arc<dyn SpeechModel>, ModelError> {
                panic!("runtime client blew up")
            }
        }

        let ctx = context();
        let handle = ctx.clone().spawn_loading(Arc::new(PanickingLoader), true);
        let result = handle.await.unwrap();

        assert!(matches!(
            result,
            Err(AppError::Inference(ModelError::Panicked(_)))
        ));
        assert_eq!(ctx.readiness(), Readiness::Failed);
        assert!(ctx.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_warmup_panic_still_becomes_ready() {
        struct PanicModelLoader;

        #[async_trait]
        impl ModelLoader for PanicModelLoader {
            async fn load(&self) -> std::result::Result<Arc<dyn SpeechModel>, ModelError> {
                Ok(Arc::new(ScriptedModel::new(Behavior::Panic)))
            }
        }

        let ctx = context();
        let handle = ctx.clone().spawn_loading(Arc::new(PanicModelLoader), true);
        handle.await.unwrap().unwrap();

        assert_eq!(ctx.readiness(), Readiness::Ready);
        assert!(!ctx.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_warmup_failure_is_not_fatal() {
        struct FailingLoader;

        #[async_trait]
        impl ModelLoader for FailingLoader {
            async fn load(&self) -> std::result::Result<Arc<dyn SpeechModel>, ModelError> {
                Ok(Arc::new(ScriptedModel::new(Behavior::Fail)))
            }
        }

        let ctx = context();
        ctx.load(&FailingLoader, true).await.unwrap();
        assert!(ctx.is_ready());
    }
}
