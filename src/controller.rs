//! Classification orchestration.
//!
//! [`ClassificationController`] is the stateful core: it manages attach and
//! detach of a display surface, drives asynchronous model loading, serialized
//! sample-image loading and on-demand classification, and routes results back
//! to the surface only while it is attached.
//!
//! Concurrency shape: model loads run on the shared blocking pool (parallel
//! with everything else, at most one per attach cycle). Sample decodes and
//! classification requests share a single worker task draining one queue, so
//! they run one at a time in issue order and a classification never races a
//! sample decode. Completions come back as [`ControllerEvent`] messages which
//! the surface-owning context drains via [`ClassificationController::pump_one`]
//! or [`ClassificationController::pump_ready`]; no two surface-touching
//! callbacks ever run concurrently.
//!
//! There is no cancellation: detach does not abort in-flight work. Every
//! result handler checks the attach generation and silently discards stale
//! results — except a loaded session, which is always released so the native
//! resources never leak.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::bitmap::{self, BitmapCache};
use crate::codec;
use crate::engine::{EngineOptions, InferenceEngine, InferenceSession};
use crate::mean;
use crate::model::ModelBundle;
use crate::tensor::{element_count, LabelScore};
use crate::topk;
use crate::{CLASSIFICATION_TOP_K, DEFAULT_CACHE_CAPACITY, PROB_OUTPUT_LAYER};

/// The presentation collaborator. All calls are fire-and-forget and happen
/// only while the surface is attached, from the context that drains events.
pub trait Surface: Send + Sync {
    fn set_loading_visible(&self, visible: bool);
    fn set_model_name(&self, name: &str);
    fn set_model_version(&self, version: &str);
    fn set_input_dimensions(&self, dims: &[usize]);
    fn set_output_layer_names(&self, names: &[String]);
    fn add_sample_image(&self, bitmap: Arc<RgbaImage>);
    fn set_classification_result(&self, results: &[LabelScore]);
    fn show_model_load_failed(&self);
    fn show_model_not_loaded(&self);
    fn show_classification_failed(&self);
}

/// Completion message from a background task. Carries the attach generation
/// it was issued under so stale completions can be told apart from current
/// ones.
pub enum ControllerEvent {
    ModelLoaded {
        generation: u64,
        session: Arc<dyn InferenceSession>,
    },
    ModelLoadFailed {
        generation: u64,
    },
    SampleLoaded {
        generation: u64,
        path: PathBuf,
        bitmap: Arc<RgbaImage>,
    },
    Classified {
        generation: u64,
        results: Vec<LabelScore>,
    },
}

impl fmt::Debug for ControllerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoaded { generation, .. } => {
                f.debug_struct("ModelLoaded").field("generation", generation).finish()
            }
            Self::ModelLoadFailed { generation } => {
                f.debug_struct("ModelLoadFailed").field("generation", generation).finish()
            }
            Self::SampleLoaded { generation, path, .. } => f
                .debug_struct("SampleLoaded")
                .field("generation", generation)
                .field("path", path)
                .finish(),
            Self::Classified { generation, results } => f
                .debug_struct("Classified")
                .field("generation", generation)
                .field("results", &results.len())
                .finish(),
        }
    }
}

/// Work routed through the serialized queue.
enum WorkItem {
    LoadSample {
        generation: u64,
        path: PathBuf,
    },
    Classify {
        generation: u64,
        session: Arc<dyn InferenceSession>,
        model: Arc<ModelBundle>,
        bitmap: Arc<RgbaImage>,
    },
}

/// Stateful orchestrator for one model. Either `Detached` (no surface) or
/// `Attached`; no result delivery touches the surface while detached.
pub struct ClassificationController {
    model: Arc<ModelBundle>,
    engine: Arc<dyn InferenceEngine>,
    cache: BitmapCache,
    surface: Option<Arc<dyn Surface>>,
    session: Option<Arc<dyn InferenceSession>>,
    /// Bumped on every attach and detach; completions from an older
    /// generation are stale and never reach the surface.
    generation: u64,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    work_tx: mpsc::UnboundedSender<WorkItem>,
}

impl ClassificationController {
    /// Creates a detached controller. Must be called inside a Tokio runtime:
    /// the serialized worker task is spawned here.
    #[must_use]
    pub fn new(model: Arc<ModelBundle>, engine: Arc<dyn InferenceEngine>) -> Self {
        Self::with_cache_capacity(
            model,
            engine,
            NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        )
    }

    #[must_use]
    pub fn with_cache_capacity(
        model: Arc<ModelBundle>,
        engine: Arc<dyn InferenceEngine>,
        cache_capacity: NonZeroUsize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_serial_worker(work_rx, events_tx.clone()));
        Self {
            model,
            engine,
            cache: BitmapCache::new(cache_capacity),
            surface: None,
            session: None,
            generation: 0,
            events_tx,
            events_rx,
            work_tx,
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    /// Attaches a surface and starts the load cycle: loading indicator on,
    /// model name pushed, cached samples delivered synchronously, one load
    /// queued per uncached sample and one model load issued on the shared
    /// pool. An already-attached controller is detached first.
    pub fn attach(&mut self, surface: Arc<dyn Surface>) {
        if self.surface.is_some() {
            self.detach();
        }
        self.generation += 1;
        let generation = self.generation;

        surface.set_loading_visible(true);
        surface.set_model_name(&self.model.name);

        for path in self.model.sample_images.clone() {
            if let Some(bitmap) = self.cache.get(&path) {
                surface.add_sample_image(bitmap);
            } else if self
                .work_tx
                .send(WorkItem::LoadSample { generation, path })
                .is_err()
            {
                warn!("sample worker gone, skipping sample load");
            }
        }

        self.surface = Some(surface);
        self.spawn_model_load(generation);
    }

    /// Drops the surface and releases the held session, if any. In-flight
    /// work keeps running; its results will be discarded as stale.
    pub fn detach(&mut self) {
        self.generation += 1;
        self.surface = None;
        if let Some(session) = self.session.take() {
            session.release();
        }
    }

    /// Requests classification of `bitmap`. With no session loaded the
    /// surface is told so and nothing else happens; otherwise one request is
    /// queued behind any in-flight serialized work.
    pub fn classify(&mut self, bitmap: Arc<RgbaImage>) {
        let Some(session) = &self.session else {
            if let Some(surface) = &self.surface {
                surface.show_model_not_loaded();
            }
            return;
        };
        let item = WorkItem::Classify {
            generation: self.generation,
            session: Arc::clone(session),
            model: Arc::clone(&self.model),
            bitmap,
        };
        if self.work_tx.send(item).is_err() {
            warn!("classification worker gone, dropping request");
        }
    }

    /// Awaits the next completion event and handles it. Returns `false` once
    /// the event channel is closed. Call from the surface-owning context.
    pub async fn pump_one(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Handles every already-queued completion event without waiting.
    /// Returns the number handled.
    pub fn pump_ready(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Applies one completion event to the controller state. Stale or
    /// post-detach completions never touch the surface; a stale session is
    /// still released so it cannot leak.
    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::ModelLoaded { generation, session } => {
                match self.current_surface(generation) {
                    Some(surface) => {
                        surface.set_input_dimensions(&session.input_dimensions());
                        surface.set_output_layer_names(&session.output_layer_names());
                        surface.set_model_version(&session.model_version());
                        surface.set_loading_visible(false);
                        self.session = Some(session);
                    }
                    None => {
                        debug!("releasing session from a stale load");
                        session.release();
                    }
                }
            }
            ControllerEvent::ModelLoadFailed { generation } => {
                if let Some(surface) = self.current_surface(generation) {
                    surface.show_model_load_failed();
                }
            }
            ControllerEvent::SampleLoaded {
                generation,
                path,
                bitmap,
            } => {
                // Cache regardless of attachment; the next attach reuses it.
                self.cache.put(&path, Arc::clone(&bitmap));
                if let Some(surface) = self.current_surface(generation) {
                    surface.add_sample_image(bitmap);
                }
            }
            ControllerEvent::Classified { generation, results } => {
                if let Some(surface) = self.current_surface(generation) {
                    if results.is_empty() {
                        surface.show_classification_failed();
                    } else {
                        surface.set_classification_result(&results);
                    }
                }
            }
        }
    }

    /// The surface, but only when `generation` is still current and a surface
    /// is attached.
    fn current_surface(&self, generation: u64) -> Option<Arc<dyn Surface>> {
        if generation == self.generation {
            self.surface.clone()
        } else {
            None
        }
    }

    fn spawn_model_load(&self, generation: u64) {
        let engine = Arc::clone(&self.engine);
        let options = EngineOptions::for_model(self.model.model_file.clone());
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match engine.build(options).await {
                Ok(session) => ControllerEvent::ModelLoaded { generation, session },
                Err(e) => {
                    warn!(error = %e, "model load failed");
                    ControllerEvent::ModelLoadFailed { generation }
                }
            };
            let _ = events_tx.send(event);
        });
    }
}

/// The serialized queue: one worker, one item at a time, issue order.
async fn run_serial_worker(
    mut work_rx: mpsc::UnboundedReceiver<WorkItem>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
) {
    while let Some(item) = work_rx.recv().await {
        match item {
            WorkItem::LoadSample { generation, path } => {
                let decode_path = path.clone();
                let loaded =
                    tokio::task::spawn_blocking(move || bitmap::load_bitmap(&decode_path)).await;
                match loaded {
                    Ok(Ok(bitmap)) => {
                        let _ = events_tx.send(ControllerEvent::SampleLoaded {
                            generation,
                            path,
                            bitmap: Arc::new(bitmap),
                        });
                    }
                    Ok(Err(e)) => {
                        warn!(path = %path.display(), error = %e, "sample image load failed");
                    }
                    Err(e) => warn!(error = %e, "sample load task failed"),
                }
            }
            WorkItem::Classify {
                generation,
                session,
                model,
                bitmap,
            } => {
                let outcome = tokio::task::spawn_blocking(move || {
                    run_classification(session.as_ref(), &model, &bitmap)
                })
                .await;
                let results = match outcome {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(error = %e, "classification task failed");
                        Vec::new()
                    }
                };
                let _ = events_tx.send(ControllerEvent::Classified { generation, results });
            }
        }
    }
}

/// One classification: bitmap to tensor, inference, top-K over the
/// probability layer. Every failure is absorbed here and reported as an empty
/// result set; nothing propagates out of the task.
#[instrument(skip_all, fields(model = %model.name))]
fn run_classification(
    session: &dyn InferenceSession,
    model: &ModelBundle,
    bitmap: &RgbaImage,
) -> Vec<LabelScore> {
    let dims = session.input_dimensions();
    let mean = mean::load_mean_image(&model.mean_image, element_count(&dims));

    let input = match codec::encode_bitmap(bitmap, &dims, &mean) {
        Ok(tensor) => tensor,
        Err(e) => {
            warn!(error = %e, "input conversion failed");
            return Vec::new();
        }
    };

    let outputs = match session.execute(&input) {
        Ok(outputs) => outputs,
        Err(e) => {
            warn!(error = %e, "inference failed");
            return Vec::new();
        }
    };

    let Some(prob) = outputs.get(PROB_OUTPUT_LAYER) else {
        warn!(layer = PROB_OUTPUT_LAYER, "probability layer missing from outputs");
        return Vec::new();
    };

    let picks = match topk::top_k(prob.data(), CLASSIFICATION_TOP_K) {
        Ok(picks) => picks,
        Err(e) => {
            warn!(error = %e, "selection failed");
            return Vec::new();
        }
    };

    picks
        .into_iter()
        .filter_map(|pick| {
            model.labels.get(pick.index).map(|label| LabelScore {
                index: pick.index,
                label: label.clone(),
                score: pick.score,
            })
        })
        .collect()
}
