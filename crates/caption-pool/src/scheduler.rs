use crate::{payload::CaptionTask, BatchConfig, CaptionStatus, StatusSink};
use ai::{CaptionEngine, ModelError, ModelLoader};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{self, Instant},
};
use tracing::{debug, error, info};

/// Collects caption requests that arrive close to each other and captions
/// them as one parallel batch on the shared model.
///
/// Every new request pushes the flush back by the batch delay, so a burst is
/// only processed once it goes quiet (or once `max_wait` is reached, if set).
/// Flushes run one after another on a single driver task.
pub struct BatchScheduler<E>
where
    E: CaptionEngine,
{
    loader: Arc<ModelLoader<E>>,
    default_language: String,
    tx: mpsc::UnboundedSender<CaptionTask>,
    queue_size: Arc<AtomicUsize>,
}

impl<E> Clone for BatchScheduler<E>
where
    E: CaptionEngine,
{
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            default_language: self.default_language.clone(),
            tx: self.tx.clone(),
            queue_size: self.queue_size.clone(),
        }
    }
}

impl<E> BatchScheduler<E>
where
    E: CaptionEngine,
{
    /// Create a scheduler and spawn its driver onto the current tokio runtime.
    /// When the last clone is dropped, pending tasks are flushed and the
    /// driver stops.
    pub fn new(loader: Arc<ModelLoader<E>>, config: BatchConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue_size = Arc::new(AtomicUsize::new(0));

        let driver = BatchDriver {
            loader: loader.clone(),
            rx,
            queue_size: queue_size.clone(),
            delay: config.batch_delay(),
            max_wait: config.max_wait(),
        };
        tokio::spawn(driver.run());

        Self {
            loader,
            default_language: config.default_language,
            tx,
            queue_size,
        }
    }

    /// Queue one image. Never waits: the sink immediately gets a queued
    /// status and the caption arrives later through the same sink.
    pub fn add_task(
        &self,
        sink: Arc<dyn StatusSink>,
        image: impl Into<String>,
        language: Option<&str>,
    ) {
        let language = language.unwrap_or(self.default_language.as_str());

        let first_in_window = self.queue_size.fetch_add(1, Ordering::SeqCst) == 0;
        if first_in_window && !self.loader.is_loaded() {
            sink.set_status(CaptionStatus::LoadingModel);
        } else {
            sink.set_status(CaptionStatus::Queued);
        }

        let task = CaptionTask::new(sink, image, language);
        debug!("caption task queued: {} ({})", task.image, task.language);

        if let Err(mpsc::error::SendError(task)) = self.tx.send(task) {
            self.queue_size.fetch_sub(1, Ordering::SeqCst);
            error!("batch driver stopped, drop task {}", task.image);
            task.sink
                .set_status(CaptionStatus::Failed("caption scheduler stopped".to_string()));
        }
    }

    /// Number of tasks waiting for the next flush.
    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::SeqCst)
    }

    pub fn loader(&self) -> &Arc<ModelLoader<E>> {
        &self.loader
    }
}

struct BatchDriver<E>
where
    E: CaptionEngine,
{
    loader: Arc<ModelLoader<E>>,
    rx: mpsc::UnboundedReceiver<CaptionTask>,
    queue_size: Arc<AtomicUsize>,
    delay: Duration,
    max_wait: Option<Duration>,
}

impl<E> BatchDriver<E>
where
    E: CaptionEngine,
{
    async fn run(self) {
        let BatchDriver {
            loader,
            mut rx,
            queue_size,
            delay,
            max_wait,
        } = self;

        let mut pending: Vec<CaptionTask> = vec![];

        loop {
            let deadline = flush_deadline(&pending, delay, max_wait);

            tokio::select! {
                biased;

                task = rx.recv() => {
                    match task {
                        Some(task) => pending.push(task),
                        None => {
                            // all schedulers dropped
                            if !pending.is_empty() {
                                debug!("scheduler dropped, flush {} pending tasks", pending.len());
                            }
                            let tasks = take_snapshot(&mut pending, &queue_size);
                            flush(&loader, tasks).await;
                            break;
                        }
                    }
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let tasks = take_snapshot(&mut pending, &queue_size);
                    flush(&loader, tasks).await;
                }
            }
        }
    }
}

fn flush_deadline(
    pending: &[CaptionTask],
    delay: Duration,
    max_wait: Option<Duration>,
) -> Option<Instant> {
    let last = pending.iter().map(|v| v.queued_at).max()?;
    let debounced = last + delay;

    match max_wait {
        Some(max_wait) => {
            let first = pending.iter().map(|v| v.queued_at).min()?;
            Some(debounced.min(first + max_wait))
        }
        None => Some(debounced),
    }
}

fn per_image(elapsed: Duration, total: usize) -> Duration {
    if total == 0 {
        return Duration::ZERO;
    }
    elapsed.div_f64(total as f64)
}

/// Tasks queued from here on belong to the next batch.
fn take_snapshot(pending: &mut Vec<CaptionTask>, queue_size: &AtomicUsize) -> Vec<CaptionTask> {
    let tasks = std::mem::take(pending);
    queue_size.fetch_sub(tasks.len(), Ordering::SeqCst);
    tasks
}

#[tracing::instrument(name = "BatchScheduler::flush", skip_all, fields(tasks = tasks.len()))]
async fn flush<E>(loader: &ModelLoader<E>, tasks: Vec<CaptionTask>)
where
    E: CaptionEngine,
{
    if tasks.is_empty() {
        return;
    }

    let total = tasks.len();
    info!(
        "processing {} images in parallel with {}",
        total,
        loader.model_id()
    );
    let start = Instant::now();

    let cold_start = !loader.is_loaded();
    for (idx, task) in tasks.iter().enumerate() {
        if idx == 0 && cold_start {
            task.sink.set_status(CaptionStatus::LoadingModel);
        } else {
            task.sink.set_status(CaptionStatus::Generating);
        }
    }

    let items = tasks.iter().map(CaptionTask::to_input).collect();

    match loader.caption_many(items).await {
        Ok(results) => {
            let mut results = results.into_iter();
            let mut failed = 0;

            // results are matched by position, not by completion order
            for task in &tasks {
                let status = match results.next() {
                    Some(Ok(caption)) => CaptionStatus::Captioned(caption),
                    Some(Err(e)) => {
                        failed += 1;
                        CaptionStatus::Failed(e.to_string())
                    }
                    None => {
                        failed += 1;
                        CaptionStatus::Failed(ModelError::MissingResult.to_string())
                    }
                };
                task.sink.set_status(status);
            }

            let elapsed = start.elapsed();
            info!(
                "processed {} images in {:.2?} ({:.2?} per image), {} failed",
                total,
                elapsed,
                per_image(elapsed, total),
                failed
            );
        }
        Err(e) => {
            error!("batch processing with {} failed: {}", loader.model_id(), e);

            let message = e.to_string();
            for task in &tasks {
                task.sink.set_status(CaptionStatus::Failed(message.clone()));
            }
        }
    }
}
