//! Streaming API: receive progress as a `Stream` instead of a callback.
//!
//! [`AudiobookPipeline::submit_stream`] runs the request on a spawned task
//! and yields every [`ProgressEvent`] as it happens, then exactly one
//! terminal item: [`PipelineUpdate::Complete`] with the finished audio or
//! [`PipelineUpdate::Failed`] with the error message. The stream ends after
//! the terminal item.

use crate::orchestrator::AudiobookPipeline;
use crate::output::AudiobookOutput;
use crate::progress::ProgressEvent;
use crate::request::AudiobookRequest;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// One item of a [`PipelineStream`].
#[derive(Debug, Clone)]
pub enum PipelineUpdate {
    Progress(ProgressEvent),
    Complete(Box<AudiobookOutput>),
    Failed(String),
}

impl PipelineUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineUpdate::Progress(_))
    }
}

/// A boxed stream of pipeline updates.
pub type PipelineStream = Pin<Box<dyn Stream<Item = PipelineUpdate> + Send>>;

impl AudiobookPipeline {
    /// Run `request` in the background, streaming its progress.
    ///
    /// Must be called from within a tokio runtime. Dropping the stream does
    /// not stop the run.
    ///
    /// # Example
    /// ```rust,no_run
    /// use edgequake_pdf2audio::{AudiobookPipeline, AudiobookRequest, PipelineUpdate};
    /// use futures::StreamExt;
    /// use std::sync::Arc;
    ///
    /// # async fn run(pipeline: Arc<AudiobookPipeline>, request: AudiobookRequest) {
    /// let mut updates = pipeline.submit_stream(request);
    /// while let Some(update) = updates.next().await {
    ///     match update {
    ///         PipelineUpdate::Progress(e) => eprintln!("{:>5.1}% {}", e.percent_complete, e.message),
    ///         PipelineUpdate::Complete(out) => println!("{} bytes of WAV", out.audio.len()),
    ///         PipelineUpdate::Failed(msg) => eprintln!("failed: {msg}"),
    ///     }
    /// }
    /// # }
    /// ```
    pub fn submit_stream(self: Arc<Self>, request: AudiobookRequest) -> PipelineStream {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let forward = move |event: &ProgressEvent| {
                // A dropped receiver just means nobody is listening any more.
                let _ = progress_tx.send(PipelineUpdate::Progress(event.clone()));
            };

            let terminal = match self.submit_with(request, &forward, None).await {
                Ok(output) => PipelineUpdate::Complete(Box::new(output)),
                Err(e) => PipelineUpdate::Failed(e.to_string()),
            };
            if tx.send(terminal).is_err() {
                debug!("Pipeline stream dropped before the run finished");
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }
}
