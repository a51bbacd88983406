use crate::StatusSink;
use ai::ImageCaptionInput;
use std::{
    fmt::{self, Debug},
    sync::Arc,
};
use tokio::time::Instant;

pub(crate) struct CaptionTask {
    pub sink: Arc<dyn StatusSink>,
    pub image: String,
    pub language: String,
    pub(crate) queued_at: Instant,
}

impl Debug for CaptionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionTask")
            .field("image", &self.image)
            .field("language", &self.language)
            .field("queued_at", &self.queued_at)
            .finish()
    }
}

impl CaptionTask {
    pub(crate) fn new(
        sink: Arc<dyn StatusSink>,
        image: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            image: image.into(),
            language: language.into(),
            queued_at: Instant::now(),
        }
    }

    pub(crate) fn to_input(&self) -> ImageCaptionInput {
        ImageCaptionInput::new(self.image.clone(), self.language.clone())
    }
}
