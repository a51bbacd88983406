use caption_pool::{CaptionStatus, StatusSink};
use tokio::sync::mpsc;

/// Logs every status of one image and forwards it, tagged with the image
/// index, to the collecting loop in `main`.
pub struct ImageSink {
    index: usize,
    image: String,
    tx: mpsc::UnboundedSender<(usize, CaptionStatus)>,
}

impl ImageSink {
    pub fn new(
        index: usize,
        image: impl Into<String>,
        tx: mpsc::UnboundedSender<(usize, CaptionStatus)>,
    ) -> Self {
        Self {
            index,
            image: image.into(),
            tx,
        }
    }
}

impl StatusSink for ImageSink {
    fn set_status(&self, status: CaptionStatus) {
        tracing::info!("[{}] {}", self.image, status);

        if self.tx.send((self.index, status)).is_err() {
            tracing::debug!("collector stopped, status of {} dropped", self.image);
        }
    }
}
