use std::fmt::Display;
use strum_macros::AsRefStr;
use tokio::sync::mpsc;

#[derive(AsRefStr, Clone, Debug, PartialEq, Eq)]
pub enum CaptionStatus {
    Queued,
    /// first request of a cold start, the model is still being built
    LoadingModel,
    Generating,
    Captioned(String),
    Failed(String),
}

impl CaptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Captioned(_) | Self::Failed(_))
    }
}

impl Display for CaptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "⏳ Loading description..."),
            Self::LoadingModel => write!(f, "⏳ Loading AI model (30-60s)..."),
            Self::Generating => write!(f, "⏳ Generating description..."),
            Self::Captioned(caption) => write!(f, "✅ {}", caption),
            Self::Failed(message) => write!(f, "❌ Failed: {}", message),
        }
    }
}

/// Receiver of the status updates of one caption request.
pub trait StatusSink: Send + Sync {
    fn set_status(&self, status: CaptionStatus);
}

impl StatusSink for mpsc::UnboundedSender<CaptionStatus> {
    fn set_status(&self, status: CaptionStatus) {
        if self.send(status).is_err() {
            tracing::debug!("status receiver dropped, ignore status");
        }
    }
}
