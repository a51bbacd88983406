mod image_caption;

pub use image_caption::*;

use futures::future::join_all;
use std::future::Future;

/// A captioning backend. It is built once by [`crate::ModelLoader`] and then
/// shared by reference across every concurrent request.
pub trait CaptionEngine: Send + Sync + 'static {
    fn caption(
        &self,
        item: &ImageCaptionInput,
    ) -> impl Future<Output = anyhow::Result<ImageCaptionOutput>> + Send;

    /// Caption a whole batch. The outer error fails the batch as a whole, the
    /// inner results line up with `items` by position.
    ///
    /// By default every item is captioned concurrently with [`Self::caption`].
    fn caption_many(
        &self,
        items: Vec<ImageCaptionInput>,
    ) -> impl Future<Output = anyhow::Result<Vec<anyhow::Result<ImageCaptionOutput>>>> + Send {
        async move {
            let mut pending = Vec::with_capacity(items.len());
            for item in &items {
                pending.push(self.caption(item));
            }

            Ok(join_all(pending).await)
        }
    }
}
