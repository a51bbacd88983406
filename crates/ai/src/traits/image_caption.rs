#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCaptionInput {
    /// local file path, `http(s)://` url or `data:` url
    pub image: String,
    pub language: String,
}

impl ImageCaptionInput {
    pub fn new(image: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            language: language.into(),
        }
    }
}

pub type ImageCaptionOutput = String;
