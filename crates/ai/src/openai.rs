use crate::{CaptionEngine, ImageCaptionInput, ImageCaptionOutput};
use anyhow::{anyhow, bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{
    header::{HeaderMap, AUTHORIZATION},
    Url,
};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

const MAX_CAPTION_TOKENS: u32 = 64;

/// Image captioning over an OpenAI compatible vision chat completion API.
pub struct OpenAICaption {
    endpoint: Url,
    model: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

impl CaptionEngine for OpenAICaption {
    async fn caption(&self, item: &ImageCaptionInput) -> anyhow::Result<ImageCaptionOutput> {
        let image_url = resolve_image_url(&item.image).await?;

        tracing::debug!("requesting caption for {} from {}", item.image, self.endpoint);

        let body = json!({
            "model": &self.model,
            "max_tokens": MAX_CAPTION_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": caption_prompt(&item.language) },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }]
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("caption request failed with {}: {}", status, text);
        }

        let response: ChatCompletionResponse = response.json().await?;
        extract_caption(response)
    }
}

impl OpenAICaption {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> anyhow::Result<Self> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let endpoint = Url::parse(&base_url)?.join("chat/completions")?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", api_key).parse()?);

        Ok(Self {
            endpoint,
            model: model.to_string(),
            headers,
            client: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn caption_prompt(language: &str) -> String {
    format!(
        "Describe this image in one short sentence, written in {}. Reply with the sentence only.",
        language
    )
}

fn extract_caption(response: ChatCompletionResponse) -> anyhow::Result<ImageCaptionOutput> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|v| v.message.content)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("empty caption in response"))
}

/// Remote and inline images are passed through, local files are inlined as
/// base64 data urls.
async fn resolve_image_url(image: &str) -> anyhow::Result<String> {
    if image.starts_with("http://") || image.starts_with("https://") || image.starts_with("data:")
    {
        return Ok(image.to_string());
    }

    let path = Path::new(image);
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Ok(format!(
        "data:{};base64,{}",
        mime.essence_str(),
        STANDARD.encode(data)
    ))
}
