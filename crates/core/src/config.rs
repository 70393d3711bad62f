use crate::analysis::ImageDetail;
use crate::capture::bridge::{DEFAULT_FRAME_TIMEOUT, DEFAULT_MAX_FRAME_RATE};
use crate::error::{AppError, Result};
use crate::image_processing::DEFAULT_JPEG_QUALITY;
use crate::selection::DEFAULT_SETTLE_DELAY;
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which vision chat service answers queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Provider {
    /// OpenAI-compatible `/chat/completions` endpoint.
    #[default]
    OpenAi,
    /// Google Gemini generate-content API.
    Gemini,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Gemini => "gemini-flash-latest",
        }
    }

    /// Provider-specific variable consulted when `GLANCE_API_KEY` is unset.
    fn key_var(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            other => Err(AppError::config(format!(
                "Unknown provider '{}', expected 'openai' or 'gemini'",
                other
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        })
    }
}

#[derive(Clone, PartialEq)]
pub struct Config {
    pub provider: Provider,
    /// May be empty; the remote service then rejects requests.
    pub api_key: String,
    pub model_name: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub jpeg_quality: f32,
    pub image_detail: ImageDetail,
    pub settle_delay: Duration,
    pub max_frame_rate: u32,
    pub frame_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("api_key", &if self.api_key.is_empty() { "<empty>" } else { "<set>" })
            .field("model_name", &self.model_name)
            .field("base_url", &self.base_url)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("image_detail", &self.image_detail)
            .field("settle_delay", &self.settle_delay)
            .field("max_frame_rate", &self.max_frame_rate)
            .field("frame_timeout", &self.frame_timeout)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_key: String::new(),
            model_name: Provider::default().default_model().to_string(),
            base_url: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            image_detail: ImageDetail::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_frame_rate: DEFAULT_MAX_FRAME_RATE,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Builds a config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(provider) = var("GLANCE_PROVIDER") {
            builder = builder.with_provider(provider.parse()?);
        }
        let provider = builder.provider;

        if let Some(key) = var("GLANCE_API_KEY").or_else(|| var(provider.key_var())) {
            builder = builder.with_api_key(key);
        }
        if let Some(model) = var("GLANCE_MODEL") {
            builder = builder.with_model(model);
        }
        if let Some(url) = var("GLANCE_BASE_URL") {
            builder = builder.with_base_url(url);
        }
        if let Some(quality) = var("GLANCE_JPEG_QUALITY") {
            builder = builder.with_jpeg_quality(parse_number("GLANCE_JPEG_QUALITY", &quality)?);
        }
        if let Some(detail) = var("GLANCE_IMAGE_DETAIL") {
            builder = builder.with_image_detail(detail.parse()?);
        }
        if let Some(ms) = var("GLANCE_SETTLE_MS") {
            let ms = parse_number("GLANCE_SETTLE_MS", &ms)?;
            builder = builder.with_settle_delay(Duration::from_millis(ms));
        }
        if let Some(fps) = var("GLANCE_MAX_FPS") {
            builder = builder.with_max_frame_rate(parse_number("GLANCE_MAX_FPS", &fps)?);
        }
        if let Some(ms) = var("GLANCE_FRAME_TIMEOUT_MS") {
            let ms = parse_number("GLANCE_FRAME_TIMEOUT_MS", &ms)?;
            builder = builder.with_frame_timeout(Duration::from_millis(ms));
        }

        builder.build()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::config(format!("{} has an invalid value '{}'", key, value)))
}

/// Builder for [`Config`]; unset fields take provider defaults.
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    provider: Provider,
    api_key: Option<String>,
    model_name: Option<String>,
    base_url: Option<String>,
    jpeg_quality: Option<f32>,
    image_detail: Option<ImageDetail>,
    settle_delay: Option<Duration>,
    max_frame_rate: Option<u32>,
    frame_timeout: Option<Duration>,
}

impl ConfigBuilder {
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_jpeg_quality(mut self, quality: f32) -> Self {
        self.jpeg_quality = Some(quality);
        self
    }

    pub fn with_image_detail(mut self, detail: ImageDetail) -> Self {
        self.image_detail = Some(detail);
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    pub fn with_max_frame_rate(mut self, fps: u32) -> Self {
        self.max_frame_rate = Some(fps);
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = Some(timeout);
        self
    }

    /// Validates and assembles the config.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] for a quality outside `0.0..=1.0`, a zero
    /// frame rate or a zero frame timeout.
    pub fn build(self) -> Result<Config> {
        let jpeg_quality = self.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY);
        if !(0.0..=1.0).contains(&jpeg_quality) {
            return Err(AppError::config(format!(
                "JPEG quality must be between 0.0 and 1.0, got {}",
                jpeg_quality
            )));
        }

        let max_frame_rate = self.max_frame_rate.unwrap_or(DEFAULT_MAX_FRAME_RATE);
        if max_frame_rate == 0 {
            return Err(AppError::config("Frame rate ceiling must be at least 1"));
        }

        let frame_timeout = self.frame_timeout.unwrap_or(DEFAULT_FRAME_TIMEOUT);
        if frame_timeout.is_zero() {
            return Err(AppError::config("Frame timeout must be greater than zero"));
        }

        Ok(Config {
            provider: self.provider,
            api_key: self.api_key.unwrap_or_default(),
            model_name: self
                .model_name
                .unwrap_or_else(|| self.provider.default_model().to_string()),
            base_url: self.base_url,
            jpeg_quality,
            image_detail: self.image_detail.unwrap_or_default(),
            settle_delay: self.settle_delay.unwrap_or(DEFAULT_SETTLE_DELAY),
            max_frame_rate,
            frame_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model_name, "gpt-4o");
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn provider_picks_its_key_and_model() {
        let config = from_pairs(&[
            ("GLANCE_PROVIDER", "Gemini"),
            ("OPENAI_API_KEY", "sk-wrong"),
            ("GEMINI_API_KEY", "g-key"),
        ])
        .unwrap();

        assert_eq!(config.provider, Provider::Gemini);
        assert_eq!(config.api_key, "g-key");
        assert_eq!(config.model_name, "gemini-flash-latest");
    }

    #[test]
    fn generic_key_and_overrides_win() {
        let config = from_pairs(&[
            ("GLANCE_API_KEY", "generic"),
            ("OPENAI_API_KEY", "specific"),
            ("GLANCE_MODEL", "gpt-4o-mini"),
            ("GLANCE_SETTLE_MS", "250"),
            ("GLANCE_JPEG_QUALITY", "0.5"),
            ("GLANCE_IMAGE_DETAIL", "high"),
        ])
        .unwrap();

        assert_eq!(config.api_key, "generic");
        assert_eq!(config.model_name, "gpt-4o-mini");
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.jpeg_quality, 0.5);
        assert_eq!(config.image_detail, ImageDetail::High);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for pairs in [
            [("GLANCE_PROVIDER", "claude")],
            [("GLANCE_JPEG_QUALITY", "1.5")],
            [("GLANCE_MAX_FPS", "0")],
            [("GLANCE_SETTLE_MS", "soon")],
            [("GLANCE_IMAGE_DETAIL", "max")],
        ] {
            assert!(matches!(from_pairs(&pairs), Err(AppError::Config(_))), "{:?}", pairs);
        }
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = Config::builder().with_api_key("sk-secret").build().unwrap();
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }
}
