//! Speech Gateway (spec §4.4): audio bytes in, transcript text out.

use async_trait::async_trait;

/// Accepted audio container extensions (spec §4.4).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "mp4", "m4a", "wav", "webm", "ogg", "oga"];

/// Maximum accepted upload size: 25 MB (spec §4.4, §5).
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),
    #[error("speech transport error: {0}")]
    Transport(String),
}

/// ISO 639-1 language hint. Two the gateway cares about; WhatsApp voice
/// stays out of scope entirely per spec §9 Open Question (a).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageHint {
    Ar,
    En,
}

impl LanguageHint {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ar => "ar",
            Self::En => "en",
        }
    }

    pub fn from_str_code(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "ar" => Some(Self::Ar),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
}

/// Validate extension and size before any network call is made, per spec
/// §4.4 and the boundary-behavior property in spec §8 ("25 MB + 1 byte").
pub fn validate_audio(filename: &str, size_bytes: usize) -> Result<(), SpeechError> {
    let ext = extension_of(filename)
        .ok_or_else(|| SpeechError::UnsupportedMedia(format!("no extension in '{filename}'")))?;
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(SpeechError::UnsupportedMedia(format!(
            "extension '.{ext}' is not supported"
        )));
    }
    if size_bytes > MAX_AUDIO_BYTES {
        return Err(SpeechError::UnsupportedMedia(format!(
            "audio file of {size_bytes} bytes exceeds the 25MB limit"
        )));
    }
    Ok(())
}

#[async_trait]
pub trait SpeechGateway: Send + Sync {
    async fn transcribe(
        &self,
        audio_bytes: Vec<u8>,
        filename: &str,
        language: Option<LanguageHint>,
    ) -> Result<String, SpeechError>;
}

/// `reqwest`-based implementation targeting an OpenAI-compatible
/// audio-transcriptions endpoint.
pub struct HttpSpeechGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpSpeechGateway {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SpeechGateway for HttpSpeechGateway {
    async fn transcribe(
        &self,
        audio_bytes: Vec<u8>,
        filename: &str,
        language: Option<LanguageHint>,
    ) -> Result<String, SpeechError> {
        validate_audio(filename, audio_bytes.len())?;

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio_bytes).file_name(filename.to_string()),
            )
            .text("model", "whisper-1");
        if let Some(lang) = language {
            form = form.text("language", lang.as_str());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(60))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Transport(format!(
                "http status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SpeechError::Transport(e.to_string()))?;
        Ok(body["text"].as_str().unwrap_or_default().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_extension() {
        let result = validate_audio("note.txt", 1024);
        assert!(matches!(result, Err(SpeechError::UnsupportedMedia(_))));
    }

    #[test]
    fn accepts_supported_extensions() {
        for ext in SUPPORTED_EXTENSIONS {
            let name = format!("clip.{ext}");
            assert!(validate_audio(&name, 1024).is_ok());
        }
    }

    #[test]
    fn rejects_25mb_plus_one_byte() {
        let result = validate_audio("clip.ogg", MAX_AUDIO_BYTES + 1);
        assert!(matches!(result, Err(SpeechError::UnsupportedMedia(_))));
    }

    #[test]
    fn accepts_exactly_25mb() {
        assert!(validate_audio("clip.ogg", MAX_AUDIO_BYTES).is_ok());
    }
}
