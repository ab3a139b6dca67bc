//! Speech agent: transcription in, synthesized audio out.

use super::http::AgentHttpClient;
use super::AgentClient;
use crate::config::SpeechConfig;
use crate::error::AgentError;
use crate::models::{
    AgentHealth, AgentParameters, AgentPayload, AgentRequest, AudioClip, Capability,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub struct HttpSpeechAgent {
    http: AgentHttpClient,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    transcription: String,
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct VoiceResponse {
    #[serde(default)]
    audio_data: String,
}

impl HttpSpeechAgent {
    pub fn new(config: &SpeechConfig, timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self {
            http: AgentHttpClient::new(&config.base_url, None, timeout)?,
        })
    }

    async fn transcribe(&self, audio_base64: &str) -> Result<String, AgentError> {
        if audio_base64.trim().is_empty() {
            return Err(AgentError::InvalidRequest("audio payload is empty".to_string()));
        }

        let response: TranscriptionResponse = self
            .http
            .post_json("/speech-to-text", &json!({ "audio_data": audio_base64 }))
            .await?;

        let transcript = response.transcription.trim();
        if !response.success || transcript.is_empty() {
            return Err(AgentError::Malformed(
                response
                    .error
                    .unwrap_or_else(|| "no speech recognized".to_string()),
            ));
        }

        Ok(transcript.to_string())
    }

    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioClip, AgentError> {
        let cleaned = clean_text_for_tts(text);
        if cleaned.is_empty() {
            return Err(AgentError::InvalidRequest("nothing to synthesize".to_string()));
        }

        let response: VoiceResponse = self
            .http
            .post_json(
                "/voice-response",
                &json!({ "text": cleaned, "language": language }),
            )
            .await?;

        if response.audio_data.is_empty() {
            return Err(AgentError::Malformed("voice response carried no audio".to_string()));
        }

        Ok(AudioClip {
            format: "mp3".to_string(),
            data_base64: response.audio_data,
        })
    }
}

#[async_trait::async_trait]
impl AgentClient for HttpSpeechAgent {
    fn capability(&self) -> Capability {
        Capability::Speech
    }

    fn name(&self) -> &str {
        "voice"
    }

    async fn call(&self, request: &AgentRequest) -> Result<AgentPayload, AgentError> {
        match &request.parameters {
            AgentParameters::SpeechToText { audio_base64 } => {
                self.transcribe(audio_base64).await.map(AgentPayload::Transcript)
            }
            AgentParameters::TextToSpeech { text, language } => {
                self.synthesize(text, language).await.map(AgentPayload::Audio)
            }
            _ => Err(AgentError::InvalidRequest(
                "speech agent expects speech parameters".to_string(),
            )),
        }
    }

    async fn health(&self) -> AgentHealth {
        self.http.probe().await
    }
}

/// Make narrated text speakable: drop markdown emphasis and spell out symbols.
pub fn clean_text_for_tts(text: &str) -> String {
    let text = text
        .replace('*', "")
        .replace('%', " percent")
        .replace('$', " dollars")
        .replace('&', " and");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
