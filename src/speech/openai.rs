//! OpenAI text-to-speech implementation.

use super::{split_sentences, SpeechSynthesizer, SynthesizedAudio, TimedSegment, Voice, VoiceSelection};
use crate::config::SpeechSettings;
use crate::error::{PosterError, Result};
use crate::ffmpeg;
use crate::generation::Script;
use crate::openai::create_client;
use async_openai::types::{
    CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice as ApiVoice,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Sentence-by-sentence synthesizer backed by the speech endpoint.
pub struct OpenAISynthesizer {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: SpeechModel,
    voice: VoiceSelection,
}

impl OpenAISynthesizer {
    pub fn new(settings: &SpeechSettings) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: speech_model(&settings.model),
            voice: VoiceSelection::from_setting(&settings.voice),
        })
    }

    async fn synthesize_sentence(&self, text: &str, voice: Voice, dest: &Path) -> Result<f64> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(self.model.clone())
            .voice(api_voice(voice))
            .response_format(SpeechResponseFormat::Mp3)
            .build()
            .map_err(|e| PosterError::Synthesis(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| PosterError::Synthesis(format!("Speech API error: {}", e)))?;

        tokio::fs::write(dest, &response.bytes)
            .await
            .map_err(|e| io_failure("write", dest, e))?;

        let duration = ffmpeg::probe_duration(dest)
            .await
            .map_err(|e| PosterError::Synthesis(e.to_string()))?;

        if duration <= 0.0 {
            return Err(PosterError::Synthesis(format!(
                "Synthesized audio has no duration: {}",
                dest.display()
            )));
        }

        Ok(duration)
    }
}

fn io_failure(action: &str, path: &Path, error: std::io::Error) -> PosterError {
    PosterError::Synthesis(format!("Failed to {} {}: {}", action, path.display(), error))
}

fn speech_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn api_voice(voice: Voice) -> ApiVoice {
    match voice {
        Voice::Alloy => ApiVoice::Alloy,
        Voice::Echo => ApiVoice::Echo,
        Voice::Fable => ApiVoice::Fable,
        Voice::Onyx => ApiVoice::Onyx,
        Voice::Nova => ApiVoice::Nova,
        Voice::Shimmer => ApiVoice::Shimmer,
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISynthesizer {
    #[instrument(skip(self, script), fields(output_dir = %output_dir.display()))]
    async fn generate_audio(&self, script: &Script, output_dir: &Path) -> Result<SynthesizedAudio> {
        let sentences = split_sentences(&script.text);
        if sentences.is_empty() {
            return Err(PosterError::Synthesis(
                "Script contains no sentences to narrate".to_string(),
            ));
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| io_failure("create", output_dir, e))?;

        let voice = self.voice.pick();
        info!("Narrating {} sentences with voice {}", sentences.len(), voice);

        let mut segments = Vec::with_capacity(sentences.len());
        for (i, sentence) in sentences.into_iter().enumerate() {
            let audio_path = output_dir.join(format!("audio_{}.mp3", i));
            let duration = self.synthesize_sentence(&sentence, voice, &audio_path).await?;
            debug!("Sentence {} is {:.2}s", i, duration);
            segments.push(TimedSegment {
                text: sentence,
                duration,
                audio_path,
            });
        }

        let parts: Vec<PathBuf> = segments.iter().map(|s| s.audio_path.clone()).collect();
        let combined_path = output_dir.join("combined.wav");
        ffmpeg::concat_audio(&parts, &combined_path)
            .await
            .map_err(|e| PosterError::Synthesis(format!("Failed to join audio: {}", e)))?;

        let audio = SynthesizedAudio {
            segments,
            combined_path,
            voice,
        };
        info!("Narration is {:.1}s", audio.total_duration());
        Ok(audio)
    }
}
