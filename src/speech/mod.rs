//! Speech synthesis: script sentences to timed audio segments.
//!
//! The ordered segment list returned here is the timeline the video composer
//! builds on. Index `i` of the audio always pairs with index `i` of the images.

mod openai;

pub use openai::OpenAISynthesizer;

use crate::error::Result;
use crate::generation::Script;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Trailing fragments shorter than this, with no closing punctuation, are dropped.
const MIN_TRAILING_FRAGMENT_CHARS: usize = 10;

/// One narrated sentence and the length of its audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSegment {
    pub text: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Per-sentence audio file.
    pub audio_path: PathBuf,
}

/// Result of synthesizing a whole script.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Segments in narration order.
    pub segments: Vec<TimedSegment>,
    /// All segment audio joined in order.
    pub combined_path: PathBuf,
    pub voice: Voice,
}

impl SynthesizedAudio {
    pub fn durations(&self) -> Vec<f64> {
        self.segments.iter().map(|s| s.duration).collect()
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// Available narration voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Alloy,
        Voice::Echo,
        Voice::Fable,
        Voice::Onyx,
        Voice::Nova,
        Voice::Shimmer,
    ];
}

impl std::str::FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            _ => Err(format!("Unknown voice: {}", s)),
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        };
        write!(f, "{}", name)
    }
}

/// Fixed voice or a fresh random pick for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSelection {
    Fixed(Voice),
    Random,
}

impl VoiceSelection {
    /// Parse a configured voice name. Unknown names fall back to random.
    pub fn from_setting(value: &str) -> Self {
        if value.eq_ignore_ascii_case("random") {
            return VoiceSelection::Random;
        }
        match value.parse() {
            Ok(voice) => VoiceSelection::Fixed(voice),
            Err(_) => {
                warn!("Unknown voice '{}', using random", value);
                VoiceSelection::Random
            }
        }
    }

    pub fn pick(&self) -> Voice {
        match self {
            VoiceSelection::Fixed(voice) => *voice,
            VoiceSelection::Random => *Voice::ALL
                .choose(&mut rand::thread_rng())
                .unwrap_or(&Voice::Alloy),
        }
    }
}

/// Converts a script into timed audio segments.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize every sentence into `output_dir` and join them.
    ///
    /// Any sentence failing fails the whole call.
    async fn generate_audio(&self, script: &Script, output_dir: &Path) -> Result<SynthesizedAudio>;
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | '\u{201D}' | '\u{2019}' | ')')
}

/// Split narration into sentences on `.`, `!` and `?`.
///
/// Punctuation is kept. A boundary needs whitespace (or the end of text) after
/// the terminator, optionally behind a closing quote, so decimals like `3.5`
/// stay intact. A short unterminated trailing fragment is dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.replace(['\n', '\r'], " ");
    let chars: Vec<char> = normalized.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);

        let next = chars.get(i + 1).copied();
        let at_gap = next.map_or(true, char::is_whitespace);
        let ends_here = at_gap
            && (is_terminator(c)
                || (is_closer(c) && i > 0 && is_terminator(chars[i - 1])));

        if ends_here {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let tail = current.trim();
    if !tail.is_empty() && tail.chars().count() >= MIN_TRAILING_FRAGMENT_CHARS {
        sentences.push(tail.to_string());
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("It was late. The radio hissed!\nWho's there? Nobody.");
        assert_eq!(
            sentences,
            vec!["It was late.", "The radio hissed!", "Who's there?", "Nobody."]
        );
    }

    #[test]
    fn test_split_keeps_decimals_and_quotes() {
        let sentences = split_sentences("It made 2.5 liters sound huge. He said \"stop.\" Then it left.");
        assert_eq!(
            sentences,
            vec!["It made 2.5 liters sound huge.", "He said \"stop.\"", "Then it left."]
        );
    }

    #[test]
    fn test_split_drops_short_trailing_fragment() {
        assert_eq!(split_sentences("A full sentence here. And"), vec!["A full sentence here."]);
        assert_eq!(
            split_sentences("A full sentence here. And then it kept going"),
            vec!["A full sentence here.", "And then it kept going"]
        );
    }

    #[test]
    fn test_split_ellipsis_is_one_boundary() {
        assert_eq!(split_sentences("Wait... Listen."), vec!["Wait...", "Listen."]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_sentences("   \n ").is_empty());
    }

    #[test]
    fn test_voice_selection() {
        assert_eq!(VoiceSelection::from_setting("nova"), VoiceSelection::Fixed(Voice::Nova));
        assert_eq!(VoiceSelection::from_setting("RANDOM"), VoiceSelection::Random);
        assert_eq!(VoiceSelection::from_setting("bogus"), VoiceSelection::Random);
        assert_eq!(VoiceSelection::Fixed(Voice::Onyx).pick(), Voice::Onyx);
        assert!(Voice::ALL.contains(&VoiceSelection::Random.pick()));
    }

    #[test]
    fn test_total_duration_sums_segments() {
        let audio = SynthesizedAudio {
            segments: vec![
                TimedSegment { text: "a".into(), duration: 1.25, audio_path: "a.mp3".into() },
                TimedSegment { text: "b".into(), duration: 2.5, audio_path: "b.mp3".into() },
            ],
            combined_path: "combined.wav".into(),
            voice: Voice::Alloy,
        };
        assert_eq!(audio.durations(), vec![1.25, 2.5]);
        assert!((audio.total_duration() - 3.75).abs() < f64::EPSILON);
    }
}
