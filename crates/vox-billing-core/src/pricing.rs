//! Pricing configuration and the credit estimator.
//!
//! Usage is priced per unit of input: characters of text for TTS, seconds
//! of audio for STT. The estimate is the single place fractional credits
//! are rounded, always upward, so metering never undercharges.

use serde::{Deserialize, Serialize};

/// Default TTS rate: credits per character of input text.
pub const DEFAULT_TTS_CREDITS_PER_CHAR: f64 = 0.01;

/// Default STT rate: credits per second of input audio.
pub const DEFAULT_STT_CREDITS_PER_SECOND: f64 = 8.3;

/// A billable speech modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Text to speech, priced per character of input text.
    Tts,

    /// Speech to text, priced per second of input audio.
    Stt,
}

impl Modality {
    /// Uppercase wire name ("TTS" / "STT").
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tts => "TTS",
            Self::Stt => "STT",
        }
    }

    /// Unit label for the input size, used in transaction descriptions.
    #[must_use]
    pub const fn input_unit(&self) -> &'static str {
        match self {
            Self::Tts => "chars",
            Self::Stt => "seconds",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pricing configuration for billable usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Credits charged per character of TTS input.
    pub tts_credits_per_char: f64,

    /// Credits charged per second of STT audio.
    pub stt_credits_per_second: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tts_credits_per_char: DEFAULT_TTS_CREDITS_PER_CHAR,
            stt_credits_per_second: DEFAULT_STT_CREDITS_PER_SECOND,
        }
    }
}

impl PricingConfig {
    /// Estimate the credit cost for a unit of usage.
    ///
    /// `input_size` is characters for TTS and seconds for STT. Zero,
    /// negative, and non-finite sizes cost nothing; anything billable is
    /// rounded up to the next whole credit.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn estimate(&self, modality: Modality, input_size: f64) -> i64 {
        if !input_size.is_finite() || input_size <= 0.0 {
            return 0;
        }

        let raw = match modality {
            Modality::Tts => input_size * self.tts_credits_per_char,
            Modality::Stt => input_size * self.stt_credits_per_second,
        };

        // Round up so fractional credits are never given away.
        raw.ceil() as i64
    }
}
