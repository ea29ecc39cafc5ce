//! Confidence and guardrail gate for completed assistant responses.
//!
//! A pure, deterministic policy: when the backend's confidence is below the
//! threshold, or any guardrail flag is set, the assistant content is replaced
//! with the exact canned string for the active language and the citations are
//! dropped. Same inputs always yield the same decision.

use crate::types::Source;

/// Default confidence threshold below which the fallback fires.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.65;

/// Fixed per-language fallback strings. One exact string per language, not
/// templated. Languages without an entry fall back to the English string.
const FALLBACK_STRINGS: &[(&str, &str)] = &[
    (
        "en",
        "Sorry, I could not find a reliable answer to your question. Please rephrase it or contact a support officer.",
    ),
    (
        "hi",
        "क्षमा करें, मुझे आपके प्रश्न का विश्वसनीय उत्तर नहीं मिला। कृपया प्रश्न को दोबारा लिखें या सहायता अधिकारी से संपर्क करें।",
    ),
    (
        "bn",
        "দুঃখিত, আপনার প্রশ্নের নির্ভরযোগ্য উত্তর খুঁজে পাইনি। অনুগ্রহ করে প্রশ্নটি আবার লিখুন বা সহায়তা কর্মকর্তার সাথে যোগাযোগ করুন।",
    ),
    (
        "ta",
        "மன்னிக்கவும், உங்கள் கேள்விக்கு நம்பகமான பதில் கிடைக்கவில்லை. கேள்வியை மீண்டும் எழுதவும் அல்லது உதவி அதிகாரியை தொடர்பு கொள்ளவும்.",
    ),
    (
        "te",
        "క్షమించండి, మీ ప్రశ్నకు నమ్మదగిన సమాధానం దొరకలేదు. దయచేసి ప్రశ్నను తిరిగి రాయండి లేదా సహాయ అధికారిని సంప్రదించండి.",
    ),
    (
        "mr",
        "क्षमस्व, मला तुमच्या प्रश्नाचे विश्वसनीय उत्तर सापडले नाही. कृपया प्रश्न पुन्हा लिहा किंवा मदत अधिकाऱ्याशी संपर्क साधा.",
    ),
];

/// Returns the exact fallback string for a language code.
pub fn fallback_string(language: &str) -> &'static str {
    FALLBACK_STRINGS
        .iter()
        .find(|(code, _)| *code == language)
        .or_else(|| FALLBACK_STRINGS.iter().find(|(code, _)| *code == "en"))
        .map(|(_, text)| *text)
        .unwrap_or_default()
}

/// The outcome of evaluating a completed response.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackDecision {
    /// Final content to show (original or canned string).
    pub content: String,
    /// Final citations (dropped when the fallback fires).
    pub sources: Vec<Source>,
    /// True when the canned string was substituted.
    pub fallback: bool,
}

/// Confidence/guardrail policy for assistant responses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackPolicy {
    threshold: f64,
}

impl FallbackPolicy {
    /// Create a policy with the given confidence threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Returns the configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluate a completed response.
    ///
    /// Fires when `confidence < threshold` OR any guardrail flag is present.
    /// A fired decision substitutes the exact canned string for `language`
    /// and drops the sources; otherwise content and sources pass through
    /// unchanged.
    pub fn evaluate(
        &self,
        content: String,
        sources: Vec<Source>,
        confidence: f64,
        guardrails: &[String],
        language: &str,
    ) -> FallbackDecision {
        if confidence < self.threshold || !guardrails.is_empty() {
            FallbackDecision {
                content: fallback_string(language).to_owned(),
                sources: Vec::new(),
                fallback: true,
            }
        } else {
            FallbackDecision {
                content,
                sources,
                fallback: false,
            }
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}
