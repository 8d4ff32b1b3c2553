//! Messages shown to the user for each classification outcome.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::detect::ClassificationOutcome;

const PLAIN_POSITIVE: &[&str] = &["SOLAR PANELS DETECTED"];
const PLAIN_NEGATIVE: &[&str] = &["NO SOLAR PANELS DETECTED"];

const PLAYFUL_POSITIVE: &[&str] = &[
    "Solar panels detected: You're not just saving money, you're also charging up Mother Earth's good vibes! 🌍💚",
    "Roof status: Sunny side up! Your panels are turning rays into awesome days! ☀️😎",
    "You've got solar power! Now your roof is cooler than a polar bear in sunglasses. 🐻‍❄️🕶️",
    "Green alert: Your roof is now a climate hero's cape! Solar panels are saving the day, one ray at a time. 🦸‍♂️🌞",
    "Solar panels spotted: Your roof is now officially a member of the Renewable Energy Rockstars Club! ⭐🌱",
];

const PLAYFUL_NEGATIVE: &[&str] = &[
    "No solar panels yet? Your roof is a blank canvas waiting for a green masterpiece! 🎨🌱",
    "It's lonely up here without solar panels. Imagine the sun-powered parties you're missing! 🌞🎉",
    "Your roof could be a superhero in disguise. Just needs its solar cape! 🦸‍♂️☀️",
    "Clear skies, empty roof. It's the perfect opportunity to harness the sun! 🌤️🔋",
    "No panels detected, but don't worry: it's never too late to join the solar revolution and be a ray of hope! 🌞💡",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageStyle {
    Plain,
    Playful,
}

impl MessageStyle {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" => Some(Self::Plain),
            "playful" => Some(Self::Playful),
            _ => None,
        }
    }
}

/// A fixed pool of sentences per outcome.
#[derive(Clone, Debug)]
pub struct MessagePool {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl MessagePool {
    pub fn for_style(style: MessageStyle) -> Self {
        let (positive, negative) = match style {
            MessageStyle::Plain => (PLAIN_POSITIVE, PLAIN_NEGATIVE),
            MessageStyle::Playful => (PLAYFUL_POSITIVE, PLAYFUL_NEGATIVE),
        };
        Self {
            positive: positive.iter().map(|s| s.to_string()).collect(),
            negative: negative.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn pool(&self, outcome: ClassificationOutcome) -> &[String] {
        match outcome {
            ClassificationOutcome::Present => &self.positive,
            ClassificationOutcome::Absent => &self.negative,
        }
    }

    /// Pick a message for the outcome.
    pub fn pick<R: Rng + ?Sized>(&self, outcome: ClassificationOutcome, rng: &mut R) -> &str {
        let pool = self.pool(outcome);
        // Pools are non-empty by construction.
        pool.choose(rng).map(String::as_str).unwrap_or_default()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::for_style(MessageStyle::Playful)
    }
}
