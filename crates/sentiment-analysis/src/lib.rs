use analysis_core::{AnalysisError, Headline, SentimentLabel, SentimentScorer, SentimentSummary};
use async_trait::async_trait;

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

const NEGATION_WINDOW: usize = 3;

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "jump", "gain", "profit", "growth", "beat",
    "upgrade", "outperform", "strong", "positive", "rise", "up", "higher",
    "increase", "breakthrough", "success", "exceed", "momentum", "buy",
    "optimistic", "record", "high", "advance",
    // Financial-specific terms
    "dividend", "buyback", "repurchase", "upside", "recovery", "rebound",
    "expansion", "robust", "accelerating", "overweight", "raise", "tailwind",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "loss", "fall", "down", "lower", "plunge", "crash",
    "miss", "downgrade", "underperform", "weak", "negative", "drop",
    "decrease", "concern", "risk", "fail", "disappoint", "slump", "sell",
    "warning", "pessimistic", "low", "retreat", "fear", "trouble",
    // Financial-specific terms
    "debt", "dilution", "headwind", "lawsuit", "litigation", "recall",
    "investigation", "probe", "default", "bankruptcy", "layoff", "downside",
    "overvalued", "underweight", "suspend",
];

/// Inflections accepted after a keyword ("beat" -> "beats", "upgrade" -> "upgraded")
const SUFFIXES: &[&str] = &["s", "es", "d", "ed", "ing"];

/// Keyword hits that map to a full-strength polarity of 1.0
const FULL_SCALE_HITS: f64 = 3.0;

/// Description text counts half as much as the title
const DESCRIPTION_WEIGHT: f64 = 0.5;

fn matches_keyword(word: &str, keyword: &str) -> bool {
    match word.strip_prefix(keyword) {
        Some("") => true,
        Some(rest) => SUFFIXES.contains(&rest),
        None => false,
    }
}

/// Word-list headline scorer with negation handling.
///
/// A keyword preceded by a negation word within three tokens flips sign
/// ("not bullish" scores negative).
pub struct KeywordSentimentScorer {
    positive_words: Vec<&'static str>,
    negative_words: Vec<&'static str>,
}

impl KeywordSentimentScorer {
    pub fn new() -> Self {
        Self {
            positive_words: POSITIVE_WORDS.to_vec(),
            negative_words: NEGATIVE_WORDS.to_vec(),
        }
    }

    /// Net keyword count: +1 per positive hit, -1 per negative hit
    pub fn score_text(&self, text: &str) -> f64 {
        let text_lower = text.to_lowercase();
        let words: Vec<&str> = text_lower
            .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
            .filter(|w| !w.is_empty())
            .collect();

        let negation_positions: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, w)| NEGATION_WORDS.contains(*w))
            .map(|(i, _)| i)
            .collect();

        let mut score: i32 = 0;
        for (i, word) in words.iter().enumerate() {
            let is_positive = self.positive_words.iter().any(|k| matches_keyword(word, k));
            let is_negative = !is_positive && self.negative_words.iter().any(|k| matches_keyword(word, k));
            if !is_positive && !is_negative {
                continue;
            }

            let negated = negation_positions
                .iter()
                .any(|&neg_pos| neg_pos < i && (i - neg_pos) <= NEGATION_WINDOW);

            let sign = if is_positive { 1 } else { -1 };
            score += if negated { -sign } else { sign };
        }

        score as f64
    }

    /// Headline polarity in [-1, 1]
    pub fn headline_polarity(&self, headline: &Headline) -> f64 {
        let mut raw = self.score_text(&headline.title);
        if let Some(desc) = &headline.description {
            raw += self.score_text(desc) * DESCRIPTION_WEIGHT;
        }
        (raw / FULL_SCALE_HITS).clamp(-1.0, 1.0)
    }
}

impl Default for KeywordSentimentScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentScorer for KeywordSentimentScorer {
    async fn polarity(&self, headline: &Headline) -> Result<f64, AnalysisError> {
        Ok(self.headline_polarity(headline))
    }
}

/// Mean polarity scaled to [-100, 100]; no scores is neutral
pub fn aggregate(polarities: &[f64]) -> SentimentSummary {
    if polarities.is_empty() {
        return SentimentSummary::neutral();
    }
    let mean = polarities.iter().sum::<f64>() / polarities.len() as f64;
    let score = (mean * 100.0).clamp(-100.0, 100.0);
    SentimentSummary {
        score,
        label: SentimentLabel::from_score(score),
        headline_count: polarities.len(),
    }
}

/// Score every headline and aggregate. Headlines the scorer rejects are skipped.
pub async fn summarize(scorer: &dyn SentimentScorer, headlines: &[Headline]) -> SentimentSummary {
    let mut polarities = Vec::with_capacity(headlines.len());
    for headline in headlines {
        match scorer.polarity(headline).await {
            Ok(p) if p.is_finite() => polarities.push(p.clamp(-1.0, 1.0)),
            Ok(p) => tracing::warn!("Discarding non-finite polarity {} for '{}'", p, headline.title),
            Err(e) => tracing::warn!("Sentiment scoring failed for '{}': {}", headline.title, e),
        }
    }

    let summary = aggregate(&polarities);
    tracing::debug!(
        "Sentiment {:.1} ({:?}) from {} headlines",
        summary.score,
        summary.label,
        summary.headline_count
    );
    summary
}
