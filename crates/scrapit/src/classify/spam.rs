//! Rule-based spam scoring
//!
//! Keyword and shape heuristics over subject, sender, and snippet. Used as
//! a floor under the model classification and as the fallback when the
//! model response fails validation.

use crate::models::RiskTier;

/// Subject terms that raise the spam score
const SPAM_SUBJECT_TERMS: &[&str] = &[
    "urgent",
    "act now",
    "limited time",
    "free",
    "winner",
    "congratulations",
    "click here",
    "buy now",
    "discount",
    "offer expires",
    "no obligation",
    "risk free",
    "satisfaction guaranteed",
    "money back",
    "as seen on",
    "weight loss",
    "make money",
    "work from home",
    "get paid",
];

/// Body phrases that raise the spam score
const SPAM_CONTENT_PHRASES: &[&str] = &[
    "click here",
    "act now",
    "limited time",
    "expires soon",
    "unsubscribe",
    "remove me",
    "opt out",
    "lose weight",
    "make money fast",
    "work from home",
    "congratulations you have won",
    "claim your prize",
];

/// Score an email 0-1 on spam likelihood
pub fn spam_score(subject: &str, sender: &str, snippet: &str) -> f32 {
    let mut score: f32 = 0.0;

    let subject_lower = subject.to_lowercase();
    for term in SPAM_SUBJECT_TERMS {
        if subject_lower.contains(term) {
            score += 0.2;
        }
    }

    // Shouting subject
    if subject.len() > 10 && subject == subject.to_uppercase() && subject != subject_lower {
        score += 0.3;
    }

    // Excessive punctuation
    if subject.matches('!').count() > 2 || subject.matches('?').count() > 2 {
        score += 0.2;
    }

    let sender_lower = sender.to_lowercase();
    if ["noreply", "no-reply", "donotreply"]
        .iter()
        .any(|p| sender_lower.contains(p))
    {
        score += 0.1;
    }

    // Mostly-numeric sender addresses
    if !sender.is_empty() {
        let digits = sender.chars().filter(|c| c.is_ascii_digit()).count();
        if digits as f32 > sender.len() as f32 * 0.3 {
            score += 0.3;
        }
    }

    let content_lower = snippet.to_lowercase();
    for phrase in SPAM_CONTENT_PHRASES {
        if content_lower.contains(phrase) {
            score += 0.15;
        }
    }

    score.min(1.0)
}

/// Derive a sender risk tier from a single message's spam score
pub fn risk_from_score(score: f32) -> RiskTier {
    if score >= 0.8 {
        RiskTier::High
    } else if score > 0.5 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}
