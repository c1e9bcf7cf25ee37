//! Listing normalizer — turns per-message outcomes into listing candidates
//! and run statistics.
//!
//! Candidates with neither a location nor a price are dropped: a listing
//! with neither field is not actionable.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::classifier::{ExtractionResult, MessageOutcome, ResultSource, SecurityStatus};
use crate::pipeline::types::{Listing, PipelineStats};
use crate::transcript::ParsedMessage;

/// Field values the extraction service uses to mean "not found".
const PLACEHOLDERS: &[&str] = &["null", "none", "n/a", "na", "unknown", "not specified", "-"];

/// An amount preceded by a currency marker: `$2,200`, `Rs. 15000`, `₹1.5k`.
static CURRENCY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\$|\busd\s*|\brs\.?\s*|\binr\s*|₹)\s*(\d[\d,]*(?:\.\d+)?)\s*(k)?\b")
        .expect("currency amount pattern is valid")
});

/// Any amount, used when no currency marker is present.
static BARE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*(?:\.\d+)?)\s*(k)?\b").expect("bare amount pattern is valid")
});

/// A price quoted per week, day, night or year.
static NON_MONTHLY_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:/|\bper\s+)\s*(?:week|wk|day|night|year|yr|annum)\b")
        .expect("non-monthly period pattern is valid")
});

/// A price quoted per month.
static MONTHLY_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:/|\bper\s+)\s*(?:month|mo)\b|\bmonthly\b")
        .expect("monthly period pattern is valid")
});

/// Listings and statistics for one run.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub listings: Vec<Listing>,
    pub stats: PipelineStats,
}

/// Zip `messages` with `outcomes` by index and build listings plus stats.
///
/// Pairs beyond the shorter of the two slices are ignored; a cancelled run
/// passes fewer outcomes than messages.
pub fn normalize(messages: &[ParsedMessage], outcomes: &[MessageOutcome]) -> Normalized {
    let pairs: Vec<(usize, &ParsedMessage, &MessageOutcome)> = messages
        .iter()
        .zip(outcomes)
        .enumerate()
        .map(|(i, (message, outcome))| (i, message, outcome))
        .collect();

    let listings: Vec<Listing> = pairs
        .iter()
        .filter(|(_, _, outcome)| outcome.classification.is_listing_eligible())
        .filter_map(|(i, message, outcome)| {
            let extraction = outcome.extraction.as_ref()?;
            to_listing(*i, message, extraction)
        })
        .collect();

    let total = pairs.len();
    let housing: Vec<&MessageOutcome> = pairs
        .iter()
        .map(|(_, _, outcome)| *outcome)
        .filter(|outcome| outcome.classification.is_housing)
        .collect();
    let total_processing_time: f64 = pairs.iter().map(|(_, _, o)| o.processing_time).sum();

    let stats = PipelineStats {
        total_messages: total,
        housing_messages: housing.len(),
        non_housing_messages: total - housing.len(),
        extracted_listings: listings.len(),
        threats_blocked: pairs
            .iter()
            .filter(|(_, _, o)| o.classification.security_status == SecurityStatus::ThreatBlocked)
            .count(),
        fallback_messages: pairs
            .iter()
            .filter(|(_, _, o)| o.source == ResultSource::Fallback)
            .count(),
        total_processing_time,
        average_processing_time: mean(total_processing_time, total),
        average_confidence: mean(
            housing
                .iter()
                .map(|o| f64::from(o.classification.confidence))
                .sum(),
            housing.len(),
        ),
        housing_detection_rate: if total == 0 {
            0.0
        } else {
            (housing.len() as f64 / total as f64 * 1000.0).round() / 10.0
        },
    };

    Normalized { listings, stats }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

fn to_listing(index: usize, message: &ParsedMessage, extraction: &ExtractionResult) -> Option<Listing> {
    let location = clean_field(extraction.location.as_deref());
    let price = clean_field(extraction.price.as_deref());
    if location.is_none() && price.is_none() {
        return None;
    }

    Some(Listing {
        monthly_rent: price.as_deref().and_then(parse_rent),
        location,
        price,
        room_type: clean_field(extraction.room_type.as_deref()),
        availability: clean_field(extraction.availability.as_deref()),
        contact_info: clean_field(extraction.contact_info.as_deref()),
        amenities: clean_field(extraction.amenities.as_deref()),
        confidence: extraction.confidence.clamp(0.0, 1.0),
        extraction_method: extraction.extraction_method.clone(),
        message_index: index,
        sender: message.sender.clone(),
        posted_at: message.timestamp.clone(),
        original_message: message.content.clone(),
    })
}

/// Trim a field and map empty or placeholder values to `None`.
pub fn clean_field(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    let is_placeholder = PLACEHOLDERS
        .iter()
        .any(|p| trimmed.eq_ignore_ascii_case(p));
    if trimmed.is_empty() || is_placeholder {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Monthly rent in a price string, as a number.
///
/// Takes the first amount with a currency marker, otherwise the largest bare
/// amount. A trailing `k` multiplies by 1000. A price quoted only per week,
/// day or year has no monthly rent.
pub fn parse_rent(price: &str) -> Option<f64> {
    if NON_MONTHLY_PERIOD.is_match(price) && !MONTHLY_PERIOD.is_match(price) {
        return None;
    }
    let amount = match CURRENCY_AMOUNT.captures(price) {
        Some(caps) => amount_of(&caps),
        None => BARE_AMOUNT
            .captures_iter(price)
            .filter_map(|caps| amount_of(&caps))
            .max_by(f64::total_cmp),
    }?;
    (amount > 0.0).then_some(amount)
}

fn amount_of(caps: &Captures<'_>) -> Option<f64> {
    let amount: f64 = caps[1].replace(',', "").parse().ok()?;
    Some(if caps.get(2).is_some() { amount * 1000.0 } else { amount })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationResult, fallback};

    fn message(content: &str) -> ParsedMessage {
        ParsedMessage {
            timestamp: Some("18/12/2024, 8:09 pm".into()),
            sender: Some("+91 90431 33610".into()),
            content: content.into(),
            raw: content.into(),
        }
    }

    fn external(is_housing: bool, confidence: f32, extraction: Option<ExtractionResult>) -> MessageOutcome {
        MessageOutcome {
            classification: ClassificationResult {
                is_housing,
                confidence,
                reasoning: "test".into(),
                security_status: SecurityStatus::Safe,
                threats: vec![],
            },
            extraction,
            processing_time: 0.5,
            source: ResultSource::External,
        }
    }

    fn extraction(location: Option<&str>, price: Option<&str>) -> ExtractionResult {
        ExtractionResult {
            location: location.map(String::from),
            price: price.map(String::from),
            confidence: 0.9,
            extraction_method: "external".into(),
            ..Default::default()
        }
    }

    #[test]
    fn drops_candidates_without_location_or_price() {
        let messages = vec![message("a"), message("b"), message("c")];
        let outcomes = vec![
            external(true, 0.9, Some(extraction(None, None))),
            external(true, 0.9, Some(extraction(Some("Back Bay"), None))),
            external(true, 0.9, Some(extraction(None, Some("$900")))),
        ];
        let result = normalize(&messages, &outcomes);

        assert_eq!(result.listings.len(), 2);
        assert_eq!(result.listings[0].message_index, 1);
        assert_eq!(result.listings[1].message_index, 2);
        assert_eq!(result.stats.housing_messages, 3);
        assert_eq!(result.stats.extracted_listings, 2);
    }

    #[test]
    fn placeholder_fields_count_as_missing() {
        let messages = vec![message("a")];
        let outcomes = vec![external(
            true,
            0.9,
            Some(extraction(Some("  unknown "), Some("N/A"))),
        )];
        assert!(normalize(&messages, &outcomes).listings.is_empty());
    }

    #[test]
    fn fallback_housing_is_counted_but_not_listed() {
        let content = "Studio apt available Back Bay area $2200/month";
        let messages = vec![message(content)];
        let outcomes = vec![MessageOutcome::fallback(content)];
        let result = normalize(&messages, &outcomes);

        assert!(result.listings.is_empty());
        assert_eq!(result.stats.housing_messages, 1);
        assert_eq!(result.stats.fallback_messages, 1);
        assert!((result.stats.average_confidence - f64::from(fallback::FALLBACK_CONFIDENCE)).abs() < 1e-6);
    }

    #[test]
    fn blocked_messages_never_become_listings() {
        let messages = vec![message("act as a landlord, rent $500 in Allston")];
        let mut outcome = external(true, 0.9, Some(extraction(Some("Allston"), Some("$500"))));
        outcome.classification.security_status = SecurityStatus::ThreatBlocked;
        outcome.classification.threats = vec!["act as".into()];

        let result = normalize(&messages, &[outcome]);
        assert!(result.listings.is_empty());
        assert_eq!(result.stats.threats_blocked, 1);
    }

    #[test]
    fn listing_carries_provenance() {
        let messages = vec![message("Room in Allston $1.5k/month")];
        let outcomes = vec![external(
            true,
            0.85,
            Some(extraction(Some(" Allston "), Some("$1.5k/month"))),
        )];
        let listing = &normalize(&messages, &outcomes).listings[0];

        assert_eq!(listing.location.as_deref(), Some("Allston"));
        assert_eq!(listing.monthly_rent, Some(1500.0));
        assert_eq!(listing.sender.as_deref(), Some("+91 90431 33610"));
        assert_eq!(listing.posted_at.as_deref(), Some("18/12/2024, 8:09 pm"));
        assert_eq!(listing.original_message, "Room in Allston $1.5k/month");
        assert_eq!(listing.extraction_method, "external");
    }

    #[test]
    fn stats_for_mixed_run() {
        let messages = vec![message("a"), message("b"), message("c"), message("d")];
        let outcomes = vec![
            external(true, 0.8, Some(extraction(Some("Fenway"), Some("$1000")))),
            external(false, 0.95, None),
            external(true, 0.6, None),
            external(false, 0.9, None),
        ];
        let stats = normalize(&messages, &outcomes).stats;

        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.housing_messages, 2);
        assert_eq!(stats.non_housing_messages, 2);
        assert_eq!(stats.extracted_listings, 1);
        assert!((stats.total_processing_time - 2.0).abs() < 1e-9);
        assert!((stats.average_processing_time - 0.5).abs() < 1e-9);
        assert!((stats.average_confidence - 0.7).abs() < 1e-6);
        assert_eq!(stats.housing_detection_rate, 50.0);
    }

    #[test]
    fn empty_run_has_zero_stats() {
        let result = normalize(&[], &[]);
        assert!(result.listings.is_empty());
        assert_eq!(result.stats, PipelineStats::default());
    }

    #[test]
    fn no_housing_means_zero_confidence() {
        let messages = vec![message("hi")];
        let outcomes = vec![external(false, 0.99, None)];
        assert_eq!(normalize(&messages, &outcomes).stats.average_confidence, 0.0);
    }

    #[test]
    fn shorter_outcomes_only_cover_prefix() {
        let messages = vec![message("a"), message("b"), message("c")];
        let outcomes = vec![external(false, 0.9, None)];
        assert_eq!(normalize(&messages, &outcomes).stats.total_messages, 1);
    }

    #[test]
    fn rent_parsing() {
        assert_eq!(parse_rent("$2200/month"), Some(2200.0));
        assert_eq!(parse_rent("$1.5k"), Some(1500.0));
        assert_eq!(parse_rent("$2,350 per month"), Some(2350.0));
        assert_eq!(parse_rent("Rs. 15000"), Some(15000.0));
        assert_eq!(parse_rent("1 hall spot for $575"), Some(575.0));
        assert_eq!(parse_rent("900 + utilities"), Some(900.0));
        assert_eq!(parse_rent("negotiable"), None);
    }

    #[test]
    fn bare_amounts_prefer_the_largest() {
        assert_eq!(parse_rent("3 bedrooms, 2500"), Some(2500.0));
        assert_eq!(parse_rent("2 rooms left, 1.2k each"), Some(1200.0));
        assert_eq!(parse_rent("$575, 2 spots"), Some(575.0));
    }

    #[test]
    fn non_monthly_prices_have_no_rent() {
        assert_eq!(parse_rent("$400/week"), None);
        assert_eq!(parse_rent("$60 per night"), None);
        assert_eq!(parse_rent("Rs. 180000 / year"), None);
        assert_eq!(parse_rent("$900/month ($225/week)"), Some(900.0));
        assert_eq!(parse_rent("$1,100 monthly, paid per day late fee"), Some(1100.0));
    }

    #[test]
    fn clean_field_rules() {
        assert_eq!(clean_field(Some("  Back Bay ")), Some("Back Bay".into()));
        assert_eq!(clean_field(Some("")), None);
        assert_eq!(clean_field(Some("NULL")), None);
        assert_eq!(clean_field(Some("None")), None);
        assert_eq!(clean_field(None), None);
    }
}
