//! Safety layer — flags adversarial content before it reaches a classifier.
//!
//! Rules are a static, ordered table of case-insensitive phrases matched as
//! plain substrings, so a phrase still fires when it runs into neighbouring
//! letters. Every matching rule is reported; there is no short-circuit on the
//! first hit.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Category of attack a rule detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    InstructionOverride,
    RoleConfusion,
    DataPoisoning,
    PrivacyProbing,
    ClassificationManipulation,
}

/// A single threat phrase with its compiled matcher.
#[derive(Debug, Clone)]
pub struct ThreatRule {
    /// Phrase reported in `threats` when the rule matches.
    pub phrase: String,
    pub category: ThreatCategory,
    regex: Regex,
}

impl ThreatRule {
    /// Build a rule matching `phrase` case-insensitively anywhere in a message.
    pub fn new(phrase: &str, category: ThreatCategory) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("(?i){}", regex::escape(phrase)))?;
        Ok(Self {
            phrase: phrase.to_string(),
            category,
            regex,
        })
    }

    /// Whether `content` contains this rule's phrase.
    pub fn matches(&self, content: &str) -> bool {
        self.regex.is_match(content)
    }
}

/// Default rule table: `(phrase, category)`.
const DEFAULT_RULES: &[(&str, ThreatCategory)] = &[
    ("ignore previous instructions", ThreatCategory::InstructionOverride),
    ("ignore all previous instructions", ThreatCategory::InstructionOverride),
    ("disregard the above", ThreatCategory::InstructionOverride),
    ("forget everything", ThreatCategory::InstructionOverride),
    ("new instructions", ThreatCategory::InstructionOverride),
    ("you are now", ThreatCategory::RoleConfusion),
    ("act as", ThreatCategory::RoleConfusion),
    ("pretend to be", ThreatCategory::RoleConfusion),
    ("generate fake listings", ThreatCategory::DataPoisoning),
    ("create fake listings", ThreatCategory::DataPoisoning),
    ("tell me about the system", ThreatCategory::PrivacyProbing),
    ("what are your instructions", ThreatCategory::PrivacyProbing),
    ("system prompt", ThreatCategory::PrivacyProbing),
    ("force classify", ThreatCategory::ClassificationManipulation),
    ("always say yes", ThreatCategory::ClassificationManipulation),
];

/// Verdict for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub blocked: bool,
    /// Matched phrases, in rule-table order.
    pub threats: Vec<String>,
    /// Distinct categories of the matched rules, in first-match order.
    pub categories: Vec<ThreatCategory>,
}

/// Pattern-based security filter.
pub struct SafetyLayer {
    rules: Vec<ThreatRule>,
}

impl SafetyLayer {
    /// Create a safety layer with the default rule table.
    pub fn new() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(phrase, category)| {
                ThreatRule::new(phrase, *category).expect("default threat phrases are valid")
            })
            .collect();
        Self { rules }
    }

    /// Create a safety layer with no rules (for testing).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a custom rule.
    pub fn add_rule(&mut self, phrase: &str, category: ThreatCategory) -> Result<(), regex::Error> {
        self.rules.push(ThreatRule::new(phrase, category)?);
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Scan message content against every rule.
    pub fn scan(&self, content: &str) -> ScanResult {
        let mut result = ScanResult::default();
        for rule in self.rules.iter().filter(|rule| rule.matches(content)) {
            result.threats.push(rule.phrase.clone());
            if !result.categories.contains(&rule.category) {
                result.categories.push(rule.category);
            }
        }
        result.blocked = !result.threats.is_empty();

        if result.blocked {
            warn!(
                threats = ?result.threats,
                categories = ?result.categories,
                "Security filter blocked message"
            );
        }
        result
    }

    /// Run a set of named attack prompts and summarise how many were blocked.
    pub fn run_scenarios(&self, scenarios: &[SecurityScenario]) -> ScenarioReport {
        let results: Vec<ScenarioResult> = scenarios
            .iter()
            .map(|scenario| {
                let scan = self.scan(&scenario.prompt);
                ScenarioResult {
                    scenario: scenario.name.clone(),
                    attack_type: scenario.attack_type.clone(),
                    prompt: scenario.prompt.clone(),
                    blocked: scan.blocked,
                    threats: scan.threats,
                    categories: scan.categories,
                }
            })
            .collect();

        let total_attacks = results.len();
        let blocked_attacks = results.iter().filter(|r| r.blocked).count();
        let block_rate = if total_attacks == 0 {
            0.0
        } else {
            (blocked_attacks as f64 / total_attacks as f64 * 1000.0).round() / 10.0
        };

        ScenarioReport {
            results,
            metrics: SecurityMetrics {
                total_attacks,
                blocked_attacks,
                block_rate,
            },
        }
    }
}

impl Default for SafetyLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// A named attack prompt for the security self-test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScenario {
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default = "unknown", rename = "type")]
    pub attack_type: String,
    pub prompt: String,
}

fn unknown() -> String {
    "Unknown".to_string()
}

/// Outcome of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario: String,
    pub attack_type: String,
    pub prompt: String,
    pub blocked: bool,
    pub threats: Vec<String>,
    pub categories: Vec<ThreatCategory>,
}

/// Aggregate block rate across scenarios.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityMetrics {
    pub total_attacks: usize,
    pub blocked_attacks: usize,
    /// Percentage, one decimal place.
    pub block_rate: f64,
}

/// Full security self-test report.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub results: Vec<ScenarioResult>,
    pub metrics: SecurityMetrics,
}
