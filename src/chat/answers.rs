//! Deterministic answer handlers: direct aggregation and lookup over the
//! stores, rendered as plain text.
//!
//! Dispatch is an ordered phrase table; the first rule with a matching phrase
//! wins. The same table serves both the router-directed deterministic path
//! and the fallback after a model failure.

use crate::engine::ReferralEngine;
use crate::router::DataIntent;

struct AnswerRule {
    intent: DataIntent,
    /// Any-of substring phrases, matched against the lowercased query.
    phrases: &'static [&'static str],
}

const ANSWER_RULES: &[AnswerRule] = &[
    AnswerRule {
        intent: DataIntent::CustomerCount,
        phrases: &["how many customers", "total customers", "customer count"],
    },
    AnswerRule {
        intent: DataIntent::DiscountCustomers,
        phrases: &["customers with discount", "discounts", "discount earned"],
    },
    AnswerRule {
        intent: DataIntent::TopReferrers,
        phrases: &["top referrer", "best referrer", "most referral"],
    },
    AnswerRule {
        intent: DataIntent::RecentCustomers,
        phrases: &["recent", "recently", "new customer", "latest"],
    },
    AnswerRule {
        intent: DataIntent::CodeUsage,
        phrases: &["referral code", "codes used", "referral usage"],
    },
    AnswerRule {
        intent: DataIntent::SuccessRates,
        phrases: &["success rate", "conversion", "percentage"],
    },
    AnswerRule {
        intent: DataIntent::FindCustomer,
        phrases: &["find customer", "search customer", "customer named"],
    },
    AnswerRule {
        intent: DataIntent::Statistics,
        phrases: &["statistics", "stats", "overview", "summary"],
    },
];

/// Tokens ignored when pulling a customer name out of a search query.
const SEARCH_STOP_WORDS: &[&str] = &[
    "find", "customer", "named", "called", "search", "show", "me", "the", "for", "with", "name",
    "who", "is",
];

/// Try the ordered rule table; None when no rule matches.
pub fn deterministic_answer(engine: &ReferralEngine, query: &str) -> Option<String> {
    let query_lower = query.to_lowercase();
    ANSWER_RULES
        .iter()
        .find(|rule| rule.phrases.iter().any(|p| query_lower.contains(p)))
        .map(|rule| render_intent(engine, rule.intent, query))
}

/// Render one intent's answer.
pub fn render_intent(engine: &ReferralEngine, intent: DataIntent, query: &str) -> String {
    match intent {
        DataIntent::CustomerCount => customer_count(engine),
        DataIntent::DiscountCustomers => discount_customers(engine),
        DataIntent::TopReferrers => top_referrers(engine),
        DataIntent::RecentCustomers => recent_customers(engine),
        DataIntent::CodeUsage => referral_status(engine),
        DataIntent::SuccessRates => success_rates(engine),
        DataIntent::FindCustomer => find_customer(engine, query),
        DataIntent::Statistics => general_stats(engine),
    }
}

pub fn help_text() -> String {
    "I can help you with your tea business! Here are some things you can ask:

Data & Statistics (Rule-based - Fast & Accurate):
- \"How many customers do I have?\"
- \"Show me general statistics\"
- \"What's my success rate?\"
- \"Who are my top referrers?\"
- \"Find customer named [name]\"

General Chat (AI-powered):
- Ask about tea varieties and recommendations
- Get business advice and tips
- Discuss brewing techniques
- Customer service strategies
"
    .to_string()
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn customer_count(engine: &ReferralEngine) -> String {
    let total = engine.customer_count();
    if total == 0 {
        return "You have no customers registered yet.".to_string();
    }
    format!("You have {total} customers registered in your tea business database.")
}

fn discount_customers(engine: &ReferralEngine) -> String {
    if engine.customer_count() == 0 {
        return "No customers registered yet.".to_string();
    }

    let earners = engine.discount_earners();
    let total = engine.customer_count();
    if earners.is_empty() {
        return format!("No customers have earned discounts yet out of {total} total customers.");
    }

    let mut result = format!(
        "Customers with discounts ({} out of {total}):\n\n",
        earners.len()
    );
    for customer in earners {
        result.push_str(&format!(
            "- {} (ID: {}) - {}/3 referrals completed\n",
            customer.name, customer.customer_id, customer.referrals_completed
        ));
    }
    result
}

fn top_referrers(engine: &ReferralEngine) -> String {
    if engine.customer_count() == 0 {
        return "No customers registered yet.".to_string();
    }

    let mut result = "Top 5 Referrers:\n\n".to_string();
    for (i, customer) in engine.top_referrers(5).iter().enumerate() {
        let status = if customer.discount_earned {
            "DISCOUNT EARNED"
        } else {
            "In Progress"
        };
        result.push_str(&format!(
            "{}. {} - {}/3 referrals ({status})\n",
            i + 1,
            customer.name,
            customer.referrals_completed
        ));
    }
    result
}

fn recent_customers(engine: &ReferralEngine) -> String {
    if engine.customer_count() == 0 {
        return "No customers registered yet.".to_string();
    }

    let mut result = "Recent customers (last 5):\n\n".to_string();
    for customer in engine.recent_customers(5) {
        let date: String = customer.registration_date.chars().take(10).collect();
        result.push_str(&format!(
            "- {} (ID: {}) - Registered: {date}\n",
            customer.name, customer.customer_id
        ));
    }
    result
}

fn referral_status(engine: &ReferralEngine) -> String {
    let usage = engine.code_usage();
    if usage.total == 0 {
        return "No referral codes generated yet.".to_string();
    }

    format!(
        "Referral Code Status:\n\n\
         - Total referral codes: {}\n\
         - Used codes: {}\n\
         - Available codes: {}\n\
         - Usage rate: {:.1}%\n",
        usage.total,
        usage.used,
        usage.available(),
        usage.usage_rate()
    )
}

fn success_rates(engine: &ReferralEngine) -> String {
    let total = engine.customer_count();
    if total == 0 {
        return "No data available for rate calculations.".to_string();
    }

    let earners = engine.discount_earners().len();
    let usage = engine.code_usage();

    let mut result = format!(
        "Success Rates:\n\n- Discount Achievement Rate: {:.1}%\n",
        earners as f64 / total as f64 * 100.0
    );
    if usage.total > 0 {
        result.push_str(&format!(
            "- Referral Code Usage Rate: {:.1}%\n",
            usage.usage_rate()
        ));
    }
    result.push_str(&format!("- Customers with Discounts: {earners}/{total}\n"));
    result
}

fn find_customer(engine: &ReferralEngine, query: &str) -> String {
    if engine.customer_count() == 0 {
        return "No customers registered yet.".to_string();
    }

    let candidates: Vec<String> = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|w| w.chars().count() > 2 && !SEARCH_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .map(|w| w.to_lowercase())
        .collect();

    if candidates.is_empty() {
        return "Please specify the customer name you're looking for.".to_string();
    }

    let matches = engine.customers().find(|c| {
        let name = c.name.to_lowercase();
        candidates.iter().any(|candidate| name.contains(candidate))
    });

    if matches.is_empty() {
        return format!("No customers found matching '{}'.", candidates.join(" "));
    }

    let mut result = format!("Found {} customer(s):\n\n", matches.len());
    for customer in matches {
        result.push_str(&format!(
            "- {} (ID: {})\n  Phone: {}\n  Referrals: {}/3\n  Discount: {}\n\n",
            customer.name,
            customer.customer_id,
            customer.phone,
            customer.referrals_completed,
            yes_no(customer.discount_earned)
        ));
    }
    result
}

fn general_stats(engine: &ReferralEngine) -> String {
    let customers = engine.customer_count();
    let usage = engine.code_usage();
    let discounts = engine.discount_earners().len();

    let mut result = format!(
        "Tea Business Statistics:\n\n\
         Total Customers: {customers}\n\
         Total Referral Codes: {}\n\
         Used Referral Codes: {}\n\
         Customers with Discounts: {discounts}\n",
        usage.total, usage.used
    );

    if customers > 0 {
        result.push_str(&format!(
            "Discount Rate: {:.1}%\n",
            discounts as f64 / customers as f64 * 100.0
        ));
    }
    if usage.total > 0 {
        result.push_str(&format!("Code Usage Rate: {:.1}%\n", usage.usage_rate()));
    }
    result
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_engine() -> ReferralEngine {
        let mut engine = ReferralEngine::in_memory();
        engine
            .register_customer("John Doe", "0771234567", None)
            .unwrap();
        engine
            .register_customer("Jane Roe", "0759876543", Some("JO4567R1"))
            .unwrap();
        engine
    }

    #[test]
    fn unmatched_query_returns_none() {
        let engine = seeded_engine();
        assert!(deterministic_answer(&engine, "what tea should I stock").is_none());
    }

    #[test]
    fn counts_render_with_totals() {
        let engine = seeded_engine();
        let text = deterministic_answer(&engine, "how many customers do I have").unwrap();
        assert!(text.contains("2 customers"));

        let empty = ReferralEngine::in_memory();
        let text = deterministic_answer(&empty, "customer count").unwrap();
        assert_eq!(text, "You have no customers registered yet.");
    }

    #[test]
    fn first_matching_rule_wins() {
        let engine = seeded_engine();
        // Contains both "customer count" and "stats"; the count rule is
        // earlier in the table.
        let text = deterministic_answer(&engine, "customer count stats").unwrap();
        assert!(text.contains("2 customers"));
    }

    #[test]
    fn referral_status_reports_usage() {
        let engine = seeded_engine();
        let text = deterministic_answer(&engine, "how are my referral codes doing").unwrap();
        assert!(text.contains("Total referral codes: 6"));
        assert!(text.contains("Used codes: 1"));
        assert!(text.contains("Available codes: 5"));
        assert!(text.contains("16.7%"));
    }

    #[test]
    fn find_customer_lists_matches() {
        let engine = seeded_engine();
        let text = deterministic_answer(&engine, "find customer named Jane").unwrap();
        assert!(text.contains("Found 1 customer(s):"));
        assert!(text.contains("Jane Roe"));
        assert!(text.contains("JA6543"));
    }

    #[test]
    fn find_customer_without_name_asks_for_one() {
        let engine = seeded_engine();
        let text = deterministic_answer(&engine, "find customer").unwrap();
        assert_eq!(text, "Please specify the customer name you're looking for.");
    }

    #[test]
    fn find_customer_reports_miss() {
        let engine = seeded_engine();
        let text = deterministic_answer(&engine, "find customer named Zelda").unwrap();
        assert_eq!(text, "No customers found matching 'zelda'.");
    }

    #[test]
    fn general_stats_include_rates() {
        let engine = seeded_engine();
        let text = deterministic_answer(&engine, "show me the overview").unwrap();
        assert!(text.contains("Total Customers: 2"));
        assert!(text.contains("Discount Rate: 0.0%"));
        assert!(text.contains("Code Usage Rate: 16.7%"));
    }

    #[test]
    fn top_referrers_mark_progress() {
        let engine = seeded_engine();
        let text = deterministic_answer(&engine, "who is my top referrer").unwrap();
        assert!(text.starts_with("Top 5 Referrers:"));
        assert!(text.contains("1. John Doe - 1/3 referrals (In Progress)"));
    }
}
