//! Bounded business-context digest handed to the model.
//!
//! The digest carries aggregates plus, at most, the customers the query
//! textually names. The full table is never serialized.

use serde::Serialize;

use crate::engine::ReferralEngine;
use crate::router::candidate_names;
use crate::store::Customer;

/// Fixed system prompt; `{business_context}` is replaced with the digest JSON.
const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are a helpful assistant for a tea business with a referral system.

Current Business Context:
{business_context}

Guidelines:
- Be friendly and professional
- Focus on tea business topics
- Keep responses concise but helpful
- Use the provided customer data when relevant
- If specific customer data is provided, reference it accurately
- For data-heavy queries, suggest using specific commands like \"show me statistics\"
- You can discuss tea varieties, brewing methods, business advice";

/// Words that pull a top-performers summary into the digest.
const TOP_PERFORMER_WORDS: &[&str] = &["top", "best", "performing", "leader"];

#[derive(Debug, Serialize)]
struct CustomerDigest {
    name: String,
    id: String,
    referrals: u32,
    discount: &'static str,
    registration_date: String,
}

impl CustomerDigest {
    fn from_customer(c: &Customer) -> Self {
        Self {
            name: c.name.clone(),
            id: c.customer_id.clone(),
            referrals: c.referrals_completed,
            discount: if c.discount_earned { "Yes" } else { "No" },
            registration_date: c.registration_date.chars().take(10).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TopReferrerDigest {
    name: String,
    referrals: u32,
    discount: &'static str,
}

/// The context object serialized into the system prompt.
#[derive(Debug, Serialize)]
pub struct BusinessContext {
    business_type: &'static str,
    total_customers: usize,
    customers_with_discounts: usize,
    referral_requirement: &'static str,
    current_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    relevant_customers: Option<Vec<CustomerDigest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_referrers: Option<Vec<TopReferrerDigest>>,
}

/// Relevant customers: only those whose names the query mentions.
fn relevant_customers(engine: &ReferralEngine, query: &str) -> Option<Vec<CustomerDigest>> {
    let names = candidate_names(query);
    if names.is_empty() {
        return None;
    }

    let mut matched = Vec::new();
    for name in &names {
        for customer in engine.customers().search_name(name) {
            matched.push(CustomerDigest::from_customer(customer));
        }
    }

    if matched.is_empty() {
        None
    } else {
        Some(matched)
    }
}

/// Build the bounded digest for one query.
pub fn business_context(engine: &ReferralEngine, query: &str) -> BusinessContext {
    let query_lower = query.to_lowercase();

    let top_referrers = if TOP_PERFORMER_WORDS.iter().any(|w| query_lower.contains(w)) {
        Some(
            engine
                .top_referrers(3)
                .into_iter()
                .map(|c| TopReferrerDigest {
                    name: c.name.clone(),
                    referrals: c.referrals_completed,
                    discount: if c.discount_earned { "Yes" } else { "No" },
                })
                .collect(),
        )
    } else {
        None
    };

    BusinessContext {
        business_type: "Tea Business with Referral System",
        total_customers: engine.customer_count(),
        customers_with_discounts: engine.discount_earners().len(),
        referral_requirement: "3 referrals needed for discount",
        current_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
        relevant_customers: relevant_customers(engine, query),
        top_referrers,
    }
}

/// Render the full system prompt for one query.
pub fn system_prompt(engine: &ReferralEngine, query: &str) -> String {
    let context = business_context(engine, query);
    let json = serde_json::to_string_pretty(&context)
        .unwrap_or_else(|_| "Basic tea business with referral system".to_string());
    SYSTEM_PROMPT_TEMPLATE.replace("{business_context}", &json)
}
