//! Query router: classifies a free-text question as a deterministic data
//! query or a conversational one.
//!
//! A greedy, first-match rule list, not a scored classifier. The tables below
//! are checked in a fixed precedence and each rule matches when every word in
//! one of its word groups appears in the lowercased query. Keeping the rules
//! as data keeps the precedence testable without touching control flow.

// =============================================================================
// INTENTS
// =============================================================================

/// Deterministic question kinds the answer layer knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataIntent {
    CustomerCount,
    DiscountCustomers,
    TopReferrers,
    RecentCustomers,
    CodeUsage,
    SuccessRates,
    FindCustomer,
    Statistics,
}

/// Routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRoute {
    Deterministic(DataIntent),
    Conversational,
}

// =============================================================================
// RULE TABLES
// =============================================================================

struct IntentRule {
    intent: DataIntent,
    /// Word groups; the rule fires if all words of any group are present.
    groups: &'static [&'static [&'static str]],
}

/// Statistical/count phrasings, checked first; order within the table is the
/// tie-break.
const STAT_RULES: &[IntentRule] = &[
    IntentRule {
        intent: DataIntent::CustomerCount,
        groups: &[
            &["how", "many", "customers"],
            &["total", "customers"],
            &["customer", "count"],
        ],
    },
    IntentRule {
        intent: DataIntent::DiscountCustomers,
        groups: &[&["customers", "with", "discount"], &["discount", "earned"]],
    },
    IntentRule {
        intent: DataIntent::TopReferrers,
        groups: &[
            &["top", "referrer"],
            &["best", "referrer"],
            &["most", "referral"],
        ],
    },
    IntentRule {
        intent: DataIntent::RecentCustomers,
        groups: &[
            &["recent", "customer"],
            &["new", "customer"],
            &["latest", "customer"],
        ],
    },
    IntentRule {
        intent: DataIntent::CodeUsage,
        groups: &[&["referral", "code"], &["codes", "used"]],
    },
    IntentRule {
        intent: DataIntent::SuccessRates,
        groups: &[&["success", "rate"], &["conversion"], &["percentage"]],
    },
    IntentRule {
        intent: DataIntent::Statistics,
        groups: &[&["statistics"], &["stats"], &["overview"], &["summary"]],
    },
];

/// Explicit search commands, checked second.
const SEARCH_GROUPS: &[&[&str]] = &[
    &["find", "customer"],
    &["search", "customer"],
    &["customer", "named"],
    &["show", "customer"],
];

/// Conversational topics, checked third: tea talk, business advice,
/// greetings, thanks.
const CONVERSATIONAL_GROUPS: &[&[&str]] = &[
    &["what", "tea"],
    &["which", "tea"],
    &["recommend", "tea"],
    &["how", "brew"],
    &["brewing"],
    &["steep"],
    &["business", "advice"],
    &["improve"],
    &["strategy"],
    &["customer", "service"],
    &["retention"],
    &["marketing"],
    &["promotion"],
    &["grow"],
    &["hello"],
    &["hi"],
    &["thanks"],
    &["thank", "you"],
];

/// Words that never count as a customer name.
const STOP_WORDS: &[&str] = &[
    "who", "is", "what", "where", "when", "how", "the", "a", "an", "and", "or", "but", "in", "on",
    "at", "to", "for", "of", "with", "customer", "customers", "named", "called", "about", "tell",
    "me", "show", "find", "search", "get", "my", "your", "his", "her",
];

// =============================================================================
// MATCHING
// =============================================================================

fn words_of(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn group_matches(words: &[String], group: &[&str]) -> bool {
    group.iter().all(|needle| words.iter().any(|w| w == needle))
}

fn any_group_matches(words: &[String], groups: &[&[&str]]) -> bool {
    groups.iter().any(|g| group_matches(words, g))
}

/// Tokens that look like a proper name: longer than two characters and not in
/// the stop-word set. Shared with the context-digest builder.
pub fn candidate_names(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .map(|w| w.to_string())
        .collect()
}

/// Classify a query. First match wins; order is part of the contract.
pub fn route(query: &str) -> QueryRoute {
    let words = words_of(query);

    for rule in STAT_RULES {
        if any_group_matches(&words, rule.groups) {
            return QueryRoute::Deterministic(rule.intent);
        }
    }

    if any_group_matches(&words, SEARCH_GROUPS) {
        return QueryRoute::Deterministic(DataIntent::FindCustomer);
    }

    if any_group_matches(&words, CONVERSATIONAL_GROUPS) {
        return QueryRoute::Conversational;
    }

    // Name-like tokens without a search verb go to the model so it can be
    // handed the matched customer's data as context.
    if !candidate_names(query).is_empty() {
        return QueryRoute::Conversational;
    }

    QueryRoute::Conversational
}

// =============================================================================
// TESTS
// =============================================================================
