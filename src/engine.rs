//! Referral engine: registration, code validation, redemption, and
//! progress/discount evaluation.
//!
//! The engine is synchronous and is the only writer of the customer store and
//! the referral ledger. Persistence is invoked once per completed
//! registration, never mid-transaction; a save failure is logged and reported
//! but never rolls back in-memory state.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::persist::{Persistence, StoreError};
use crate::store::{
    CodeStatus, Customer, CustomerStatus, CustomerStore, ReferralCode, ReferralLedger,
};

/// External code format: two letters, four digits, `R`, slot 1-3.
static CODE_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}\d{4}R[1-3]$").expect("valid code regex"));

/// Codes issued per customer; also the discount threshold.
pub const CODES_PER_CUSTOMER: usize = 3;

// =============================================================================
// ERRORS
// =============================================================================

/// Why a supplied referral code was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeRejection {
    #[error("Invalid referral code format")]
    BadFormat,
    #[error("Referral code not found")]
    NotFound,
    #[error("Code already used by {used_by}")]
    AlreadyUsed { used_by: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad name/phone. Carries every violated rule, not just the first.
    #[error("{}", messages.join("; "))]
    Validation { messages: Vec<String> },

    /// Derived-id collision with an existing registration.
    #[error("Customer already exists with ID: {customer_id}")]
    DuplicateCustomer { customer_id: String },

    /// Supplied referral code was rejected; carries the specific sub-reason.
    #[error("{0}")]
    InvalidCode(#[from] CodeRejection),

    /// Lookup miss.
    #[error("Customer not found: {term}")]
    NotFound { term: String },

    /// Persistence collaborator failure at startup.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Short code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::DuplicateCustomer { .. } => "duplicate_customer",
            Self::InvalidCode(CodeRejection::BadFormat) => "code_bad_format",
            Self::InvalidCode(CodeRejection::NotFound) => "code_not_found",
            Self::InvalidCode(CodeRejection::AlreadyUsed { .. }) => "code_already_used",
            Self::NotFound { .. } => "not_found",
            Self::Store(_) => "store_error",
        }
    }
}

// =============================================================================
// PURE HELPERS
// =============================================================================

/// Derive the customer id: first two alphabetic characters of the name,
/// uppercased and padded with `X` to two, plus the last four digits of the
/// phone, left-padded with `0` to four. Deterministic and collision-prone by
/// design.
pub fn generate_customer_id(name: &str, phone: &str) -> String {
    let letters: String = name
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    let mut prefix: String = letters.chars().take(2).collect::<String>().to_uppercase();
    while prefix.chars().count() < 2 {
        prefix.push('X');
    }

    let digits: String = phone.trim().chars().filter(|c| c.is_ascii_digit()).collect();
    let last4 = if digits.len() >= 4 {
        digits[digits.len() - 4..].to_string()
    } else {
        format!("{digits:0>4}")
    };

    format!("{prefix}{last4}")
}

/// The three codes issued at registration: `{id}R1..R3`.
pub fn generate_referral_codes(customer_id: &str) -> [String; 3] {
    [
        format!("{customer_id}R1"),
        format!("{customer_id}R2"),
        format!("{customer_id}R3"),
    ]
}

/// Validate raw registration input. On success returns the name title-cased
/// and the phone reduced to digits. All violations are reported together.
pub fn validate_input(name: &str, phone: &str) -> Result<(String, String), EngineError> {
    let mut messages = Vec::new();

    let trimmed = name.trim();
    if trimmed.chars().count() < 2 {
        messages.push("Name must be at least 2 characters".to_string());
    }

    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        messages.push("Phone number must have at least 4 digits".to_string());
    }

    if !messages.is_empty() {
        return Err(EngineError::Validation { messages });
    }

    Ok((title_case(trimmed), digits))
}

/// Capitalize the first letter of each whitespace-separated word, lowercase
/// the rest.
fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// =============================================================================
// VALIDATION / RESULT TYPES
// =============================================================================

/// Owner identity carried by a valid code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeOwner {
    pub customer_id: String,
    pub name: String,
    pub phone: String,
}

/// Outcome of checking a supplied referral code. Precedence is fixed:
/// blank before format, format before existence, existence before status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeCheck {
    /// Blank input: valid, no owner.
    NotProvided,
    /// Well-formed, present, and Available.
    Valid { owner: CodeOwner },
    Rejected(CodeRejection),
}

impl CodeCheck {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// Display line for the front end.
    pub fn message(&self) -> String {
        match self {
            Self::NotProvided => "No referral code provided".to_string(),
            Self::Valid { owner } => format!("Valid code from {}", owner.name),
            Self::Rejected(rejection) => rejection.to_string(),
        }
    }
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    Redeemed { owner_customer_id: String },
    /// The code was already Used; nothing changed. Names the existing
    /// consumer so repeated calls stay observable without double-counting.
    AlreadyUsed { used_by: String },
}

/// Success payload of a registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub customer_id: String,
    pub referral_codes: [String; 3],
    pub customer: Customer,
    /// False when the persistence collaborator failed; in-memory state is
    /// kept either way.
    pub persisted: bool,
}

/// One ledger row of a customer's code breakdown.
#[derive(Debug, Clone)]
pub struct CodeDetail {
    pub code: String,
    pub status: CodeStatus,
    pub used_by_name: String,
    pub date_used: String,
    pub used_info: String,
}

/// Lookup result: the matched customer plus their full code breakdown.
#[derive(Debug, Clone)]
pub struct CustomerProfile {
    pub customer: Customer,
    pub codes: Vec<CodeDetail>,
}

/// Ledger-wide usage tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeUsage {
    pub total: usize,
    pub used: usize,
}

impl CodeUsage {
    pub fn available(&self) -> usize {
        self.total - self.used
    }

    pub fn usage_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64 * 100.0
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Orchestrates registration, validation, redemption, and progress tracking
/// over the two in-memory tables. Sole writer of both.
pub struct ReferralEngine {
    customers: CustomerStore,
    ledger: ReferralLedger,
    persistence: Box<dyn Persistence>,
}

impl ReferralEngine {
    /// Load both tables from the persistence collaborator. A missing backing
    /// store yields empty tables, not an error.
    pub fn new(persistence: Box<dyn Persistence>) -> Result<Self, EngineError> {
        let (customers, codes) = persistence.load()?;
        info!(
            customers = customers.len(),
            codes = codes.len(),
            "referral engine loaded"
        );
        Ok(Self {
            customers: CustomerStore::from_rows(customers),
            ledger: ReferralLedger::from_rows(codes),
            persistence,
        })
    }

    /// Engine with the keep-nothing backend; used by tests and ephemeral runs.
    pub fn in_memory() -> Self {
        Self {
            customers: CustomerStore::new(),
            ledger: ReferralLedger::new(),
            persistence: Box::new(crate::persist::MemoryPersistence),
        }
    }

    pub fn customers(&self) -> &CustomerStore {
        &self.customers
    }

    pub fn ledger(&self) -> &ReferralLedger {
        &self.ledger
    }

    /// Whether the derived id for (name, phone) already occupies the store.
    /// Exact id collision, not name similarity.
    pub fn customer_exists(&self, name: &str, phone: &str) -> (bool, String) {
        let customer_id = generate_customer_id(name, phone);
        (self.customers.contains_id(&customer_id), customer_id)
    }

    /// Check a supplied code against format, existence, and status, in that
    /// order.
    pub fn validate_referral_code(&self, raw: &str) -> CodeCheck {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CodeCheck::NotProvided;
        }

        let code = trimmed.to_uppercase();
        if !CODE_FORMAT.is_match(&code) {
            return CodeCheck::Rejected(CodeRejection::BadFormat);
        }

        match self.ledger.get_code(&code) {
            None => CodeCheck::Rejected(CodeRejection::NotFound),
            Some(row) if row.status == CodeStatus::Used => {
                CodeCheck::Rejected(CodeRejection::AlreadyUsed {
                    used_by: row.used_by_name.clone(),
                })
            }
            Some(row) => CodeCheck::Valid {
                owner: CodeOwner {
                    customer_id: row.owner_customer_id.clone(),
                    name: row.owner_name.clone(),
                    phone: row.owner_phone.clone(),
                },
            },
        }
    }

    /// Register a new customer, optionally redeeming a referral code against
    /// its owner. First failing check wins; no partial state on failure.
    pub fn register_customer(
        &mut self,
        name: &str,
        phone: &str,
        referral_code: Option<&str>,
    ) -> Result<Registration, EngineError> {
        let (clean_name, clean_phone) = validate_input(name, phone)?;

        let (exists, customer_id) = self.customer_exists(&clean_name, &clean_phone);
        if exists {
            return Err(EngineError::DuplicateCustomer { customer_id });
        }

        let supplied = referral_code.map(str::trim).filter(|c| !c.is_empty());
        let mut referral_owner = None;
        if let Some(code) = supplied {
            match self.validate_referral_code(code) {
                CodeCheck::Rejected(rejection) => return Err(EngineError::InvalidCode(rejection)),
                CodeCheck::Valid { owner } => referral_owner = Some(owner),
                CodeCheck::NotProvided => {}
            }
        }

        let referred_by = match &referral_owner {
            Some(owner) => format!("Referred by {}", owner.name),
            None => "Direct Customer".to_string(),
        };

        let customer = Customer {
            customer_id: customer_id.clone(),
            name: clean_name.clone(),
            phone: clean_phone.clone(),
            registration_date: now_stamp(),
            referrals_completed: 0,
            discount_earned: false,
            referred_by,
            status: CustomerStatus::Active,
            total_purchases: 0,
            notes: String::new(),
        };

        let referral_codes = generate_referral_codes(&customer_id);

        // Customer and all three fresh codes land before any redemption side
        // effect: the new codes must exist but stay untouched.
        self.customers.insert(customer.clone());
        for code in &referral_codes {
            self.ledger.insert(ReferralCode::fresh(code, &customer));
        }

        if let (Some(code), Some(_owner)) = (supplied, &referral_owner) {
            self.redeem_code(code, &customer_id, &clean_name, &clean_phone)?;
        }

        let persisted = self.persist();
        info!(customer_id = %customer_id, persisted, "customer registered");

        Ok(Registration {
            customer_id,
            referral_codes,
            customer,
            persisted,
        })
    }

    /// Mark a code Used by the given consumer and recompute the owner's
    /// progress. Redeeming an already-Used code is a no-op that reports the
    /// existing consumer.
    pub fn redeem_code(
        &mut self,
        code: &str,
        consumer_id: &str,
        consumer_name: &str,
        consumer_phone: &str,
    ) -> Result<Redemption, EngineError> {
        let code = code.trim().to_uppercase();

        let owner_id = {
            let row = self
                .ledger
                .get_code_mut(&code)
                .ok_or(CodeRejection::NotFound)?;

            if row.status == CodeStatus::Used {
                return Ok(Redemption::AlreadyUsed {
                    used_by: row.used_by_name.clone(),
                });
            }

            row.used_by_customer_id = consumer_id.to_string();
            row.used_by_name = consumer_name.to_string();
            row.used_by_phone = consumer_phone.to_string();
            row.date_used = now_stamp();
            row.status = CodeStatus::Used;
            row.owner_customer_id.clone()
        };

        self.update_referral_progress(&owner_id);

        Ok(Redemption::Redeemed {
            owner_customer_id: owner_id,
        })
    }

    /// Recount the owner's Used codes and re-derive the discount flag.
    /// Monotonic: codes never un-use, so the flag never reverts.
    pub fn update_referral_progress(&mut self, owner_id: &str) {
        let used = self.ledger.used_count(owner_id);
        if let Some(customer) = self.customers.get_mut(owner_id) {
            customer.referrals_completed = used;
            if used >= CODES_PER_CUSTOMER as u32 && !customer.discount_earned {
                customer.discount_earned = true;
                info!(customer = %customer.name, "discount earned (3/3 referrals completed)");
            }
        }
    }

    /// Search id-substring, then name-substring, then phone-substring; the
    /// first non-empty stage's first row wins.
    pub fn get_customer_info(&self, search_term: &str) -> Result<CustomerProfile, EngineError> {
        let term = search_term.trim();
        if term.is_empty() {
            return Err(EngineError::NotFound {
                term: search_term.to_string(),
            });
        }

        let mut matches = self.customers.search_id(term);
        if matches.is_empty() {
            matches = self.customers.search_name(term);
        }
        if matches.is_empty() {
            matches = self.customers.search_phone(term);
        }

        let customer = matches
            .first()
            .copied()
            .ok_or_else(|| EngineError::NotFound {
                term: term.to_string(),
            })?;

        Ok(CustomerProfile {
            customer: customer.clone(),
            codes: self.referral_details(&customer.customer_id),
        })
    }

    /// Per-code status breakdown for one owner, in issue order.
    pub fn referral_details(&self, customer_id: &str) -> Vec<CodeDetail> {
        self.ledger
            .by_owner(customer_id)
            .into_iter()
            .map(|row| {
                let date: String = row.date_used.chars().take(10).collect();
                let used_info = match row.status {
                    CodeStatus::Used => format!("Used by {} on {}", row.used_by_name, date),
                    CodeStatus::Available => "Available for sharing".to_string(),
                };
                CodeDetail {
                    code: row.code.clone(),
                    status: row.status,
                    used_by_name: if row.status == CodeStatus::Used {
                        row.used_by_name.clone()
                    } else {
                        String::new()
                    },
                    date_used: date,
                    used_info,
                }
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Read-only aggregates for the answer layer
    // -------------------------------------------------------------------------

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    pub fn discount_earners(&self) -> Vec<&Customer> {
        self.customers.find(|c| c.discount_earned)
    }

    /// Top `n` customers by completed referrals, ties in insertion order.
    pub fn top_referrers(&self, n: usize) -> Vec<&Customer> {
        let mut all: Vec<&Customer> = self.customers.rows().iter().collect();
        all.sort_by(|a, b| b.referrals_completed.cmp(&a.referrals_completed));
        all.truncate(n);
        all
    }

    /// The `n` most recently registered customers, oldest first.
    pub fn recent_customers(&self, n: usize) -> Vec<&Customer> {
        let rows = self.customers.rows();
        rows[rows.len().saturating_sub(n)..].iter().collect()
    }

    pub fn code_usage(&self) -> CodeUsage {
        CodeUsage {
            total: self.ledger.len(),
            used: self.ledger.total_used(),
        }
    }

    fn persist(&self) -> bool {
        match self
            .persistence
            .save(self.customers.rows(), self.ledger.rows())
        {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "persistence failed; in-memory state kept");
                false
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
