//! In-memory customer and referral-code tables.
//!
//! Both tables preserve insertion order and are owned exclusively by the
//! [`ReferralEngine`](crate::engine::ReferralEngine), which is their sole
//! writer. Lookups are case-insensitive substring matches unless the method
//! name says otherwise. There is no delete.

use serde::{Deserialize, Serialize};

// =============================================================================
// STATUS ENUMS
// =============================================================================

/// Lifecycle state of a referral code. One-way: Available -> Used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    Available,
    Used,
}

impl CodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Used => "Used",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Used" => Self::Used,
            _ => Self::Available,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
}

impl CustomerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "Inactive" => Self::Inactive,
            _ => Self::Active,
        }
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A registered customer.
///
/// `customer_id` is derived from name + phone and unique across the store.
/// `referrals_completed` always equals the count of this customer's Used
/// codes in the ledger; `discount_earned` is true iff that count is >= 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub phone: String,
    /// Stamped once at registration, `%Y-%m-%d %H:%M:%S`.
    pub registration_date: String,
    pub referrals_completed: u32,
    pub discount_earned: bool,
    /// "Direct Customer" or "Referred by {name}".
    pub referred_by: String,
    pub status: CustomerStatus,
    pub total_purchases: i64,
    pub notes: String,
}

/// A single-use referral code.
///
/// Owner identity is denormalized onto the row so validation messages don't
/// need a second lookup. The `used_by_*` fields and `date_used` are empty
/// strings until the code is redeemed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCode {
    pub code: String,
    pub owner_customer_id: String,
    pub owner_name: String,
    pub owner_phone: String,
    pub used_by_customer_id: String,
    pub used_by_name: String,
    pub used_by_phone: String,
    pub date_used: String,
    pub status: CodeStatus,
    pub notes: String,
}

impl ReferralCode {
    /// A fresh Available code owned by `owner`.
    pub fn fresh(code: impl Into<String>, owner: &Customer) -> Self {
        Self {
            code: code.into(),
            owner_customer_id: owner.customer_id.clone(),
            owner_name: owner.name.clone(),
            owner_phone: owner.phone.clone(),
            used_by_customer_id: String::new(),
            used_by_name: String::new(),
            used_by_phone: String::new(),
            date_used: String::new(),
            status: CodeStatus::Available,
            notes: String::new(),
        }
    }
}

// =============================================================================
// CUSTOMER STORE
// =============================================================================

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Insertion-ordered customer table.
#[derive(Debug, Default, Clone)]
pub struct CustomerStore {
    rows: Vec<Customer>,
}

impl CustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Customer>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Customer] {
        &self.rows
    }

    pub fn insert(&mut self, customer: Customer) {
        self.rows.push(customer);
    }

    /// Matches in insertion order.
    pub fn find(&self, predicate: impl Fn(&Customer) -> bool) -> Vec<&Customer> {
        self.rows.iter().filter(|c| predicate(c)).collect()
    }

    /// Exact-id lookup.
    pub fn get(&self, customer_id: &str) -> Option<&Customer> {
        self.rows.iter().find(|c| c.customer_id == customer_id)
    }

    pub fn get_mut(&mut self, customer_id: &str) -> Option<&mut Customer> {
        self.rows.iter_mut().find(|c| c.customer_id == customer_id)
    }

    pub fn contains_id(&self, customer_id: &str) -> bool {
        self.get(customer_id).is_some()
    }

    /// Case-insensitive id-substring search.
    pub fn search_id(&self, term: &str) -> Vec<&Customer> {
        self.find(|c| contains_ci(&c.customer_id, term))
    }

    /// Case-insensitive name-substring search.
    pub fn search_name(&self, term: &str) -> Vec<&Customer> {
        self.find(|c| contains_ci(&c.name, term))
    }

    /// Phone-substring search.
    pub fn search_phone(&self, term: &str) -> Vec<&Customer> {
        self.find(|c| c.phone.contains(term))
    }
}

// =============================================================================
// REFERRAL LEDGER
// =============================================================================

/// Insertion-ordered referral-code table.
#[derive(Debug, Default, Clone)]
pub struct ReferralLedger {
    rows: Vec<ReferralCode>,
}

impl ReferralLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<ReferralCode>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ReferralCode] {
        &self.rows
    }

    pub fn insert(&mut self, code: ReferralCode) {
        self.rows.push(code);
    }

    pub fn find(&self, predicate: impl Fn(&ReferralCode) -> bool) -> Vec<&ReferralCode> {
        self.rows.iter().filter(|r| predicate(r)).collect()
    }

    /// Exact-code lookup (codes are stored uppercase).
    pub fn get_code(&self, code: &str) -> Option<&ReferralCode> {
        self.rows.iter().find(|r| r.code == code)
    }

    pub fn get_code_mut(&mut self, code: &str) -> Option<&mut ReferralCode> {
        self.rows.iter_mut().find(|r| r.code == code)
    }

    /// All codes owned by `customer_id`, in issue order.
    pub fn by_owner(&self, customer_id: &str) -> Vec<&ReferralCode> {
        self.find(|r| r.owner_customer_id == customer_id)
    }

    /// Count of Used codes owned by `customer_id`.
    pub fn used_count(&self, customer_id: &str) -> u32 {
        self.rows
            .iter()
            .filter(|r| r.owner_customer_id == customer_id && r.status == CodeStatus::Used)
            .count() as u32
    }

    pub fn total_used(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.status == CodeStatus::Used)
            .count()
    }
}

// =============================================================================
// TESTS
// =============================================================================
