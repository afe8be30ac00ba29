//! Ledger entities and transaction categorization.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// A bank account as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Provider-assigned account id.
    #[serde(alias = "resourceId")]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// ISO 4217 currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
}

/// A normalized ledger transaction.
///
/// Positive amounts are outflows (money spent), matching the upstream
/// provider's sign convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable transaction id.
    pub id: String,

    /// Booking date.
    pub date: NaiveDate,

    /// Amount in account currency; positive = outflow.
    pub amount: f64,

    /// ISO 4217 currency code.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Counterparty name.
    #[serde(default)]
    pub merchant: String,

    /// Free-text remittance information.
    #[serde(default)]
    pub description: String,

    /// Owning account id.
    #[serde(default)]
    pub account_id: String,

    /// End-to-end reference, falling back to the transaction id upstream.
    #[serde(default)]
    pub reference: String,
}

fn default_currency() -> String {
    "GBP".to_string()
}

impl Transaction {
    /// True when the transaction spends money.
    #[must_use]
    pub fn is_outflow(&self) -> bool {
        self.amount > 0.0
    }

    /// Category derived from merchant and description.
    #[must_use]
    pub fn category(&self) -> Category {
        categorize(&self.merchant, &self.description)
    }
}

/// Spending category assigned by keyword rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Groceries,
    EatingOut,
    Transport,
    Bills,
    Entertainment,
    Shopping,
    Health,
    Rent,
    Other,
}

impl Category {
    /// Stable snake_case name used in tool responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Groceries => "groceries",
            Self::EatingOut => "eating_out",
            Self::Transport => "transport",
            Self::Bills => "bills",
            Self::Entertainment => "entertainment",
            Self::Shopping => "shopping",
            Self::Health => "health",
            Self::Rent => "rent",
            Self::Other => "other",
        }
    }
}

/// Keyword rules per category. First match wins, checked in declaration order.
const CATEGORY_RULES: &[(Category, &str)] = &[
    (Category::Groceries, r"tesco|sainsbury|asda|lidl|aldi|market|co-?op"),
    (
        Category::EatingOut,
        r"restaurant|cafe|pizza|burger|pub|bar|coffee|deliveroo|uber eats|just eat|nandos?|costa|starbucks|pret",
    ),
    (
        Category::Transport,
        r"uber|taxi|bus|train|petrol|fuel|parking|shell|bp|esso|tfl|transport for london",
    ),
    (
        Category::Bills,
        r"electricity|gas|water|internet|phone|insurance|british gas|vodafone|ee|broadband|council( tax)?|thames water|admiral",
    ),
    (
        Category::Entertainment,
        r"netflix|spotify|cinema|theatre|steam|xbox|playstation|disney|amazon prime|vue",
    ),
    (Category::Shopping, r"amazon|ebay|asos|zara|h&m|primark|next|argos"),
    (Category::Health, r"pharmacy|doctor|dentist|gym|fitness|boots|pure gym"),
    (Category::Rent, r"rent|lease|landlord|property management"),
];

static CATEGORY_MATCHER: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(CATEGORY_RULES.iter().map(|(_, pattern)| format!("(?i){pattern}")))
        .expect("category rules are valid regexes")
});

/// Categorize by merchant and description keyword rules.
#[must_use]
pub fn categorize(merchant: &str, description: &str) -> Category {
    let haystack = format!("{merchant} {description}");
    CATEGORY_MATCHER
        .matches(&haystack)
        .iter()
        .next()
        .map_or(Category::Other, |idx| CATEGORY_RULES[idx].0)
}
