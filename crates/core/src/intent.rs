//! Chat command interpretation.
//!
//! [`CommandInterpreter`] turns a raw chat message into an [`Intent`]. Parsing never fails:
//! text that does not fit a rule falls through to the next one, and whatever is left becomes a
//! [`Intent::Query`] with empty fields.
//!
//! ## Grammar
//!
//! ```text
//! <trigger> help
//! <trigger> setup <pincode|district> [age]
//! <trigger> unsubscribe
//! <trigger> otp <mobile>
//! <trigger> verify <mobile> <otp>
//! <trigger> me <mobile>
//! <trigger> [<n>d] [<pincode>...|<district>] [age]
//! <trigger><n> [<pincode>...|<district>] [age]
//! ```
//!
//! ## Precedence
//!
//! Rules are applied in this order, first match wins:
//!
//! 1. The first token must be the trigger word, otherwise the message is ignored (`None`).
//!    `<trigger><n>` (digits glued to the trigger) is a query `n` days ahead.
//! 2. The second token is compared, case-sensitively, with the subcommand keywords. A district
//!    literally called `help` therefore cannot be queried without another word.
//! 3. Anything else is a query:
//!    - a *leading* `<n>d` token (1-3 digits) sets the day offset;
//!    - a *trailing* two-digit token is an age, mapped to an [`AgeTier`];
//!    - every remaining all-digit token is a pincode candidate;
//!    - only when there are no pincode candidates, the remaining tokens made of letters and
//!      parentheses form a lower-cased district keyword.
//! 4. No pincode and no keyword leaves the location [`LocationToken::Unspecified`].

use notifier_types::{is_all_digits, is_fixed_digits, MobileNumber, Otp};
use serde::{Deserialize, Serialize};

/// Minimum-age tier. The numeric threshold is what the availability API reports as
/// `min_age_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeTier {
    Under45,
    #[default]
    FortyFivePlus,
}

impl AgeTier {
    /// Map an age to the nearest supported tier.
    pub fn from_age(age: u32) -> Self {
        if age < 45 {
            AgeTier::Under45
        } else {
            AgeTier::FortyFivePlus
        }
    }

    pub fn threshold(self) -> u32 {
        match self {
            AgeTier::Under45 => 18,
            AgeTier::FortyFivePlus => 45,
        }
    }
}

impl std::fmt::Display for AgeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+", self.threshold())
    }
}

/// Where a query or setup should look. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LocationToken {
    /// All-digit tokens, in message order. Six-digit ones are valid pincodes; the resolver
    /// reports the others individually.
    Pincodes(Vec<String>),
    /// Lower-cased, trimmed, never empty.
    DistrictKeyword(String),
    /// Use the subscriber's stored preference.
    #[default]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryIntent {
    pub date_offset_days: u32,
    pub location: LocationToken,
    /// `None` when the message carried no age.
    pub age_tier: Option<AgeTier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Help,
    Setup {
        location: LocationToken,
        age_tier: Option<AgeTier>,
    },
    Unsubscribe,
    RequestOtp {
        mobile: Option<MobileNumber>,
    },
    VerifyOtp {
        mobile: Option<MobileNumber>,
        otp: Option<Otp>,
    },
    MeLookup {
        mobile: Option<MobileNumber>,
    },
    Query(QueryIntent),
}

/// Parses raw chat messages addressed to a fixed trigger word.
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    trigger: String,
}

impl CommandInterpreter {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    /// Parse a raw message.
    ///
    /// Returns `None` when the message is not addressed to this bot; every other message yields
    /// an intent.
    pub fn parse(&self, raw: &str) -> Option<Intent> {
        let mut tokens = raw.split_whitespace();
        let head = tokens.next()?;
        let rest: Vec<&str> = tokens.collect();

        if head == self.trigger {
            return Some(parse_body(&rest));
        }

        let days = head
            .strip_prefix(self.trigger.as_str())
            .and_then(parse_glued_offset)?;
        let mut query = parse_query(&rest);
        query.date_offset_days = days;
        Some(Intent::Query(query))
    }
}

/// Parse the tokens that follow the trigger word.
pub fn parse_body(tokens: &[&str]) -> Intent {
    let Some((keyword, args)) = tokens.split_first() else {
        return Intent::Query(QueryIntent::default());
    };

    match *keyword {
        "help" => Intent::Help,
        "setup" => {
            let (location, age_tier) = parse_location_args(args);
            Intent::Setup { location, age_tier }
        }
        "unsubscribe" => Intent::Unsubscribe,
        "otp" => Intent::RequestOtp {
            mobile: first_mobile(args),
        },
        "verify" => Intent::VerifyOtp {
            mobile: first_mobile(args),
            otp: args.iter().find_map(|t| Otp::parse(t).ok()),
        },
        "me" => Intent::MeLookup {
            mobile: first_mobile(args),
        },
        _ => Intent::Query(parse_query(tokens)),
    }
}

fn parse_query(tokens: &[&str]) -> QueryIntent {
    let (date_offset_days, rest) = match tokens.split_first() {
        Some((first, tail)) => match parse_day_offset(first) {
            Some(days) => (days, tail),
            None => (0, tokens),
        },
        None => (0, tokens),
    };

    let (location, age_tier) = parse_location_args(rest);
    QueryIntent {
        date_offset_days,
        location,
        age_tier,
    }
}

fn parse_location_args(tokens: &[&str]) -> (LocationToken, Option<AgeTier>) {
    let (age_tier, rest) = match tokens.split_last() {
        Some((last, head)) if is_fixed_digits(last, 2) => {
            let age = last.parse::<u32>().ok().map(AgeTier::from_age);
            (age, head)
        }
        _ => (None, tokens),
    };

    let pincodes: Vec<String> = rest
        .iter()
        .filter(|t| is_all_digits(t))
        .map(|t| t.to_string())
        .collect();
    if !pincodes.is_empty() {
        return (LocationToken::Pincodes(pincodes), age_tier);
    }

    let keyword = rest
        .iter()
        .filter(|t| is_keyword_token(t))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let keyword = keyword.trim();

    let location = if keyword.is_empty() {
        LocationToken::Unspecified
    } else {
        LocationToken::DistrictKeyword(keyword.to_string())
    };
    (location, age_tier)
}

/// `<n>d` with one to three digits.
fn parse_day_offset(token: &str) -> Option<u32> {
    let digits = token.strip_suffix('d')?;
    parse_glued_offset(digits)
}

/// One to three digits, as glued to the trigger (`!vaccine7`) or before a `d`.
fn parse_glued_offset(digits: &str) -> Option<u32> {
    if (1..=3).contains(&digits.len()) && is_all_digits(digits) {
        digits.parse().ok()
    } else {
        None
    }
}

fn is_keyword_token(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_alphabetic() || c == '(' || c == ')')
}

fn first_mobile(tokens: &[&str]) -> Option<MobileNumber> {
    tokens.iter().find_map(|t| MobileNumber::parse(t).ok())
}
