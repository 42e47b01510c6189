//! Validated value types shared by the notifier crates.
//!
//! Every type here guarantees its invariant once constructed, so code further in can take a
//! `Pincode` or `MobileNumber` without re-checking digits and lengths:
//!
//! - [`Pincode`]: exactly 6 ASCII digits (Indian postal code)
//! - [`MobileNumber`]: exactly 10 ASCII digits
//! - [`Otp`]: exactly 6 ASCII digits
//! - [`DistrictId`]: numeric district identifier issued by the availability API
//! - [`UserId`]: opaque, non-empty chat-platform user identifier

use std::str::FromStr;

/// Errors that can occur when creating validated value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input was not a run of exactly `expected` ASCII digits
    #[error("{kind} must be exactly {expected} digits, got {input:?}")]
    WrongDigits {
        kind: &'static str,
        expected: usize,
        input: String,
    },
    /// The input was not a valid district identifier
    #[error("invalid district id: {0:?}")]
    InvalidDistrictId(String),
}

/// Result type for value construction.
pub type ValueResult<T> = Result<T, ValueError>;

/// Returns `true` if `input` is exactly `len` ASCII digits.
pub fn is_fixed_digits(input: &str, len: usize) -> bool {
    input.len() == len && input.bytes().all(|b| b.is_ascii_digit())
}

/// Returns `true` if `input` is a non-empty run of ASCII digits.
pub fn is_all_digits(input: &str) -> bool {
    !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit())
}

/// Declares a string newtype that only accepts a fixed number of ASCII digits.
macro_rules! fixed_digit_string {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Number of digits required.
            pub const LEN: usize = $len;

            /// Validates and wraps the input. Surrounding whitespace is trimmed first.
            pub fn parse(input: impl AsRef<str>) -> ValueResult<Self> {
                let trimmed = input.as_ref().trim();
                if !is_fixed_digits(trimmed, Self::LEN) {
                    return Err(ValueError::WrongDigits {
                        kind: $kind,
                        expected: Self::LEN,
                        input: trimmed.to_owned(),
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_digit_string!(
    /// A six-digit postal code.
    Pincode,
    "pincode",
    6
);

fixed_digit_string!(
    /// A ten-digit mobile number, without country prefix.
    MobileNumber,
    "mobile number",
    10
);

fixed_digit_string!(
    /// A six-digit one-time password.
    Otp,
    "OTP",
    6
);

/// Numeric district identifier as issued by the availability API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct DistrictId(u32);

impl DistrictId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DistrictId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DistrictId {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| ValueError::InvalidDistrictId(s.to_owned()))
    }
}

/// Opaque per-platform user identifier.
///
/// The input is trimmed of leading and trailing whitespace during construction and must not be
/// empty afterwards. Nothing else is assumed about its shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// Creates a new `UserId`, rejecting empty or whitespace-only input.
    pub fn new(input: impl AsRef<str>) -> ValueResult<Self> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValueError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for UserId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UserId::new(&s).map_err(serde::de::Error::custom)
    }
}
