//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An hourly rate below zero.
    #[error("rate must be non-negative, got {value}")]
    NegativeRate { value: Decimal },

    /// A rate string that is not a decimal number.
    #[error("invalid rate: {value}")]
    InvalidRate { value: String },

    /// An activity reference string in an unknown format.
    #[error("invalid activity reference: {value} (expected wo:<id>, qa:<id>, other:<text> or none)")]
    InvalidActivityRef { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated work order identifier.
    WorkOrderId, "work order ID"
);

define_string_id!(
    /// A validated quick-activity identifier.
    ///
    /// Quick activities are the short catalog entries (meetings, admin, travel)
    /// that are not tied to a work order.
    ActivityId, "activity ID"
);

define_string_id!(
    /// A validated time entry identifier.
    ///
    /// Entry IDs are UUIDs generated when a session is materialized.
    EntryId, "entry ID"
);

impl EntryId {
    /// Generates a fresh random entry ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// An hourly rate in currency units, never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    /// A rate of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Creates a rate after validation.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ValidationError::NegativeRate { value });
        }
        Ok(Self(value))
    }

    /// Creates a rate from a whole number of currency units.
    #[must_use]
    pub fn per_hour(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    /// Returns the inner decimal value.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl FromStr for Rate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| ValidationError::InvalidRate {
            value: s.to_string(),
        })?;
        Self::new(value)
    }
}

/// What the running session is being tracked against.
///
/// Exactly one variant is active. Consumers match exhaustively rather than
/// probing for whichever field happens to be set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActivityRef {
    /// A billable or non-billable work order from the catalog.
    WorkOrder(WorkOrderId),
    /// A quick activity from the catalog.
    QuickActivity(ActivityId),
    /// A free-text reason entered by the user.
    OtherReason(String),
    /// Nothing selected.
    #[default]
    None,
}

impl ActivityRef {
    /// Returns true if nothing is selected.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for ActivityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkOrder(id) => write!(f, "wo:{id}"),
            Self::QuickActivity(id) => write!(f, "qa:{id}"),
            Self::OtherReason(text) => write!(f, "other:{text}"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for ActivityRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "none" {
            return Ok(Self::None);
        }
        let invalid = || ValidationError::InvalidActivityRef {
            value: s.to_string(),
        };
        let (prefix, rest) = s.split_once(':').ok_or_else(invalid)?;
        match prefix {
            "wo" => Ok(Self::WorkOrder(WorkOrderId::new(rest)?)),
            "qa" => Ok(Self::QuickActivity(ActivityId::new(rest)?)),
            "other" => {
                let text = rest.trim();
                if text.is_empty() {
                    return Err(ValidationError::Empty { field: "reason" });
                }
                Ok(Self::OtherReason(text.to_string()))
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_order_id_rejects_empty() {
        assert!(WorkOrderId::new("").is_err());
        assert!(WorkOrderId::new("WO-1042").is_ok());
    }

    #[test]
    fn entry_id_serde_rejects_empty() {
        let result: Result<EntryId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn generated_entry_ids_are_unique() {
        assert_ne!(EntryId::generate(), EntryId::generate());
    }

    #[test]
    fn rate_rejects_negative() {
        assert!(Rate::new(Decimal::from(-1)).is_err());
        assert!(Rate::new(Decimal::ZERO).is_ok());
        assert!("-0.5".parse::<Rate>().is_err());
        assert!("abc".parse::<Rate>().is_err());
        assert_eq!("500".parse::<Rate>().unwrap(), Rate::per_hour(500));
    }

    #[test]
    fn rate_serde_rejects_negative() {
        let result: Result<Rate, _> = serde_json::from_str("\"-3\"");
        assert!(result.is_err());
        let parsed: Rate = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(parsed.to_string(), "12.5");
    }

    #[test]
    fn activity_ref_parses_every_variant() {
        assert_eq!(
            "wo:WO-7".parse::<ActivityRef>().unwrap(),
            ActivityRef::WorkOrder(WorkOrderId::new("WO-7").unwrap())
        );
        assert_eq!(
            "qa:meeting".parse::<ActivityRef>().unwrap(),
            ActivityRef::QuickActivity(ActivityId::new("meeting").unwrap())
        );
        assert_eq!(
            "other: waiting on parts ".parse::<ActivityRef>().unwrap(),
            ActivityRef::OtherReason("waiting on parts".to_string())
        );
        assert_eq!("none".parse::<ActivityRef>().unwrap(), ActivityRef::None);
    }

    #[test]
    fn activity_ref_rejects_malformed() {
        assert!("WO-7".parse::<ActivityRef>().is_err());
        assert!("xx:1".parse::<ActivityRef>().is_err());
        assert!("wo:".parse::<ActivityRef>().is_err());
        assert!("other:   ".parse::<ActivityRef>().is_err());
    }

    #[test]
    fn activity_ref_display_parses_back() {
        let reference = ActivityRef::QuickActivity(ActivityId::new("travel").unwrap());
        let parsed: ActivityRef = reference.to_string().parse().unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn activity_ref_serde_is_tagged() {
        let reference = ActivityRef::WorkOrder(WorkOrderId::new("WO-1").unwrap());
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, r#"{"kind":"work_order","value":"WO-1"}"#);
        let none = serde_json::to_string(&ActivityRef::None).unwrap();
        assert_eq!(none, r#"{"kind":"none"}"#);
    }
}
