use std::{fmt::Display, num::ParseIntError, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use strum::{AsRefStr, EnumIter, EnumString};

/// Delivery, batching and retry behaviour of an output.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTuningSpec {
    /// Either `atLeastOnce` (block and buffer on disk) or `atMostOnce` (drop when full).
    #[serde(default)]
    pub delivery_mode: Option<String>,

    /// Compression of the payload, the allowed values depend on the output type.
    #[serde(default)]
    pub compression: Option<String>,

    /// Maximum size of a single batch, e.g. `10M` or `1Mi`.
    #[serde(default)]
    pub max_write: Option<IntOrString>,

    /// Minimum wait between retries, e.g. `5s`.
    #[serde(default)]
    pub min_retry_duration: Option<IntOrString>,

    /// Maximum wait between retries, e.g. `1m`.
    #[serde(default)]
    pub max_retry_duration: Option<IntOrString>,
}

#[derive(AsRefStr, Clone, Copy, Debug, EnumIter, EnumString, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "camelCase")]
pub enum DeliveryMode {
    AtLeastOnce,
    AtMostOnce,
}

/// A value which is either written as a number or as a string, like Kubernetes'
/// `IntOrString`.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(i64),
    String(String),
}

impl Display for IntOrString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseQuantityError {
    #[snafu(display("input is either empty or negative"))]
    InvalidFormat,

    #[snafu(display("failed to parse number"))]
    InvalidNumber { source: ParseIntError },

    #[snafu(display("unknown suffix {suffix:?}"))]
    InvalidSuffix { suffix: String },

    #[snafu(display("value is too large"))]
    Overflow,
}

/// Number of bytes, parsed from an integer or a quantity with a decimal (`k`, `M`, `G`, `T`)
/// or binary (`Ki`, `Mi`, `Gi`, `Ti`) suffix.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct ByteQuantity(pub u64);

impl FromStr for ByteQuantity {
    type Err = ParseQuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        ensure!(!input.is_empty(), InvalidFormatSnafu);

        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        let (number, suffix) = input.split_at(split);
        ensure!(!number.is_empty(), InvalidFormatSnafu);

        let value: u64 = number.parse().context(InvalidNumberSnafu)?;
        let factor: u64 = match suffix {
            "" => 1,
            "k" | "K" => 1000,
            "M" => 1000u64.pow(2),
            "G" => 1000u64.pow(3),
            "T" => 1000u64.pow(4),
            "Ki" => 1 << 10,
            "Mi" => 1 << 20,
            "Gi" => 1 << 30,
            "Ti" => 1 << 40,
            suffix => return InvalidSuffixSnafu { suffix }.fail(),
        };

        value.checked_mul(factor).map(Self).ok_or(ParseQuantityError::Overflow)
    }
}

impl TryFrom<&IntOrString> for ByteQuantity {
    type Error = ParseQuantityError;

    fn try_from(value: &IntOrString) -> Result<Self, Self::Error> {
        match value {
            IntOrString::Int(i) => u64::try_from(*i)
                .map(Self)
                .map_err(|_| ParseQuantityError::InvalidFormat),
            IntOrString::String(s) => s.parse(),
        }
    }
}

/// A duration in whole seconds, parsed from an integer or from strings like `30s`, `5m` or
/// `1h30m`.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Seconds(pub u64);

impl FromStr for Seconds {
    type Err = ParseQuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut rest = input.trim();
        ensure!(!rest.is_empty(), InvalidFormatSnafu);

        let mut total: u64 = 0;
        while !rest.is_empty() {
            let split = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            let (number, tail) = rest.split_at(split);
            ensure!(!number.is_empty(), InvalidFormatSnafu);
            let value: u64 = number.parse().context(InvalidNumberSnafu)?;

            let unit_len = tail
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(tail.len());
            let (unit, next) = tail.split_at(unit_len);
            let factor = match unit {
                "" | "s" => 1,
                "m" => 60,
                "h" => 3600,
                "d" => 86400,
                suffix => return InvalidSuffixSnafu { suffix }.fail(),
            };

            total = value
                .checked_mul(factor)
                .and_then(|v| total.checked_add(v))
                .ok_or(ParseQuantityError::Overflow)?;
            rest = next;
        }

        Ok(Self(total))
    }
}

impl TryFrom<&IntOrString> for Seconds {
    type Error = ParseQuantityError;

    fn try_from(value: &IntOrString) -> Result<Self, Self::Error> {
        match value {
            IntOrString::Int(i) => u64::try_from(*i)
                .map(Self)
                .map_err(|_| ParseQuantityError::InvalidFormat),
            IntOrString::String(s) => s.parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("1024", 1024)]
    #[case("10M", 10_000_000)]
    #[case("1Mi", 1_048_576)]
    #[case("2k", 2000)]
    #[case("1Gi", 1_073_741_824)]
    fn parses_byte_quantities(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(input.parse::<ByteQuantity>(), Ok(ByteQuantity(expected)));
    }

    #[rstest]
    #[case("", ParseQuantityError::InvalidFormat)]
    #[case("Mi", ParseQuantityError::InvalidFormat)]
    #[case("10Xi", ParseQuantityError::InvalidSuffix { suffix: "Xi".to_owned() })]
    fn rejects_invalid_byte_quantities(#[case] input: &str, #[case] expected: ParseQuantityError) {
        assert_eq!(input.parse::<ByteQuantity>(), Err(expected));
    }

    #[rstest]
    #[case("30", 30)]
    #[case("5s", 5)]
    #[case("2m", 120)]
    #[case("1h30m", 5400)]
    fn parses_durations(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(input.parse::<Seconds>(), Ok(Seconds(expected)));
    }

    #[test]
    fn converts_int_or_string() {
        assert_eq!(
            Seconds::try_from(&IntOrString::Int(10)),
            Ok(Seconds(10))
        );
        assert_eq!(
            ByteQuantity::try_from(&IntOrString::String("1Ki".to_owned())),
            Ok(ByteQuantity(1024))
        );
        assert_eq!(
            ByteQuantity::try_from(&IntOrString::Int(-1)),
            Err(ParseQuantityError::InvalidFormat)
        );
    }
}
