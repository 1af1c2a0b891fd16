// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::PositiveCountParseError;
use serde::Deserialize;
use std::{fmt, str::FromStr, time::Duration};

/// Type for the `race.width` and `load.batch-size` config keys.
///
/// Zero is rejected both in config files and on the command line.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PositiveCount(usize);

impl PositiveCount {
    /// Creates a new count, returning `None` if `count` is zero.
    pub fn new(count: usize) -> Option<Self> {
        (count > 0).then_some(Self(count))
    }

    /// Returns the count.
    pub fn get(self) -> usize {
        self.0
    }
}

impl FromStr for PositiveCount {
    type Err = PositiveCountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<usize>() {
            Err(e) => Err(PositiveCountParseError::new(format!(
                "error: {e} parsing {s}"
            ))),
            Ok(0) => Err(PositiveCountParseError::new("value may not be 0")),
            Ok(count) => Ok(Self(count)),
        }
    }
}

impl fmt::Display for PositiveCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PositiveCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = PositiveCount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a positive integer")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match usize::try_from(v).ok().and_then(PositiveCount::new) {
                    Some(count) => Ok(count),
                    None => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match usize::try_from(v).ok().and_then(PositiveCount::new) {
                    Some(count) => Ok(count),
                    None => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Race mode settings stored within a profile.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(in crate::config) struct RaceConfigImpl {
    #[serde(default)]
    pub(in crate::config) width: Option<PositiveCount>,
    #[serde(default, with = "humantime_serde::option")]
    pub(in crate::config) global_timeout: Option<Duration>,
}

/// Load mode settings stored within a profile.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(in crate::config) struct LoadConfigImpl {
    #[serde(default)]
    pub(in crate::config) batch_size: Option<PositiveCount>,
    #[serde(default, with = "humantime_serde::option")]
    pub(in crate::config) global_timeout: Option<Duration>,
}

/// JUnit settings stored within a profile.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(in crate::config) struct JunitImpl {
    #[serde(default)]
    pub(in crate::config) enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1", Some(1); "one")]
    #[test_case("40", Some(40); "forty")]
    #[test_case("0", None; "zero is rejected")]
    #[test_case("-3", None; "negative is rejected")]
    #[test_case("many", None; "not a number")]
    fn positive_count_from_str(input: &str, expected: Option<usize>) {
        let parsed = input.parse::<PositiveCount>().ok().map(PositiveCount::get);
        assert_eq!(parsed, expected);
    }
}
