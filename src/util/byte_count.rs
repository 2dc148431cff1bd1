//! CLI helper - byte counts with an optional SI multiplier
// (c) 2024 Ross Younger

use std::{fmt::Display, str::FromStr};

/// A number of bytes, written as digits with an optional `k`, `M` or `G` suffix
/// (multiplying by 10^3, 10^6 or 10^9 respectively).
///
/// For example, `1500`, `20k` and `1G` are all valid.
/// Suffixes are case sensitive; `m` is not `M`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteCount(pub u64);

impl ByteCount {
    /// Accessor
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<ByteCount> for u64 {
    fn from(value: ByteCount) -> Self {
        value.0
    }
}

impl Display for ByteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ByteCount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        if digits.is_empty() {
            anyhow::bail!("improper size format `{s}`");
        }
        let multiplier: u64 = match suffix {
            "" => 1,
            "k" => 1_000,
            "M" => 1_000_000,
            "G" => 1_000_000_000,
            _ => anyhow::bail!("size multiplier must be one of [kMG], not `{suffix}`"),
        };
        let value: u64 = digits
            .parse()
            .map_err(|e| anyhow::anyhow!("improper size format `{s}`: {e}"))?;
        value
            .checked_mul(multiplier)
            .map(Self)
            .ok_or_else(|| anyhow::anyhow!("size `{s}` is too large"))
    }
}
