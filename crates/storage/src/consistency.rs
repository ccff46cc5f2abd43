use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many replicas must acknowledge a write before it counts as applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    One,
    #[default]
    Quorum,
    All,
}

impl Consistency {
    /// Acknowledgements needed under a replication factor of `rf`.
    pub fn required_acks(self, rf: u32) -> u32 {
        match self {
            Consistency::One => 1,
            Consistency::Quorum => rf / 2 + 1,
            Consistency::All => rf.max(1),
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Consistency::One => "ONE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
        })
    }
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" => Ok(Consistency::One),
            "quorum" => Ok(Consistency::Quorum),
            "all" => Ok(Consistency::All),
            other => Err(format!("unknown consistency level: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_is_a_majority() {
        assert_eq!(Consistency::Quorum.required_acks(1), 1);
        assert_eq!(Consistency::Quorum.required_acks(3), 2);
        assert_eq!(Consistency::Quorum.required_acks(4), 3);
        assert_eq!(Consistency::All.required_acks(3), 3);
        assert_eq!(Consistency::One.required_acks(5), 1);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("QUORUM".parse::<Consistency>().unwrap(), Consistency::Quorum);
        assert_eq!(" one ".parse::<Consistency>().unwrap(), Consistency::One);
        assert!("local_quorum".parse::<Consistency>().is_err());
    }
}
