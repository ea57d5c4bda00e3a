use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Card networks a payment can be routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Network {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Accel,
    Star,
    Nyce,
    Pulse,
    Maestro,
}

impl Network {
    pub const ALL: [Network; 9] = [
        Network::Visa,
        Network::Mastercard,
        Network::Amex,
        Network::Discover,
        Network::Accel,
        Network::Star,
        Network::Nyce,
        Network::Pulse,
        Network::Maestro,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Network::Visa => "Visa",
            Network::Mastercard => "Mastercard",
            Network::Amex => "American Express",
            Network::Discover => "Discover",
            Network::Accel => "Accel",
            Network::Star => "Star",
            Network::Nyce => "NYCE",
            Network::Pulse => "Pulse",
            Network::Maestro => "Maestro",
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Network::Visa => "VISA",
            Network::Mastercard => "MASTERCARD",
            Network::Amex => "AMEX",
            Network::Discover => "DISCOVER",
            Network::Accel => "ACCEL",
            Network::Star => "STAR",
            Network::Nyce => "NYCE",
            Network::Pulse => "PULSE",
            Network::Maestro => "MAESTRO",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Network::ALL
            .into_iter()
            .find(|n| n.code() == wanted)
            .ok_or_else(|| format!("unknown network '{}'", s))
    }
}

/// How the card is presented to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    Pan,
    Token,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Pan => f.write_str("pan"),
            Representation::Token => f.write_str("token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse_round_trip() {
        for network in Network::ALL {
            assert_eq!(network.to_string().parse::<Network>().unwrap(), network);
        }
        assert_eq!(" nyce ".parse::<Network>().unwrap(), Network::Nyce);
        assert!("JCB".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_serde_uses_upper_case() {
        let json = serde_json::to_string(&Network::Mastercard).unwrap();
        assert_eq!(json, "\"MASTERCARD\"");
    }
}
