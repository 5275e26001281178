use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Trading recommendation emitted by the forecast model or called out in an
/// analyst reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

/// Coarse direction of a signal, used by front ends for colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Neutral,
    Bearish,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::StrongBuy => "STRONG BUY",
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
            Signal::StrongSell => "STRONG SELL",
        }
    }

    /// Case-insensitive parse; runs of whitespace between words are accepted.
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        match normalized.as_str() {
            "STRONG BUY" => Some(Signal::StrongBuy),
            "BUY" => Some(Signal::Buy),
            "HOLD" => Some(Signal::Hold),
            "SELL" => Some(Signal::Sell),
            "STRONG SELL" => Some(Signal::StrongSell),
            _ => None,
        }
    }

    pub fn all() -> Vec<Signal> {
        vec![
            Signal::StrongBuy,
            Signal::Buy,
            Signal::Hold,
            Signal::Sell,
            Signal::StrongSell,
        ]
    }

    pub fn bias(&self) -> Bias {
        match self {
            Signal::StrongBuy | Signal::Buy => Bias::Bullish,
            Signal::Hold => Bias::Neutral,
            Signal::Sell | Signal::StrongSell => Bias::Bearish,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Wire form is the display text ("STRONG BUY"), matching what the forecast
// service returns.
impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Signal::from_str(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown signal: {raw}")))
    }
}
