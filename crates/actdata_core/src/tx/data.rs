use serde::{Deserialize, Serialize};

/// Payload name used when an extended commit carries no client data.
pub const UNDEFINED_TX_NAME: &str = "### Error: undefined";

/// Primitive stored in a transaction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TxDatum {
    Int(i32),
    Real(f64),
    Bool(bool),
    Str(String),
}

/// Ordered client data attached to a committed command.
///
/// By convention the first string datum names the command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxData {
    items: Vec<TxDatum>,
}

impl TxData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload holding a single name datum.
    pub fn named(name: &str) -> Self {
        Self {
            items: vec![TxDatum::Str(name.to_string())],
        }
    }

    pub fn with(mut self, datum: TxDatum) -> Self {
        self.items.push(datum);
        self
    }

    pub fn push(&mut self, datum: TxDatum) {
        self.items.push(datum);
    }

    pub fn items(&self) -> &[TxDatum] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First string datum, if any.
    pub fn name(&self) -> Option<&str> {
        self.items.iter().find_map(|datum| match datum {
            TxDatum::Str(value) => Some(value.as_str()),
            _ => None,
        })
    }
}
