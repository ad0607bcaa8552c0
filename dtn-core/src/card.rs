//! Identification cards: the reader types the card number using the top
//! row of a Czech keyboard, so each symbol stands for one digit.

use crate::party::PartyId;

/// Symbols per card.
pub const CARD_ID_LEN: usize = 10;

const KEY_MAPPINGS: [(char, char); 10] = [
    ('+', '1'),
    ('ě', '2'),
    ('š', '3'),
    ('č', '4'),
    ('ř', '5'),
    ('ž', '6'),
    ('ý', '7'),
    ('á', '8'),
    ('í', '9'),
    ('é', '0'),
];

/// Digit for a card symbol, if it is one.
pub fn digit_for(symbol: char) -> Option<char> {
    KEY_MAPPINGS
        .iter()
        .find(|(k, _)| *k == symbol)
        .map(|(_, d)| *d)
}

/// Decode a complete card string into a party id.
pub fn decode_card_id(symbols: &str) -> Result<PartyId, CardError> {
    let mut digits = String::with_capacity(CARD_ID_LEN);
    for symbol in symbols.chars() {
        digits.push(digit_for(symbol).ok_or(CardError::UnknownSymbol(symbol))?);
    }
    if digits.len() != CARD_ID_LEN {
        return Err(CardError::WrongLength(digits.len()));
    }
    // Ten ASCII digits always fit in a u64.
    digits
        .parse::<u64>()
        .map(PartyId)
        .map_err(|_| CardError::WrongLength(digits.len()))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardError {
    #[error("unrecognised card symbol {0:?}")]
    UnknownSymbol(char),
    #[error("card id must be {CARD_ID_LEN} symbols, got {0}")]
    WrongLength(usize),
}

/// What the reader did with one input symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardInput {
    /// Not waiting for a card; symbol ignored.
    Ignored,
    /// Symbol accepted, more needed.
    Pending(usize),
    /// Symbol outside the table; partial input discarded.
    Reset,
    /// Ten symbols read; the reader disarms itself.
    Complete(PartyId),
}

/// Collects card symbols one at a time after a login request.
#[derive(Debug, Default)]
pub struct CardReader {
    armed: bool,
    buffer: String,
}

impl CardReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a card, discarding any earlier partial read.
    pub fn arm(&mut self) {
        self.armed = true;
        self.buffer.clear();
    }

    /// Stop waiting for a card and drop any partial read.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.buffer.clear();
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn feed(&mut self, symbol: char) -> CardInput {
        if !self.armed {
            return CardInput::Ignored;
        }
        if digit_for(symbol).is_none() {
            self.buffer.clear();
            return CardInput::Reset;
        }
        self.buffer.push(symbol);
        let read = self.buffer.chars().count();
        if read < CARD_ID_LEN {
            return CardInput::Pending(read);
        }
        let symbols = std::mem::take(&mut self.buffer);
        self.armed = false;
        match decode_card_id(&symbols) {
            Ok(id) => CardInput::Complete(id),
            Err(_) => CardInput::Reset,
        }
    }
}
