use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DECK_SIZE: usize = 40;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Suit {
    Coins, Cups, Batons, Swords,
}

pub const SUITS: [Suit; 4] = [Suit::Coins, Suit::Cups, Suit::Batons, Suit::Swords];

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum Rank {
    One, Two, Three, Four, Five, Six, Seven, Jack, Knight, King,
}

pub const RANKS: [Rank; 10] = [
    Rank::One, Rank::Two, Rank::Three, Rank::Four, Rank::Five,
    Rank::Six, Rank::Seven, Rank::Jack, Rank::Knight, Rank::King,
];

impl Rank {
    // Capture value, the figures continue after the seven
    pub fn value(self) -> u32 {
        RANKS.iter().position(|&r| r == self).unwrap_or_default() as u32 + 1
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Suit::Coins => "Coins",
            Suit::Cups => "Cups",
            Suit::Batons => "Batons",
            Suit::Swords => "Swords",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rank::Jack => f.write_str("Jack"),
            Rank::Knight => f.write_str("Knight"),
            Rank::King => f.write_str("King"),
            pip => write!(f, "{}", pip.value()),
        }
    }
}

impl FromStr for Suit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coins" | "oros" => Ok(Suit::Coins),
            "cups" | "copas" => Ok(Suit::Cups),
            "batons" | "clubs" | "bastos" => Ok(Suit::Batons),
            "swords" | "espadas" => Ok(Suit::Swords),
            other => Err(anyhow!("Unknown suit: {}", other)),
        }
    }
}

impl FromStr for Rank {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jack" | "sota" | "8" => Ok(Rank::Jack),
            "knight" | "caballo" | "horse" | "9" => Ok(Rank::Knight),
            "king" | "rey" | "10" => Ok(Rank::King),
            other => {
                let pip: usize = other.parse().map_err(|_| anyhow!("Unknown rank: {}", other))?;
                match pip {
                    1..=7 => Ok(RANKS[pip - 1]),
                    _ => Err(anyhow!("Rank out of range: {}", pip)),
                }
            }
        }
    }
}

// Serialized as tokens like "7 of Coins"
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { suit, rank }
    }

    pub fn value(self) -> u32 {
        self.rank.value()
    }

    pub fn is_coins(self) -> bool {
        self.suit == Suit::Coins
    }

    pub fn is_seven_of_coins(self) -> bool {
        self == SEVEN_OF_COINS
    }
}

pub const SEVEN_OF_COINS: Card = Card::new(Rank::Seven, Suit::Coins);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.rank, self.suit)
    }
}

impl FromStr for Card {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let (rank, suit) = lowered
            .split_once(" of ")
            .or_else(|| lowered.split_once(" de "))
            .ok_or_else(|| anyhow!("Malformed card token: {:?}", s))?;

        Ok(Card::new(rank.parse()?, suit.parse()?))
    }
}

impl From<Card> for String {
    fn from(card: Card) -> Self {
        card.to_string()
    }
}

impl TryFrom<String> for Card {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

pub fn total_value(cards: &[Card]) -> u32 {
    cards.iter().map(|c| c.value()).sum()
}

#[derive(Clone, Debug)]
pub struct Deck {
    // Dealt from the back
    cards: Vec<Card>,
}

impl Deck {
    pub fn standard() -> Self {
        let mut cards = Vec::with_capacity(DECK_SIZE);
        for suit in SUITS {
            for rank in RANKS {
                cards.push(Card::new(rank, suit));
            }
        }
        Self { cards }
    }

    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::standard();
        deck.cards.shuffle(rng);
        deck
    }

    // Deck that deals `top` first, in order, followed by the rest of the
    // standard deck
    #[cfg(test)]
    pub fn with_top(top: &[Card]) -> Self {
        let mut order: Vec<Card> = top.to_vec();
        order.extend(Self::standard().cards.into_iter().filter(|c| !top.contains(c)));
        order.reverse();
        Self { cards: order }
    }

    // Take `n` cards off the deck. Asking for more than what is left gives
    // nothing back.
    pub fn deal(&mut self, n: usize) -> Vec<Card> {
        if self.cards.len() < n {
            return Vec::new();
        }
        (0..n).filter_map(|_| self.cards.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn test_values() {
        assert_eq!(Card::new(Rank::One, Suit::Cups).value(), 1);
        assert_eq!(Card::new(Rank::Seven, Suit::Coins).value(), 7);
        assert_eq!(Card::new(Rank::Jack, Suit::Swords).value(), 8);
        assert_eq!(Card::new(Rank::Knight, Suit::Batons).value(), 9);
        assert_eq!(Card::new(Rank::King, Suit::Coins).value(), 10);
    }

    #[test]
    fn test_standard_deck_is_complete() {
        let deck = Deck::standard();
        let unique: HashSet<Card> = deck.cards().iter().copied().collect();
        assert_eq!(deck.len(), DECK_SIZE);
        assert_eq!(unique.len(), DECK_SIZE);
        assert_eq!(total_value(deck.cards()), 4 * 55);
    }

    #[test]
    fn test_seeded_shuffle_is_deterministic() {
        let a = Deck::shuffled(&mut StdRng::seed_from_u64(7));
        let b = Deck::shuffled(&mut StdRng::seed_from_u64(7));
        assert_eq!(a.cards(), b.cards());
    }

    #[test]
    fn test_deal_exhaustion() {
        let mut deck = Deck::standard();
        assert_eq!(deck.deal(38).len(), 38);
        assert!(deck.deal(3).is_empty());
        assert_eq!(deck.len(), 2);
        assert_eq!(deck.deal(2).len(), 2);
        assert!(deck.is_empty());
        assert!(deck.deal(1).is_empty());
    }

    #[test]
    fn test_with_top_deals_in_order() {
        let top = [SEVEN_OF_COINS, Card::new(Rank::King, Suit::Cups)];
        let mut deck = Deck::with_top(&top);
        assert_eq!(deck.len(), DECK_SIZE);
        assert_eq!(deck.deal(2), top.to_vec());
    }

    #[test]
    fn test_token_round_trip() {
        for card in Deck::standard().cards() {
            assert_eq!(card.to_string().parse::<Card>().unwrap(), *card);
        }
    }

    #[test]
    fn test_token_aliases() {
        assert_eq!(" 7 of coins ".parse::<Card>().unwrap(), SEVEN_OF_COINS);
        assert_eq!("Sota of Oros".parse::<Card>().unwrap(), Card::new(Rank::Jack, Suit::Coins));
        assert_eq!("Caballo de Copas".parse::<Card>().unwrap(), Card::new(Rank::Knight, Suit::Cups));
        assert_eq!("Rey of Espadas".parse::<Card>().unwrap(), Card::new(Rank::King, Suit::Swords));
        assert!("11 of Coins".parse::<Card>().is_err());
        assert!("Ace of Hearts".parse::<Card>().is_err());
        assert!("garbage".parse::<Card>().is_err());
    }

    #[test]
    fn test_serializes_as_token() {
        let json = serde_json::to_string(&SEVEN_OF_COINS).unwrap();
        assert_eq!(json, "\"7 of Coins\"");
        let back: Card = serde_json::from_str("\"Knight of Batons\"").unwrap();
        assert_eq!(back, Card::new(Rank::Knight, Suit::Batons));
    }
}
