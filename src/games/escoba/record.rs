use std::fmt;

use serde::Serialize;

use super::cards::Card;

// What a turn ended up doing with the played card
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Capture { cards: Vec<Card> },
    Discard,
    // The proposed capture did not add up to 15, the card went to the table
    InvalidCapture { proposed: Vec<Card> },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Capture { cards } => {
                let names: Vec<String> = cards.iter().map(|c| c.to_string()).collect();
                write!(f, "Captured {}", names.join(", "))
            },
            Action::Discard => write!(f, "Played card to table (no capture)"),
            Action::InvalidCapture { .. } => write!(f, "Played card to table (invalid capture provided, treated as no capture)"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnRecord {
    pub seat: usize,
    pub player: String,
    pub hand: Vec<Card>,
    pub table_before: Vec<Card>,
    pub played_card: Card,
    pub action: Action,
    pub escoba: bool,
    pub decider_failed: bool,
    pub hand_after: Vec<Card>,
    pub table_after: Vec<Card>,
    pub deck_remaining: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeatScore {
    pub seat: usize,
    pub player: String,
    pub score: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Record {
    Deal {
        dealer: usize,
        hands: Vec<Vec<Card>>,
        table: Vec<Card>,
    },
    ImmediateCapture {
        player: String,
        cards: Vec<Card>,
        escobas: u32,
    },
    #[serde(rename = "move")]
    Turn(TurnRecord),
    Redeal {
        round: usize,
        hands: Vec<Vec<Card>>,
        deck_remaining: usize,
    },
    FinalizeRound {
        player: String,
        collected: Vec<Card>,
    },
    EarlyTermination {
        seat: usize,
        player: String,
    },
    FinalScores {
        scores: Vec<SeatScore>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::escoba::cards::{Rank, Suit, SEVEN_OF_COINS};

    #[test]
    fn test_records_are_tagged() {
        let record = Record::FinalizeRound {
            player: "greedy".to_string(),
            collected: vec![SEVEN_OF_COINS],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["event"], "finalize_round");
        assert_eq!(value["collected"][0], "7 of Coins");
    }

    #[test]
    fn test_turn_record_shape() {
        let record = Record::Turn(TurnRecord {
            seat: 0,
            player: "random".to_string(),
            hand: vec![SEVEN_OF_COINS],
            table_before: vec![Card::new(Rank::Jack, Suit::Cups)],
            played_card: SEVEN_OF_COINS,
            action: Action::Capture { cards: vec![Card::new(Rank::Jack, Suit::Cups)] },
            escoba: true,
            decider_failed: false,
            hand_after: Vec::new(),
            table_after: Vec::new(),
            deck_remaining: 30,
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["event"], "move");
        assert_eq!(value["action"]["kind"], "capture");
        assert_eq!(value["action"]["cards"][0], "Jack of Cups");
        assert_eq!(value["escoba"], true);
    }

    #[test]
    fn test_action_display() {
        let action = Action::Capture { cards: vec![SEVEN_OF_COINS, Card::new(Rank::One, Suit::Cups)] };
        assert_eq!(action.to_string(), "Captured 7 of Coins, 1 of Cups");
        assert!(Action::InvalidCapture { proposed: Vec::new() }.to_string().contains("invalid capture"));
    }
}
