use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::games::escoba::capture::find_captures;
use crate::games::escoba::cards::{total_value, Card};

// Card to play and table cards to take, as tokens
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub card: String,
    #[serde(default)]
    pub capture: Vec<String>,
}

impl Proposal {
    pub fn new(card: Card, capture: &[Card]) -> Self {
        Self {
            card: card.to_string(),
            capture: capture.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("decider unavailable: {0}")]
    Unavailable(String),

    #[error("failed to run decider command: {0}")]
    Io(#[from] std::io::Error),

    #[error("decider command exited with {0}")]
    ExitStatus(std::process::ExitStatus),

    #[error("could not parse decider response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no move in decider response: {0:?}")]
    NoMove(String),
}

pub trait MoveDecider {
    // Propose a move for `player` holding `hand` with `table` face up. An error
    // is counted against the player.
    fn propose(&mut self, player: &str, hand: &[Card], table: &[Card]) -> Result<Proposal, DecisionError>;
}

// Every (card, capture) pair available, including a plain play of each card
pub fn legal_moves(hand: &[Card], table: &[Card]) -> Vec<(Card, Vec<Card>)> {
    let mut moves = Vec::new();
    for &card in hand {
        for capture in find_captures(card, table) {
            moves.push((card, capture));
        }
        moves.push((card, Vec::new()));
    }
    moves
}

// Pick a card at random and take a random capture with it when there is one
pub struct RandomDecider {
    rng: StdRng,
}

impl RandomDecider {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl MoveDecider for RandomDecider {
    fn propose(&mut self, _player: &str, hand: &[Card], table: &[Card]) -> Result<Proposal, DecisionError> {
        let card = *hand
            .choose(&mut self.rng)
            .ok_or_else(|| DecisionError::NoMove("empty hand".to_string()))?;
        let captures = find_captures(card, table);
        let capture = captures.choose(&mut self.rng).cloned().unwrap_or_default();
        Ok(Proposal::new(card, &capture))
    }
}

// One move lookahead. Discards leave the table hard to sweep.
#[derive(Default)]
pub struct GreedyDecider;

fn move_reward(card: Card, capture: &[Card], table: &[Card]) -> i32 {
    if capture.is_empty() {
        let left = total_value(table) + card.value();
        // Any table worth 5 to 14 can be swept with a single card
        let sweepable = (5..=14).contains(&left) as i32;
        let giveaway = card.is_coins() as i32 + 5 * card.is_seven_of_coins() as i32;
        return -10 * sweepable - 2 * giveaway - card.value() as i32 / 4;
    }

    let taken: Vec<Card> = capture.iter().copied().chain(std::iter::once(card)).collect();
    let escoba = (capture.len() == table.len()) as i32;
    let coins = taken.iter().filter(|c| c.is_coins()).count() as i32;
    let seven = taken.iter().any(|c| c.is_seven_of_coins()) as i32;

    100 * escoba + 20 * seven + 3 * coins + 2 * taken.len() as i32
}

impl MoveDecider for GreedyDecider {
    fn propose(&mut self, _player: &str, hand: &[Card], table: &[Card]) -> Result<Proposal, DecisionError> {
        let mut best: Option<(i32, Proposal)> = None;
        for (card, capture) in legal_moves(hand, table) {
            let reward = move_reward(card, &capture, table);
            if best.as_ref().map_or(true, |(r, _)| reward > *r) {
                best = Some((reward, Proposal::new(card, &capture)));
            }
        }

        log::debug!("Greedy pick: {:?}", best);
        best.map(|(_, p)| p).ok_or_else(|| DecisionError::NoMove("empty hand".to_string()))
    }
}

// Runs a shell command per move. Request JSON goes to stdin and a
// {"card", "capture"} object is read back from stdout.
pub struct CommandDecider {
    command: String,
}

#[derive(Serialize)]
struct MoveRequest<'a> {
    player: &'a str,
    hand: &'a [Card],
    table: &'a [Card],
}

impl CommandDecider {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl MoveDecider for CommandDecider {
    fn propose(&mut self, player: &str, hand: &[Card], table: &[Card]) -> Result<Proposal, DecisionError> {
        let request = serde_json::to_string(&MoveRequest { player, hand, table })?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("ESCOBA_PLAYER", player)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        // Programs that answer without reading the request may close stdin
        // early, only the exit status and the output tell if they failed
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(request.as_bytes()) {
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    log::debug!("{:?} closed stdin before reading the request", self.command);
                },
                other => other?,
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(DecisionError::ExitStatus(output.status));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        if text.trim().is_empty() {
            return Err(DecisionError::Unavailable(format!("{:?} printed nothing", self.command)));
        }
        parse_response(&text)
    }
}

// Pull the move object out of a response that might carry a ```json fence or
// text around it
pub fn parse_response(text: &str) -> Result<Proposal, DecisionError> {
    // Odd pieces of a split on fences are the fenced blocks
    let fenced = text
        .split("```")
        .skip(1)
        .step_by(2)
        .map(|block| block.trim_start_matches("json"));
    for block in fenced {
        if let Some(Ok(proposal)) = object_slice(block).map(|body| serde_json::from_str::<Proposal>(body)) {
            return Ok(proposal);
        }
    }

    match object_slice(text) {
        Some(body) => Ok(serde_json::from_str(body)?),
        None => Err(DecisionError::NoMove(text.trim().to_string())),
    }
}

// Outermost braces of `text`
fn object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::escoba::capture::is_valid_capture;
    use crate::games::escoba::cards::{Rank, Suit, SEVEN_OF_COINS};

    fn c(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    #[test]
    fn test_legal_moves_include_plain_plays() {
        let hand = vec![c(Rank::Five, Suit::Cups), c(Rank::One, Suit::Cups)];
        let table = vec![c(Rank::King, Suit::Coins)];
        let moves = legal_moves(&hand, &table);
        assert_eq!(moves, vec![
            (c(Rank::Five, Suit::Cups), vec![c(Rank::King, Suit::Coins)]),
            (c(Rank::Five, Suit::Cups), vec![]),
            (c(Rank::One, Suit::Cups), vec![]),
        ]);
    }

    #[test]
    fn test_greedy_prefers_escoba() {
        let hand = vec![c(Rank::Five, Suit::Cups), c(Rank::Seven, Suit::Swords)];
        let table = vec![c(Rank::Four, Suit::Batons), c(Rank::Four, Suit::Cups)];
        let proposal = GreedyDecider.propose("greedy", &hand, &table).unwrap();
        assert_eq!(proposal, Proposal::new(c(Rank::Seven, Suit::Swords), &table));
    }

    #[test]
    fn test_greedy_goes_for_seven_of_coins() {
        // The jack takes either the seven of coins or three and four
        let hand = vec![c(Rank::Jack, Suit::Cups)];
        let table = vec![SEVEN_OF_COINS, c(Rank::Three, Suit::Cups), c(Rank::Four, Suit::Swords), c(Rank::One, Suit::Batons)];
        let proposal = GreedyDecider.propose("greedy", &hand, &table).unwrap();
        assert_eq!(proposal, Proposal::new(c(Rank::Jack, Suit::Cups), &[SEVEN_OF_COINS]));
    }

    #[test]
    fn test_greedy_avoids_sweepable_discard() {
        // Nothing to capture: the two leaves a table of 12, the king one of 20
        let hand = vec![c(Rank::Two, Suit::Cups), c(Rank::King, Suit::Swords)];
        let table = vec![c(Rank::Jack, Suit::Batons), c(Rank::Two, Suit::Swords)];
        assert!(find_captures(hand[0], &table).is_empty());
        assert!(find_captures(hand[1], &table).is_empty());

        let proposal = GreedyDecider.propose("greedy", &hand, &table).unwrap();
        assert_eq!(proposal, Proposal::new(c(Rank::King, Suit::Swords), &[]));
    }

    #[test]
    fn test_random_decider_proposes_valid_captures() {
        let mut decider = RandomDecider::new(Some(11));
        let hand = vec![c(Rank::Five, Suit::Cups)];
        let table = vec![c(Rank::King, Suit::Coins), c(Rank::Four, Suit::Swords), c(Rank::Six, Suit::Batons)];
        for _ in 0..20 {
            let proposal = decider.propose("random", &hand, &table).unwrap();
            assert_eq!(proposal.card, "5 of Cups");
            let capture: Vec<Card> = proposal.capture.iter().map(|t| t.parse().unwrap()).collect();
            assert!(is_valid_capture(hand[0], &capture));
        }
    }

    #[test]
    fn test_empty_hand_is_an_error() {
        assert!(RandomDecider::new(Some(1)).propose("random", &[], &[]).is_err());
        assert!(GreedyDecider.propose("greedy", &[], &[]).is_err());
    }

    #[test]
    fn test_parse_plain_response() {
        let proposal = parse_response(r#"{"card": "7 of Coins", "capture": ["8 of Cups"]}"#).unwrap();
        assert_eq!(proposal, Proposal { card: "7 of Coins".to_string(), capture: vec!["8 of Cups".to_string()] });
    }

    #[test]
    fn test_parse_fenced_response() {
        let text = "Sure! Here is my move:\n```json\n{\"card\": \"King of Swords\", \"capture\": []}\n```\nGood luck.";
        let proposal = parse_response(text).unwrap();
        assert_eq!(proposal.card, "King of Swords");
        assert!(proposal.capture.is_empty());
    }

    #[test]
    fn test_parse_missing_capture_defaults_to_empty() {
        let proposal = parse_response("I play {\"card\": \"1 of Cups\"} now").unwrap();
        assert_eq!(proposal.card, "1 of Cups");
        assert!(proposal.capture.is_empty());
    }

    #[test]
    fn test_parse_move_in_later_fence() {
        let text = "Thinking:\n```\nthe table sums to 8\n```\nMove:\n```json\n{\"card\": \"7 of Coins\", \"capture\": [\"1 of Cups\"]}\n```";
        let proposal = parse_response(text).unwrap();
        assert_eq!(proposal, Proposal { card: "7 of Coins".to_string(), capture: vec!["1 of Cups".to_string()] });
    }

    #[test]
    fn test_parse_fence_without_object_falls_back_to_text() {
        let text = "```\nno idea\n```\n{\"card\": \"King of Cups\"}";
        assert_eq!(parse_response(text).unwrap().card, "King of Cups");
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(parse_response("I pass"), Err(DecisionError::NoMove(_))));
        assert!(matches!(parse_response("{\"capture\": []}"), Err(DecisionError::Parse(_))));
    }

    #[test]
    fn test_command_decider_round_trip() {
        let mut decider = CommandDecider::new(r#"cat > /dev/null; echo '{"card": "7 of Coins", "capture": []}'"#);
        let proposal = decider.propose("script", &[SEVEN_OF_COINS], &[]).unwrap();
        assert_eq!(proposal.card, "7 of Coins");
    }

    #[test]
    fn test_command_decider_sees_request() {
        let mut decider = CommandDecider::new(r#"grep -qF '"hand":["7 of Coins"]' && echo '{"card": "7 of Coins"}'"#);
        assert!(decider.propose("script", &[SEVEN_OF_COINS], &[]).is_ok());
    }

    #[test]
    fn test_command_decider_ignoring_stdin() {
        let mut decider = CommandDecider::new(r#"echo '{"card": "7 of Coins"}'"#);
        let table: Vec<Card> = crate::games::escoba::cards::Deck::standard().cards()[..30].to_vec();
        for _ in 0..50 {
            let proposal = decider.propose("script", &[SEVEN_OF_COINS], &table).unwrap();
            assert_eq!(proposal.card, "7 of Coins");
        }
    }

    #[test]
    fn test_command_decider_silence() {
        let mut decider = CommandDecider::new("cat > /dev/null");
        assert!(matches!(decider.propose("script", &[SEVEN_OF_COINS], &[]), Err(DecisionError::Unavailable(_))));
    }

    #[test]
    fn test_command_decider_failure() {
        let mut decider = CommandDecider::new("cat > /dev/null; exit 3");
        assert!(matches!(decider.propose("script", &[SEVEN_OF_COINS], &[]), Err(DecisionError::ExitStatus(_))));
    }
}
