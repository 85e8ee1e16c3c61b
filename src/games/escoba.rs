use super::{GameState, Validate};
use crate::deciders::{DecisionError, MoveDecider, Proposal};
use anyhow::{anyhow, Result};
use std::collections::HashSet;

pub mod capture;
pub mod cards;
mod record;

pub use record::{Action, Record, SeatScore, TurnRecord};

use capture::is_valid_capture;
use cards::{total_value, Card, Deck, DECK_SIZE};

pub const HAND_SIZE: usize = 3;
pub const TABLE_SIZE: usize = 4;
pub const DEFAULT_MAX_ERRORS: u32 = 3;

#[derive(Clone, Debug)]
pub struct PlayerState {
    pub name: String,
    pub hand: Vec<Card>,
    pub captured: Vec<Card>,
    pub escobas: u32,
    pub errors: u32,
}

#[derive(Clone, Debug)]
pub struct State {
    pub players: Vec<PlayerState>,
    pub deck: Deck,
    pub table: Vec<Card>,
    pub dealer: usize,
    // Seat expected to act next
    pub turn: usize,
    pub rounds: usize,
    pub last_capture: Option<usize>,
    pub terminated_by: Option<usize>,
    pub max_errors: u32,
    pub log: Vec<Record>,
}

// Terminated scores have the offender at zero
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Completed { scores: Vec<SeatScore> },
    Terminated { offender: usize, scores: Vec<SeatScore> },
}

impl Outcome {
    pub fn scores(&self) -> &[SeatScore] {
        match self {
            Outcome::Completed { scores } => scores,
            Outcome::Terminated { scores, .. } => scores,
        }
    }

    // Seats sharing the top score
    pub fn winners(&self) -> Vec<usize> {
        let scores = self.scores();
        let top = scores.iter().map(|s| s.score).max().unwrap_or(0);
        scores.iter().filter(|s| s.score == top).map(|s| s.seat).collect()
    }
}

impl PlayerState {
    fn new(name: String) -> Self {
        Self {
            name,
            hand: Vec::with_capacity(HAND_SIZE),
            captured: Vec::new(),
            escobas: 0,
            errors: 0,
        }
    }
}

impl State {
    // The last seat deals, play starts to its right
    pub fn new(names: Vec<String>, deck: Deck, max_errors: u32) -> Self {
        let dealer = names.len().saturating_sub(1);
        State {
            players: names.into_iter().map(PlayerState::new).collect(),
            deck,
            table: Vec::with_capacity(TABLE_SIZE),
            dealer,
            turn: 0,
            rounds: 0,
            last_capture: None,
            terminated_by: None,
            max_errors,
            log: Vec::new(),
        }
    }

    fn first_seat(&self) -> usize {
        (self.dealer + 1) % self.players.len()
    }

    fn hands(&self) -> Vec<Vec<Card>> {
        self.players.iter().map(|p| p.hand.clone()).collect()
    }

    // Number of cards in every location of the game
    pub fn card_count(&self) -> usize {
        self.deck.len()
            + self.table.len()
            + self.players.iter().map(|p| p.hand.len() + p.captured.len()).sum::<usize>()
    }
}

impl GameState for State {
    fn is_round_over(&self) -> bool {
        self.players.iter().all(|p| p.hand.is_empty())
    }

    fn is_game_over(&self) -> bool {
        self.terminated_by.is_some() || (self.is_round_over() && self.deck.len() < HAND_SIZE)
    }
}

impl Validate for State {
    fn validate(&self) -> Result<()> {
        let n_players = self.players.len();
        if !(2..=4).contains(&n_players) {
            return Err(anyhow!("Number of players ({}) outside the bound [2, 4]", n_players));
        }

        let count = self.card_count();
        if count != DECK_SIZE {
            return Err(anyhow!("Expected {} cards in play, found {}", DECK_SIZE, count));
        }

        let mut seen: HashSet<Card> = HashSet::with_capacity(DECK_SIZE);
        let everywhere = self.deck.cards().iter()
            .chain(self.table.iter())
            .chain(self.players.iter().flat_map(|p| p.hand.iter().chain(p.captured.iter())));
        for card in everywhere {
            if !seen.insert(*card) {
                return Err(anyhow!("{} is in more than one place", card));
            }
        }

        if let Some(p) = self.players.iter().find(|p| p.hand.len() > HAND_SIZE) {
            return Err(anyhow!("{} holds {} cards", p.name, p.hand.len()));
        }

        Ok(())
    }
}

// Deal three cards to everyone and four to the table. A table worth 15 or 30
// is swept by the dealer straight away.
pub fn initial_deal(state: &mut State) {
    for player in &mut state.players {
        player.hand = state.deck.deal(HAND_SIZE);
        log::debug!("{} hand: {:?}", player.name, player.hand);
    }
    state.table = state.deck.deal(TABLE_SIZE);
    state.turn = state.first_seat();
    log::debug!("Initial table: {:?}", state.table);

    state.log.push(Record::Deal {
        dealer: state.dealer,
        hands: state.hands(),
        table: state.table.clone(),
    });

    let escobas = match total_value(&state.table) {
        15 => 1,
        30 => 2,
        _ => return,
    };

    let dealer = &mut state.players[state.dealer];
    log::debug!("Table sums to {}, {} sweeps it for {} escoba(s)", total_value(&state.table), dealer.name, escobas);
    dealer.captured.extend(state.table.iter().copied());
    dealer.escobas += escobas;
    state.log.push(Record::ImmediateCapture {
        player: dealer.name.clone(),
        cards: std::mem::take(&mut state.table),
        escobas,
    });
}

fn match_card(token: &str, cards: &[Card]) -> Option<usize> {
    let card: Card = token.parse().ok()?;
    cards.iter().position(|&c| c == card)
}

// Table cards named by the tokens, each table card taken at most once
fn match_capture(tokens: &[String], table: &[Card]) -> Vec<Card> {
    let mut matched: Vec<Card> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match match_card(token, table) {
            Some(idx) if !matched.contains(&table[idx]) => matched.push(table[idx]),
            _ => log::debug!("Dropping capture token {:?}", token),
        }
    }
    matched
}

// Apply one decision for `seat`. Unknown cards fall back to the first in hand
// and a capture short of 15 becomes a plain play. Only a failed decision
// counts as an error.
pub fn play_turn(state: &mut State, seat: usize, decision: Result<Proposal, DecisionError>) {
    if state.players[seat].hand.is_empty() {
        log::warn!("{} has no cards to play", state.players[seat].name);
        return;
    }

    let hand = state.players[seat].hand.clone();
    let table_before = state.table.clone();

    let (proposal, failed) = match decision {
        Ok(proposal) => (proposal, false),
        Err(err) => {
            log::error!("{} failed to decide a move: {}", state.players[seat].name, err);
            (Proposal::default(), true)
        },
    };

    let player = &mut state.players[seat];
    let card_idx = match_card(&proposal.card, &player.hand).unwrap_or_else(|| {
        log::debug!("{:?} is not in the hand of {}, playing the first card", proposal.card, player.name);
        0
    });
    let played = player.hand.remove(card_idx);
    let capture = match_capture(&proposal.capture, &state.table);

    let action = if capture.is_empty() {
        state.table.push(played);
        Action::Discard
    } else if is_valid_capture(played, &capture) {
        state.table.retain(|c| !capture.contains(c));
        player.captured.push(played);
        player.captured.extend(capture.iter().copied());
        state.last_capture = Some(seat);
        Action::Capture { cards: capture }
    } else {
        state.table.push(played);
        Action::InvalidCapture { proposed: capture }
    };

    let escoba = matches!(action, Action::Capture { .. }) && state.table.is_empty();
    if escoba {
        player.escobas += 1;
        log::debug!("{} made an escoba!", player.name);
    }
    log::debug!("{} played {}: {}", player.name, played, action);

    let name = player.name.clone();
    let hand_after = player.hand.clone();
    state.log.push(Record::Turn(TurnRecord {
        seat,
        player: name.clone(),
        hand,
        table_before,
        played_card: played,
        action,
        escoba,
        decider_failed: failed,
        hand_after,
        table_after: state.table.clone(),
        deck_remaining: state.deck.len(),
    }));

    if failed {
        let player = &mut state.players[seat];
        player.errors += 1;
        log::error!("{} encountered a decision error. Error count: {}", name, player.errors);
        if player.errors >= state.max_errors {
            log::error!("{} reached {} errors. Terminating game early.", name, player.errors);
            state.terminated_by = Some(seat);
            state.log.push(Record::EarlyTermination { seat, player: name });
        }
    }
}

// Move the turn on after a ply, dealing new hands when everyone is out of
// cards and the deck can still feed them
pub fn advance(state: &mut State) {
    if state.terminated_by.is_some() {
        return;
    }

    let n_players = state.players.len();
    if !state.is_round_over() {
        let next = (1..=n_players)
            .map(|i| (state.turn + i) % n_players)
            .find(|&i| !state.players[i].hand.is_empty());
        if let Some(seat) = next {
            state.turn = seat;
        }
        return;
    }

    if !state.is_game_over() {
        deal_new_hands(state);
    }
}

fn deal_new_hands(state: &mut State) {
    for player in &mut state.players {
        player.hand = state.deck.deal(HAND_SIZE);
        log::debug!("{} new hand: {:?}", player.name, player.hand);
    }
    state.rounds += 1;
    state.turn = state.first_seat();
    state.log.push(Record::Redeal {
        round: state.rounds,
        hands: state.hands(),
        deck_remaining: state.deck.len(),
    });
}

// Seat that has to play next, None once the game is over
pub fn current_player(state: &State) -> Option<usize> {
    if state.is_game_over() {
        None
    } else {
        Some(state.turn)
    }
}

// Hand what's left on the table to whoever captured last
pub fn finalize_round(state: &mut State) {
    let Some(seat) = state.last_capture else {
        return;
    };
    if state.table.is_empty() {
        return;
    }

    let player = &mut state.players[seat];
    log::debug!("{} collects remaining table cards: {:?}", player.name, state.table);
    player.captured.extend(state.table.iter().copied());
    state.log.push(Record::FinalizeRound {
        player: player.name.clone(),
        collected: std::mem::take(&mut state.table),
    });
}

// Seats holding the strict maximum of captured cards matching `pred`. Nobody
// wins a category with zero cards.
fn category_winners(state: &State, pred: fn(Card) -> bool) -> Vec<bool> {
    let counts: Vec<usize> = state.players
        .iter()
        .map(|p| p.captured.iter().filter(|&&c| pred(c)).count())
        .collect();
    let top = counts.iter().copied().max().unwrap_or(0);
    counts.iter().map(|&count| count > 0 && count == top).collect()
}

// Most cards, most coins, seven of coins and escobas. Ties share a point.
pub fn calculate_scores(state: &State) -> Vec<u32> {
    let cards_winners = category_winners(state, |_| true);
    let coins_winners = category_winners(state, Card::is_coins);
    let seven_winner = state.players
        .iter()
        .position(|p| p.captured.iter().any(|c| c.is_seven_of_coins()));

    state.players
        .iter()
        .enumerate()
        .map(|(i, p)| {
            cards_winners[i] as u32
                + coins_winners[i] as u32
                + (seven_winner == Some(i)) as u32
                + p.escobas
        })
        .collect()
}

// Close the game: sweep the table, score and write the final log entry
pub fn finish(state: &mut State) -> Outcome {
    finalize_round(state);

    let mut points = calculate_scores(state);
    if let Some(offender) = state.terminated_by {
        points[offender] = 0;
    }

    let scores: Vec<SeatScore> = state.players
        .iter()
        .zip(points)
        .enumerate()
        .map(|(seat, (p, score))| SeatScore { seat, player: p.name.clone(), score })
        .collect();

    log::debug!("Final scores: {:?}", scores);
    state.log.push(Record::FinalScores { scores: scores.clone() });

    match state.terminated_by {
        Some(offender) => Outcome::Terminated { offender, scores },
        None => Outcome::Completed { scores },
    }
}

// Ask the decider of `seat` for a move on the current hand and table
pub fn ask(state: &State, seat: usize, decider: &mut dyn MoveDecider) -> Result<Proposal, DecisionError> {
    let player = &state.players[seat];
    decider.propose(&player.name, &player.hand, &state.table)
}

pub fn play_game(state: &mut State, deciders: &mut [Box<dyn MoveDecider>]) -> Outcome {
    initial_deal(state);

    while let Some(seat) = current_player(state) {
        let decision = ask(state, seat, deciders[seat].as_mut());
        play_turn(state, seat, decision);
        advance(state);
    }

    finish(state)
}
