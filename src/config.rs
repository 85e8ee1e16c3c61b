use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Error, Result};

use crate::deciders::{CommandDecider, GreedyDecider, MoveDecider, RandomDecider};
use crate::games::Validate;
use crate::ratings::EloConfig;

pub const DEFAULT_PLAYER: &str = "greedy";
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub enum DeciderKind {
    Random,
    Greedy,
    // Shell command speaking the JSON move protocol
    Command(String),
}

// Written as `[label=]kind`, e.g. `bot-v2=cmd:./bot.py --fast`. The label is
// the identity that gets rated.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSpec {
    pub label: String,
    pub kind: DeciderKind,
}

impl FromStr for PlayerSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (label, kind_text) = match s.split_once('=') {
            Some((label, rest)) if !label.contains(':') && !label.trim().is_empty() => (Some(label.trim()), rest.trim()),
            _ => (None, s),
        };

        let kind = match kind_text {
            "random" => DeciderKind::Random,
            "greedy" => DeciderKind::Greedy,
            other => match other.strip_prefix("cmd:") {
                Some(command) if !command.trim().is_empty() => DeciderKind::Command(command.trim().to_string()),
                _ => bail!("Unknown player {:?}, expected random, greedy or cmd:<command>", other),
            },
        };

        Ok(PlayerSpec {
            label: label.unwrap_or(kind_text).to_string(),
            kind,
        })
    }
}

impl PlayerSpec {
    pub fn build(&self, seed: Option<u64>) -> Box<dyn MoveDecider> {
        match &self.kind {
            DeciderKind::Random => Box::new(RandomDecider::new(seed)),
            DeciderKind::Greedy => Box::new(GreedyDecider),
            DeciderKind::Command(command) => Box::new(CommandDecider::new(command.clone())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub players: Vec<PlayerSpec>,
    pub max_errors: u32,
    pub seed: Option<u64>,
}

impl GameConfig {
    // Seats without an explicit player get `default_player`
    pub fn new(
        mut players: Vec<PlayerSpec>,
        num_players: Option<usize>,
        default_player: &PlayerSpec,
        max_errors: u32,
        seed: Option<u64>,
    ) -> Result<Self> {
        let n_players = num_players.unwrap_or(players.len().max(MIN_PLAYERS));
        if players.len() > n_players {
            bail!("Got {} players for {} seats", players.len(), n_players);
        }
        players.resize(n_players, default_player.clone());

        let config = Self { players, max_errors, seed };
        config.validate()?;
        Ok(config)
    }

    pub fn names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.label.clone()).collect()
    }

    // Seed for one game of a series, None means fresh entropy
    pub fn game_seed(&self, game_id: usize) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(game_id as u64))
    }

    pub fn deciders(&self, game_seed: Option<u64>) -> Vec<Box<dyn MoveDecider>> {
        self.players
            .iter()
            .enumerate()
            .map(|(seat, p)| p.build(game_seed.map(|s| s ^ (seat as u64 + 1).wrapping_mul(0x9E3779B97F4A7C15))))
            .collect()
    }
}

impl Validate for GameConfig {
    fn validate(&self) -> Result<()> {
        let n_players = self.players.len();
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&n_players) {
            return Err(anyhow!("Number of players ({}) outside the bound [{}, {}]", n_players, MIN_PLAYERS, MAX_PLAYERS));
        }
        if self.max_errors == 0 {
            return Err(anyhow!("At least one decision error has to be allowed before a game is stopped"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub game: GameConfig,
    pub n_games: usize,
    pub log_file: Option<PathBuf>,
    pub ratings_file: PathBuf,
    pub elo: EloConfig,
}
