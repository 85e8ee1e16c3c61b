use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::games::escoba::SeatScore;

pub const DEFAULT_RATING: f64 = 1000.0;
pub const DEFAULT_K_FACTOR: f64 = 32.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EloConfig {
    pub k_factor: f64,
    pub initial_rating: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_RATING,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Matchup {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl Matchup {
    pub fn total(&self) -> u32 {
        self.wins + self.losses + self.draws
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub rating: f64,
    pub games_played: u32,
    pub total_score: u64,
    // Games finished with the top score
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub matchups: BTreeMap<String, Matchup>,
}

impl RatingRecord {
    fn new(rating: f64) -> Self {
        Self {
            rating,
            games_played: 0,
            total_score: 0,
            wins: 0,
            matchups: BTreeMap::new(),
        }
    }

    pub fn average_score(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            self.total_score as f64 / self.games_played as f64
        }
    }
}

pub type Records = BTreeMap<String, RatingRecord>;

// Where rating records live. Loading never fails, a store that can't be read
// is an empty one.
pub trait RatingStore {
    fn load(&self) -> Records;
    fn save(&mut self, records: &Records) -> Result<()>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl RatingStore for JsonFileStore {
    fn load(&self) -> Records {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("No rankings at {}, starting fresh", self.path.display());
                return Records::new();
            },
            Err(err) => {
                log::warn!("Could not read rankings at {}: {}", self.path.display(), err);
                return Records::new();
            },
        };

        if text.trim().is_empty() {
            return Records::new();
        }

        serde_json::from_str(&text).unwrap_or_else(|err| {
            log::warn!("Ignoring corrupt rankings at {}: {}", self.path.display(), err);
            Records::new()
        })
    }

    // Written next to the target and renamed over it so readers never see a
    // half written file
    fn save(&mut self, records: &Records) -> Result<()> {
        log::debug!("Saving rankings to {}", self.path.display());
        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(records)?;
        fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

// Probability of `rating` beating `opponent`
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

fn actual_score(score: u32, opponent: u32) -> f64 {
    match score.cmp(&opponent) {
        std::cmp::Ordering::Greater => 1.0,
        std::cmp::Ordering::Equal => 0.5,
        std::cmp::Ordering::Less => 0.0,
    }
}

// Bookkeeping for one side of a pair
fn record_result(record: &mut RatingRecord, opponent: &str, score: u32, actual: f64) {
    record.games_played += 1;
    record.total_score += score as u64;

    let matchup = record.matchups.entry(opponent.to_string()).or_default();
    if actual > 0.5 {
        matchup.wins += 1;
    } else if actual < 0.5 {
        matchup.losses += 1;
    } else {
        matchup.draws += 1;
    }
}

pub struct RatingSystem<S> {
    store: S,
    config: EloConfig,
}

impl<S: RatingStore> RatingSystem<S> {
    pub fn new(store: S, config: EloConfig) -> Self {
        Self { store, config }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    // Rate every pair of distinct players in a game against the ratings from
    // before it. games_played and total_score grow once per opponent. False
    // when nobody got rated (self-play).
    pub fn update(&mut self, scores: &[SeatScore]) -> Result<bool> {
        let players: Vec<(String, u32)> = scores
            .iter()
            .map(|s| (s.player.trim().to_string(), s.score))
            .collect();

        if players.len() < 2 || players.iter().all(|(name, _)| *name == players[0].0) {
            log::info!("Skipping rating update for a game without distinct players");
            return Ok(false);
        }

        let mut records = self.store.load();
        for (name, _) in &players {
            records.entry(name.clone()).or_insert_with(|| {
                log::info!("Adding new player to rankings: {}", name);
                RatingRecord::new(self.config.initial_rating)
            });
        }

        let before: HashMap<&str, f64> = players
            .iter()
            .map(|(name, _)| (name.as_str(), records[name].rating))
            .collect();
        let mut deltas: HashMap<&str, f64> = HashMap::new();

        for (i, (a, score_a)) in players.iter().enumerate() {
            for (b, score_b) in players.iter().skip(i + 1) {
                if a == b {
                    continue;
                }

                let actual_a = actual_score(*score_a, *score_b);
                let actual_b = 1.0 - actual_a;
                let expected_a = expected_score(before[a.as_str()], before[b.as_str()]);
                let expected_b = expected_score(before[b.as_str()], before[a.as_str()]);

                *deltas.entry(a).or_default() += self.config.k_factor * (actual_a - expected_a);
                *deltas.entry(b).or_default() += self.config.k_factor * (actual_b - expected_b);

                if let Some(record) = records.get_mut(a) {
                    record_result(record, b, *score_a, actual_a);
                }
                if let Some(record) = records.get_mut(b) {
                    record_result(record, a, *score_b, actual_b);
                }
            }
        }

        for (name, delta) in deltas {
            if let Some(record) = records.get_mut(name) {
                log::info!("{}: {:.1} -> {:.1}", name, record.rating, record.rating + delta);
                record.rating += delta;
            }
        }

        // One win per identity, however many of its seats share the top score
        let top = players.iter().map(|(_, s)| *s).max().unwrap_or(0);
        let winners: BTreeSet<&str> = players
            .iter()
            .filter(|(_, score)| *score == top)
            .map(|(name, _)| name.as_str())
            .collect();
        for name in winners {
            if let Some(record) = records.get_mut(name) {
                record.wins += 1;
            }
        }

        self.store.save(&records)?;
        Ok(true)
    }

    // All records, best rating first
    pub fn get_rankings(&self) -> Vec<(String, RatingRecord)> {
        let mut rankings: Vec<(String, RatingRecord)> = self.store.load().into_iter().collect();
        rankings.sort_by(|(_, a), (_, b)| b.rating.total_cmp(&a.rating));
        rankings
    }
}
