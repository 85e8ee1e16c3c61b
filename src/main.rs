use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ratatui::DefaultTerminal;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use config::{GameConfig, PlayerSpec, SimulationConfig, DEFAULT_PLAYER};
use deciders::{MoveDecider, Proposal};
use games::escoba::{self, cards::Deck, Outcome, Record, DEFAULT_MAX_ERRORS};
use games::Validate;
use ratings::{EloConfig, JsonFileStore, RatingStore, RatingSystem, DEFAULT_K_FACTOR, DEFAULT_RATING};
use tui::{InteractiveApp, HUMAN_SEAT};

mod config;
mod deciders;
mod games;
mod ratings;
mod tui;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Play a batch of games between agents and rate the results")]
    Simulate {
        #[arg(help = "Players as [label=]random|greedy|cmd:<command>")]
        players: Vec<PlayerSpec>,
        #[arg(short = 'n', long, default_value_t = 100)]
        games: usize,
        // Seats without a player get the default one
        #[arg(long)]
        num_players: Option<usize>,
        #[arg(long, default_value = DEFAULT_PLAYER)]
        default_player: PlayerSpec,
        #[arg(short, long)]
        log_file: Option<PathBuf>,
        #[arg(short, long, default_value = "rankings.json")]
        ratings: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = DEFAULT_MAX_ERRORS, help = "Decision errors that end a game")]
        max_errors: u32,
        #[arg(long, default_value_t = DEFAULT_K_FACTOR)]
        k_factor: f64,
        #[arg(long, default_value_t = DEFAULT_RATING)]
        initial_rating: f64,
    },
    #[command(about = "Show the stored ratings")]
    Rankings {
        #[arg(short, long, default_value = "rankings.json")]
        ratings: PathBuf,
    },
    #[command(about = "Play against agents in the terminal")]
    Interactive {
        opponents: Vec<PlayerSpec>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

// One line in the play log: a game record along with the game it belongs to
#[derive(Debug, Clone, serde::Serialize)]
struct PlayLogLine<'a> {
    game_id: usize,
    seed: Option<u64>,
    players: &'a [String],
    ply_id: usize,
    #[serde(flatten)]
    record: &'a Record,
}

struct GameReport {
    game_id: usize,
    seed: Option<u64>,
    outcome: Outcome,
    log: Vec<Record>,
}

fn game_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn write_play_log(reports: &[GameReport], players: &[String], file: &PathBuf) -> Result<()> {
    let file = File::create(file).with_context(|| format!("Failed to create {}", file.display()))?;
    let mut writer = BufWriter::new(file);
    for report in reports {
        for (ply_id, record) in report.log.iter().enumerate() {
            let line = PlayLogLine {
                game_id: report.game_id,
                seed: report.seed,
                players,
                ply_id,
                record,
            };
            jsonl::write(&mut writer, &line).map_err(|err| anyhow!("Failed to write play log: {:?}", err))?;
        }
    }
    Ok(())
}

fn report(reports: &[GameReport], players: &[String]) {
    // Wins, total score and early stops per player identity
    let mut tally: BTreeMap<&str, (usize, u64, usize)> = BTreeMap::new();
    let total_games = reports.len();

    for report in reports {
        let winners = report.outcome.winners();
        for score in report.outcome.scores() {
            let entry = tally.entry(score.player.as_str()).or_default();
            entry.0 += winners.contains(&score.seat) as usize;
            entry.1 += score.score as u64;
        }
        if let Outcome::Terminated { offender, .. } = report.outcome {
            tally.entry(players[offender].as_str()).or_default().2 += 1;
        }
    }

    for (name, (wins, total, stopped)) in tally {
        println!(
            "Win Count for {}: {}/{}, ratio: {:.3}, total score: {}, games stopped: {}",
            name, wins, total_games, wins as f64 / total_games as f64, total, stopped
        );
    }
}

fn print_rankings<S: RatingStore>(ratings: &RatingSystem<S>) {
    println!("\n=== Rankings ===");
    for (rank, (name, record)) in ratings.get_rankings().iter().enumerate() {
        println!(
            "{}. {} - Rating: {:.1}, games: {}, wins: {}, average score: {:.2}",
            rank + 1, name, record.rating, record.games_played, record.wins, record.average_score()
        );
        for (opponent, matchup) in &record.matchups {
            println!(
                "     vs {}: {}W {}L {}D of {}",
                opponent, matchup.wins, matchup.losses, matchup.draws, matchup.total()
            );
        }
    }
}

fn run_game(config: &GameConfig, game_id: usize) -> Result<GameReport> {
    let seed = config.game_seed(game_id);
    let mut rng = game_rng(seed);
    let mut state = escoba::State::new(config.names(), Deck::shuffled(&mut rng), config.max_errors);
    let mut deciders = config.deciders(seed);

    let outcome = escoba::play_game(&mut state, &mut deciders);
    state.validate().with_context(|| format!("Game {} ended in a broken state", game_id))?;

    for score in outcome.scores() {
        log::info!("Game {}: final score P{} {}: {}", game_id, score.seat, score.player, score.score);
    }
    if let Outcome::Terminated { offender, .. } = outcome {
        log::error!("Game {} terminated early due to invalid moves by {}", game_id, state.players[offender].name);
    }

    Ok(GameReport { game_id, seed, outcome, log: state.log })
}

fn simulate(config: &SimulationConfig) -> Result<()> {
    let players = config.game.names();
    log::info!("Running {} simulations for {} players: {:?}", config.n_games, players.len(), players);

    let reports: Vec<GameReport> = (0..config.n_games)
        .into_par_iter()
        .map(|game_id| run_game(&config.game, game_id))
        .collect::<Result<Vec<_>>>()?;

    report(&reports, &players);

    // Rating updates go through a single writer
    let mut ratings = RatingSystem::new(JsonFileStore::new(&config.ratings_file), config.elo);
    for report in &reports {
        ratings.update(report.outcome.scores())?;
    }

    if let Some(log_file) = &config.log_file {
        write_play_log(&reports, &players, log_file)?;
        log::info!("Play log saved to {}", log_file.display());
    }

    print_rankings(&ratings);
    Ok(())
}

fn play_human_turn(app: &mut InteractiveApp, decision: Result<Proposal, deciders::DecisionError>) {
    escoba::play_turn(&mut app.state, HUMAN_SEAT, decision);
    escoba::advance(&mut app.state);
    app.ply += 1;
}

fn interactive_loop(terminal: &mut DefaultTerminal, app: &mut InteractiveApp, deciders: &mut [Box<dyn MoveDecider>]) -> Result<()> {
    loop {
        // Agents play until it is the human's turn again
        while let Some(seat) = escoba::current_player(&app.state) {
            if seat == HUMAN_SEAT {
                break;
            }
            let decision = escoba::ask(&app.state, seat, deciders[seat].as_mut());
            escoba::play_turn(&mut app.state, seat, decision);
            escoba::advance(&mut app.state);
            app.ply += 1;
        }

        if app.outcome.is_none() && escoba::current_player(&app.state).is_none() {
            app.outcome = Some(escoba::finish(&mut app.state));
        }
        app.refresh_actions();

        terminal.draw(|frame| {
            frame.render_widget(app.clone(), frame.area());
        })?;

        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }

        match key_event.code {
            KeyCode::Char('q') => break,
            // Once the game is over only quitting is allowed
            _ if app.outcome.is_some() => {},
            KeyCode::Char(' ') => {
                let decision = escoba::ask(&app.state, HUMAN_SEAT, deciders[HUMAN_SEAT].as_mut());
                play_human_turn(app, decision);
            },
            KeyCode::Enter => {
                if let Some((card, capture)) = app.selected_action() {
                    play_human_turn(app, Ok(Proposal::new(card, &capture)));
                }
            },
            KeyCode::Down => {
                if let Some(action_idx) = app.actions_state.selected() {
                    if action_idx + 1 < app.actions.len() {
                        app.actions_state.select_next();
                    }
                } else {
                    app.actions_state.select_first();
                }
            },
            KeyCode::Up => {
                if app.actions_state.selected().is_some() {
                    app.actions_state.select_previous();
                } else {
                    app.actions_state.select_first();
                }
            },
            _ => {},
        }
    }

    Ok(())
}

fn run_interactive(config: GameConfig) -> Result<()> {
    color_eyre::install().map_err(|err| anyhow!("{}", err))?;

    let mut rng = game_rng(config.seed);
    let mut state = escoba::State::new(config.names(), Deck::shuffled(&mut rng), config.max_errors);
    // The human's seat keeps a greedy agent around for <SPC>
    let mut deciders = config.deciders(config.seed);
    escoba::initial_deal(&mut state);

    let mut app = InteractiveApp::new(state);
    let mut terminal = ratatui::init();
    let result = interactive_loop(&mut terminal, &mut app, &mut deciders);
    ratatui::restore();
    result
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.commands {
        Commands::Simulate {
            players,
            games,
            num_players,
            default_player,
            log_file,
            ratings,
            seed,
            max_errors,
            k_factor,
            initial_rating,
        } => {
            let config = SimulationConfig {
                game: GameConfig::new(players, num_players, &default_player, max_errors, seed)?,
                n_games: games,
                log_file,
                ratings_file: ratings,
                elo: EloConfig { k_factor, initial_rating },
            };
            simulate(&config)
        },
        Commands::Rankings { ratings } => {
            print_rankings(&RatingSystem::new(JsonFileStore::new(ratings), EloConfig::default()));
            Ok(())
        },
        Commands::Interactive { opponents, seed } => {
            let default_player: PlayerSpec = DEFAULT_PLAYER.parse()?;
            let human = PlayerSpec { label: "you".to_string(), ..default_player.clone() };
            let mut players = vec![human];
            players.extend(opponents);
            let config = GameConfig::new(players, None, &default_player, DEFAULT_MAX_ERRORS, seed)?;
            run_interactive(config)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> GameConfig {
        let players = vec!["greedy".parse().unwrap(), "random".parse().unwrap(), "random".parse().unwrap()];
        GameConfig::new(players, None, &DEFAULT_PLAYER.parse().unwrap(), DEFAULT_MAX_ERRORS, Some(seed)).unwrap()
    }

    #[test]
    fn test_seeded_games_are_reproducible() {
        let config = config(21);
        let a = run_game(&config, 4).unwrap();
        let b = run_game(&config, 4).unwrap();
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.log.len(), b.log.len());
        assert_eq!(a.seed, Some(25));
    }

    #[test]
    fn test_play_log_is_json_lines() {
        let config = config(5);
        let players = config.names();
        let reports = vec![run_game(&config, 0).unwrap(), run_game(&config, 1).unwrap()];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.jsonl");
        write_play_log(&reports, &players, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), reports[0].log.len() + reports[1].log.len());
        assert_eq!(lines[0]["event"], "deal");
        assert_eq!(lines[0]["game_id"], 0);
        assert_eq!(lines[0]["players"][1], "random");
        let last = &lines[reports[0].log.len() - 1];
        assert_eq!(last["event"], "final_scores");
        assert_eq!(last["scores"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_simulation_updates_ratings() {
        let dir = tempfile::tempdir().unwrap();
        let ratings_file = dir.path().join("rankings.json");
        let config = SimulationConfig {
            game: config(8),
            n_games: 4,
            log_file: None,
            ratings_file: ratings_file.clone(),
            elo: EloConfig::default(),
        };
        simulate(&config).unwrap();

        let records = JsonFileStore::new(&ratings_file).load();
        assert_eq!(records.len(), 2);
        // Two opponents per game for every seat, random meets itself in none
        assert_eq!(records["greedy"].games_played, 8);
        assert_eq!(records["random"].games_played, 8);
    }
}
