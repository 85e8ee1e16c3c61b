use crate::deciders::legal_moves;
use crate::games::escoba::cards::{Card, Suit};
use crate::games::escoba::{self, Action, Outcome, PlayerState, Record, TurnRecord};

use ratatui::layout::{Constraint, Direction, Flex, Layout};
use ratatui::style::{self, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{BorderType, Borders, Clear, HighlightSpacing, List, ListState, Row, StatefulWidget, Table};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
};

pub const HUMAN_SEAT: usize = 0;

#[derive(Clone)]
pub struct InteractiveApp {
    pub state: escoba::State,
    pub ply: usize,
    pub actions: Vec<(Card, Vec<Card>)>,
    pub actions_state: ListState,
    pub outcome: Option<Outcome>,
}

impl InteractiveApp {
    pub fn new(state: escoba::State) -> Self {
        Self {
            state,
            ply: 0,
            actions: Vec::new(),
            actions_state: ListState::default(),
            outcome: None,
        }
    }

    pub fn human_to_move(&self) -> bool {
        escoba::current_player(&self.state) == Some(HUMAN_SEAT)
    }

    // Recompute the move list for the human, keeping the cursor in range
    pub fn refresh_actions(&mut self) {
        if !self.human_to_move() {
            self.actions.clear();
            self.actions_state.select(None);
            return;
        }

        self.actions = legal_moves(&self.state.players[HUMAN_SEAT].hand, &self.state.table);
        match self.actions_state.selected() {
            Some(idx) if idx < self.actions.len() => {},
            _ => self.actions_state.select_first(),
        }
    }

    pub fn selected_action(&self) -> Option<(Card, Vec<Card>)> {
        self.actions_state.selected().and_then(|idx| self.actions.get(idx).cloned())
    }
}

fn suit_to_color(suit: Suit) -> style::Color {
    match suit {
        Suit::Coins => style::Color::Yellow,
        Suit::Cups => style::Color::Red,
        Suit::Batons => style::Color::Green,
        Suit::Swords => style::Color::Blue,
    }
}

fn card_span(card: Card) -> Span<'static> {
    Span::styled(format!(" {} ", card), Style::default().fg(suit_to_color(card.suit)))
}

fn cards_line(prefix: &str, cards: &[Card]) -> Line<'static> {
    let mut spans = vec![Span::raw(prefix.to_string())];
    if cards.is_empty() {
        spans.push(Span::styled(" (empty)", Style::default().fg(style::Color::Gray)));
    } else {
        spans.extend(cards.iter().map(|&c| card_span(c)));
    }
    Line::from(spans)
}

impl Widget for PlayerState {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let coins = self.captured.iter().filter(|c| c.is_coins()).count();
        let mut lines = vec![
            Line::from(""),
            Line::from(format!("  Hand: {} cards", self.hand.len())),
            Line::from(format!("  Captured: {} ({} coins)", self.captured.len(), coins)),
            Line::from(format!("  Escobas: {}", self.escobas)),
        ];

        if self.captured.iter().any(|c| c.is_seven_of_coins()) {
            lines.push(Line::from(vec!["  Holds".into(), card_span(escoba::cards::SEVEN_OF_COINS)]));
        }
        if self.errors > 0 {
            lines.push(Line::from(Span::styled(format!("  Errors: {}", self.errors), Style::default().fg(style::Color::Red))));
        }

        Text::from(lines).render(area, buf);
    }
}

// Format a move for the main window selector
fn action_span(action: &(Card, Vec<Card>), action_idx: usize) -> Line<'static> {
    let (card, capture) = action;
    let mut spans = vec![
        Span::styled(format!(" {:>3}. ", action_idx), Style::default()),
        "Play".into(),
        card_span(*card),
    ];

    if capture.is_empty() {
        spans.push("to the table".into());
    } else {
        spans.push("taking".into());
        spans.extend(capture.iter().map(|&c| card_span(c)));
    }

    Line::from(spans)
}

fn turn_line(turn: &TurnRecord) -> Line<'static> {
    let mut spans = vec![
        format!("  P{} {}: ", turn.seat, turn.player).italic(),
        card_span(turn.played_card),
    ];

    spans.push(match &turn.action {
        Action::Capture { .. } => Span::raw(turn.action.to_string()),
        Action::Discard => Span::raw("to the table"),
        Action::InvalidCapture { .. } => Span::styled("to the table (invalid capture)", Style::default().fg(style::Color::Red)),
    });

    if turn.escoba {
        spans.push(Span::styled(" ESCOBA! ", Style::default().fg(style::Color::Yellow)).bold().add_modifier(Modifier::REVERSED));
    }
    if turn.decider_failed {
        spans.push(Span::styled(" decider failed", Style::default().fg(style::Color::Red)));
    }

    Line::from(spans)
}

impl Widget for InteractiveApp {
    fn render(mut self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(4),
                Constraint::Length(9),
                Constraint::Length(7),
                Constraint::Min(8),
            ])
            .split(area);

        let block = Block::bordered()
            .border_set(border::THICK);

        let current = escoba::current_player(&self.state);
        let header_text = Text::from(vec![Line::from(vec![
            " ".into(),
            if self.outcome.is_some() {
                Span::styled(" GAME OVER ", Style::default().fg(style::Color::Red)).bold().add_modifier(Modifier::SLOW_BLINK | Modifier::REVERSED)
            } else {
                Span::styled(" GAME RUNNING ", Style::default().fg(style::Color::Blue)).bold().add_modifier(Modifier::REVERSED)
            },
            format!(" Players: {}, ", self.state.players.len()).into(),
            match current {
                Some(seat) => format!("Current Player: P{}, ", seat).into(),
                None => "Current Player: -, ".into(),
            },
            format!("Round: {}, ", self.state.rounds).into(),
            format!("Ply: {}, ", self.ply).into(),
            format!("Deck: {} cards", self.state.deck.len()).into(),
        ])]);

        Paragraph::new(header_text)
            .block(block)
            .render(layout[0], buf);

        Paragraph::new(vec![Line::from(""), cards_line(" ", &self.state.table)])
            .render(layout[1], buf);
        Block::bordered().title(" Table ").render(layout[1], buf);

        let players_layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Min(24); self.state.players.len()])
            .split(layout[2]);

        for (i, player) in self.state.players.iter().enumerate() {
            let title = if i == HUMAN_SEAT {
                format!(" P{} {} (you) ", i, player.name)
            } else {
                format!(" P{} {} ", i, player.name)
            };
            let block = Block::default()
                .title(Line::from(title.bold()))
                .border_type(if current == Some(i) { BorderType::QuadrantOutside } else { BorderType::Plain })
                .border_style(Style::default().fg(style::Color::Blue))
                .borders(Borders::ALL);

            player.clone().render(players_layout[i], buf);
            block.render(players_layout[i], buf);
        }

        // Latest turn of every seat
        let mut recent: Vec<Line> = self.state.log
            .iter()
            .rev()
            .filter_map(|r| match r {
                Record::Turn(turn) => Some(turn_line(turn)),
                _ => None,
            })
            .take(self.state.players.len())
            .collect();
        recent.reverse();
        if recent.is_empty() {
            recent.push("  No moves yet".italic().into());
        }
        recent.insert(0, Line::from(""));

        Paragraph::new(recent).render(layout[3], buf);
        Block::bordered().title(" Last Moves ").render(layout[3], buf);

        let actions_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![Constraint::Length(2), Constraint::Min(4)])
            .split(layout[4]);

        Paragraph::new(vec![Line::from(""), cards_line("  Your hand:", &self.state.players[HUMAN_SEAT].hand)])
            .render(actions_layout[0], buf);

        let items = List::new(self.actions.iter().enumerate().map(|(idx, action)| action_span(action, idx)))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD))
            .highlight_symbol(" →")
            .highlight_spacing(HighlightSpacing::Always)
            .repeat_highlight_symbol(true);

        StatefulWidget::render(items, actions_layout[1], buf, &mut self.actions_state);

        let block = Block::bordered()
            .title(Line::from(" Moves ".bold()).centered())
            .title_bottom(Line::from(vec![
                " Greedy Play ".into(),
                "<SPC> ".blue().bold(),
                " Proceed ".into(),
                "<RET> ".blue().bold(),
                " Quit ".into(),
                "<q> ".blue().bold(),
            ]).right_aligned());

        block.render(layout[4], buf);

        // Final scores popup
        if let Some(outcome) = &self.outcome {
            let block = Block::bordered()
                .border_type(BorderType::Thick)
                .title(" Final Scores ");
            let vertical = Layout::vertical([Constraint::Percentage(50)]).flex(Flex::Center);
            let horizontal = Layout::horizontal([Constraint::Percentage(50)]).flex(Flex::Center);
            let [area] = vertical.areas(area);
            let [area] = horizontal.areas(area);
            Clear.render(area, buf);

            let mut rows = vec![Row::new(vec!["", ""]), Row::new(vec!["", ""])];
            if let Outcome::Terminated { offender, .. } = outcome {
                rows.push(Row::new(vec![
                    format!("  Stopped early, P{} kept failing", offender),
                    String::new(),
                ]));
            }
            let winners = outcome.winners();
            for score in outcome.scores() {
                let marker = if winners.contains(&score.seat) { " *" } else { "" };
                rows.push(Row::new(vec![
                    format!("  P{} {}{}", score.seat, score.player, marker),
                    score.score.to_string(),
                ]));
            }

            let table = Table::new(rows, [
                Constraint::Percentage(80),
                Constraint::Percentage(20),
            ])
                .column_spacing(1);

            Widget::render(table, area, buf);
            block.render(area, buf);
        }
    }
}
