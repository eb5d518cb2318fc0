//! Widget content hosted inside terminal surfaces.
//!
//! Each surface owns one [`WidgetState`] built for its content kind. The
//! displayed values come from the instance snapshot; transient state such as
//! a running countdown or the last dice roll lives here and is lost when the
//! surface is rebuilt.

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Timelike};
use rand::Rng;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Circle, Line as CanvasLine};
use ratatui::widgets::{Block, Paragraph, Widget};

use crate::colors::terminal_color;
use crate::instance::{ContentKind, InstanceState};

const HISTORY_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WidgetAction {
    ToggleTimer,
    ResetTimer,
    Roll,
    Flip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Heads,
    Tails,
}

impl Side {
    fn letter(self) -> char {
        match self {
            Side::Heads => 'H',
            Side::Tails => 'T',
        }
    }
}

#[derive(Debug)]
pub(crate) enum WidgetState {
    Clock,
    Countdown {
        elapsed: Duration,
        running_since: Option<Instant>,
        finished: bool,
    },
    Dice {
        faces: Vec<i64>,
    },
    Coin {
        history: VecDeque<Side>,
    },
}

impl WidgetState {
    pub(crate) fn for_content(content: ContentKind) -> Self {
        match content {
            ContentKind::DigitalClock | ContentKind::AnalogClock => WidgetState::Clock,
            ContentKind::Countdown => WidgetState::Countdown {
                elapsed: Duration::ZERO,
                running_since: None,
                finished: false,
            },
            ContentKind::DiceTray => WidgetState::Dice { faces: Vec::new() },
            ContentKind::CoinFlip => WidgetState::Coin {
                history: VecDeque::with_capacity(HISTORY_LEN),
            },
        }
    }

    fn buttons(&self) -> Vec<(&'static str, WidgetAction)> {
        match self {
            WidgetState::Clock => Vec::new(),
            WidgetState::Countdown { running_since, .. } => {
                let toggle = if running_since.is_some() { "[hold]" } else { "[go]" };
                vec![
                    (toggle, WidgetAction::ToggleTimer),
                    ("[reset]", WidgetAction::ResetTimer),
                ]
            }
            WidgetState::Dice { .. } => vec![("[roll]", WidgetAction::Roll)],
            WidgetState::Coin { .. } => vec![("[flip]", WidgetAction::Flip)],
        }
    }

    /// Button under (`dx`, `dy`), relative to the surface origin. Buttons sit
    /// on the last row inside the border, left aligned.
    pub(crate) fn button_at(&self, dx: i32, dy: i32, height: u16) -> Option<WidgetAction> {
        if dy != i32::from(height) - 2 {
            return None;
        }
        let mut x = 1;
        for (label, action) in self.buttons() {
            let width = label.chars().count() as i32;
            if (x..x + width).contains(&dx) {
                return Some(action);
            }
            x += width + 1;
        }
        None
    }

    pub(crate) fn perform(&mut self, action: WidgetAction, state: &InstanceState, now: Instant) {
        match (self, action) {
            (
                WidgetState::Countdown {
                    elapsed,
                    running_since,
                    finished,
                },
                WidgetAction::ToggleTimer,
            ) => match running_since.take() {
                Some(since) => *elapsed += now.saturating_duration_since(since),
                None if !*finished => *running_since = Some(now),
                None => {}
            },
            (
                WidgetState::Countdown {
                    elapsed,
                    running_since,
                    finished,
                },
                WidgetAction::ResetTimer,
            ) => {
                *elapsed = Duration::ZERO;
                *running_since = None;
                *finished = false;
            }
            (WidgetState::Dice { faces }, WidgetAction::Roll) => {
                let count = state.int("count").unwrap_or(1).max(1);
                let sides = state.int("sides").unwrap_or(6).max(2);
                let mut rng = rand::rng();
                *faces = (0..count).map(|_| rng.random_range(1..=sides)).collect();
                tracing::debug!(instance = %state.instance_id, ?faces, "dice rolled");
            }
            (WidgetState::Coin { history }, WidgetAction::Flip) => {
                let side = if rand::rng().random_bool(0.5) {
                    Side::Heads
                } else {
                    Side::Tails
                };
                if history.len() == HISTORY_LEN {
                    history.pop_back();
                }
                history.push_front(side);
            }
            (widget, action) => {
                tracing::trace!(?widget, ?action, "action does not apply to widget");
            }
        }
    }

    /// Advance time-based state. Returns `true` when a countdown with sound
    /// enabled just ran out.
    pub(crate) fn tick(&mut self, state: &InstanceState, now: Instant) -> bool {
        let WidgetState::Countdown {
            elapsed,
            running_since,
            finished,
        } = self
        else {
            return false;
        };
        let Some(since) = *running_since else {
            return false;
        };
        let total = countdown_total(state);
        if *elapsed + now.saturating_duration_since(since) < total {
            return false;
        }
        *elapsed = total;
        *running_since = None;
        *finished = true;
        tracing::info!(instance = %state.instance_id, "countdown finished");
        state.flag("sound")
    }

    pub(crate) fn render(
        &self,
        state: &InstanceState,
        area: Rect,
        buf: &mut Buffer,
        clock: DateTime<Local>,
        now: Instant,
    ) {
        let color = terminal_color(state.color());
        let block = Block::bordered()
            .title(format!(" {} {} ", state.instance_id, state.mode))
            .border_style(Style::default().fg(color));
        let inner = block.inner(area);
        block.render(area, buf);
        if inner.width == 0 || inner.height == 0 {
            return;
        }
        let body = Rect {
            height: inner.height.saturating_sub(u16::from(!self.buttons().is_empty())),
            ..inner
        };
        let style = Style::default().fg(color).add_modifier(Modifier::BOLD);

        match self {
            WidgetState::Clock if state.content_kind() == ContentKind::AnalogClock => {
                analog_face(state, clock, color).render(body, buf);
            }
            WidgetState::Clock => {
                Paragraph::new(Line::styled(digital_time(state, clock), style))
                    .alignment(Alignment::Center)
                    .render(body, buf);
            }
            WidgetState::Countdown {
                elapsed,
                running_since,
                finished,
            } => {
                let spent = *elapsed + running_since.map_or(Duration::ZERO, |s| now.saturating_duration_since(s));
                let left = countdown_total(state).saturating_sub(spent).as_secs();
                let text = if *finished {
                    "done".to_string()
                } else {
                    format!("{:02}:{:02}", left / 60, left % 60)
                };
                Paragraph::new(Line::styled(text, style))
                    .alignment(Alignment::Center)
                    .render(body, buf);
            }
            WidgetState::Dice { faces } => {
                let lines = if faces.is_empty() {
                    vec![Line::styled("roll me", style)]
                } else {
                    let shown: Vec<String> = faces.iter().map(|f| f.to_string()).collect();
                    let total: i64 = faces.iter().sum();
                    vec![
                        Line::styled(shown.join(" "), style),
                        Line::from(format!("total {total}")),
                    ]
                };
                Paragraph::new(lines)
                    .alignment(Alignment::Center)
                    .render(body, buf);
            }
            WidgetState::Coin { history } => {
                let mut lines = vec![Line::styled(
                    match history.front() {
                        Some(Side::Heads) => "HEADS",
                        Some(Side::Tails) => "TAILS",
                        None => "flip me",
                    },
                    style,
                )];
                if state.flag("show_history") && history.len() > 1 {
                    lines.push(Line::from(history.iter().skip(1).map(|s| s.letter()).collect::<String>()));
                }
                Paragraph::new(lines)
                    .alignment(Alignment::Center)
                    .render(body, buf);
            }
        }

        let buttons = self.buttons();
        if !buttons.is_empty() {
            let mut spans = Vec::with_capacity(buttons.len() * 2);
            for (label, _) in buttons {
                spans.push(Span::styled(label, Style::default().fg(color).add_modifier(Modifier::REVERSED)));
                spans.push(Span::raw(" "));
            }
            let row = Rect {
                y: inner.y + inner.height - 1,
                height: 1,
                ..inner
            };
            Line::from(spans).render(row, buf);
        }
    }
}

fn countdown_total(state: &InstanceState) -> Duration {
    Duration::from_secs(state.int("duration_secs").unwrap_or(300).max(1) as u64)
}

fn digital_time(state: &InstanceState, clock: DateTime<Local>) -> String {
    let format = match (state.flag("use_24h"), state.flag("show_seconds")) {
        (true, true) => "%H:%M:%S",
        (true, false) => "%H:%M",
        (false, true) => "%I:%M:%S %p",
        (false, false) => "%I:%M %p",
    };
    clock.format(format).to_string()
}

fn analog_face(state: &InstanceState, clock: DateTime<Local>, color: Color) -> impl Widget {
    let seconds = f64::from(clock.second());
    let minutes = f64::from(clock.minute()) + seconds / 60.0;
    let hours = f64::from(clock.hour() % 12) + minutes / 60.0;
    let show_seconds = state.flag("show_seconds");
    let show_numbers = state.flag("show_numbers");
    Canvas::default()
        .marker(Marker::Braille)
        .x_bounds([-1.0, 1.0])
        .y_bounds([-1.0, 1.0])
        .paint(move |ctx| {
            ctx.draw(&Circle {
                x: 0.0,
                y: 0.0,
                radius: 0.95,
                color,
            });
            ctx.draw(&hand(hours / 12.0, 0.5, color));
            ctx.draw(&hand(minutes / 60.0, 0.8, color));
            if show_seconds {
                ctx.draw(&hand(seconds / 60.0, 0.85, Color::Red));
            }
            if show_numbers {
                ctx.print(-0.1, 0.75, "12");
                ctx.print(0.75, 0.0, "3");
                ctx.print(0.0, -0.8, "6");
                ctx.print(-0.85, 0.0, "9");
            }
        })
}

/// Clock hand at `turn` (0..1, clockwise from twelve).
fn hand(turn: f64, length: f64, color: Color) -> CanvasLine {
    let angle = turn * TAU;
    CanvasLine::new(0.0, 0.0, angle.sin() * length, angle.cos() * length, color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::instance::{InstanceId, Mode, SettingValue};
    use chrono::TimeZone;

    fn state(mode: Mode) -> InstanceState {
        InstanceState::new(InstanceId::new(1).unwrap(), mode, Geometry::default())
    }

    fn row_text(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf.cell((x, y)).map_or(" ", |c| c.symbol()))
            .collect()
    }

    #[test]
    fn timer_buttons_sit_on_last_inner_row() {
        let widget = WidgetState::for_content(ContentKind::Countdown);
        assert_eq!(widget.button_at(1, 3, 5), Some(WidgetAction::ToggleTimer));
        assert_eq!(widget.button_at(4, 3, 5), Some(WidgetAction::ToggleTimer));
        assert_eq!(widget.button_at(5, 3, 5), None);
        assert_eq!(widget.button_at(6, 3, 5), Some(WidgetAction::ResetTimer));
        assert_eq!(widget.button_at(1, 2, 5), None);
        assert_eq!(WidgetState::Clock.button_at(1, 2, 4), None);
    }

    #[test]
    fn countdown_runs_out_and_rings() {
        let mut s = state(Mode::Timer);
        s.settings.insert("duration_secs".into(), SettingValue::Int(2));
        let mut widget = WidgetState::for_content(ContentKind::Countdown);
        let start = Instant::now();
        widget.perform(WidgetAction::ToggleTimer, &s, start);
        assert!(!widget.tick(&s, start + Duration::from_secs(1)));
        assert!(widget.tick(&s, start + Duration::from_secs(3)));
        assert!(!widget.tick(&s, start + Duration::from_secs(4)));
        widget.perform(WidgetAction::ResetTimer, &s, start);
        assert!(matches!(
            widget,
            WidgetState::Countdown {
                finished: false,
                ..
            }
        ));
    }

    #[test]
    fn roll_respects_count_and_sides() {
        let mut s = state(Mode::Dice);
        s.settings.insert("count".into(), SettingValue::Int(4));
        s.settings.insert("sides".into(), SettingValue::Int(3));
        let mut widget = WidgetState::for_content(ContentKind::DiceTray);
        widget.perform(WidgetAction::Roll, &s, Instant::now());
        let WidgetState::Dice { faces } = &widget else {
            panic!("dice widget expected");
        };
        assert_eq!(faces.len(), 4);
        assert!(faces.iter().all(|f| (1..=3).contains(f)));
    }

    #[test]
    fn coin_history_is_bounded() {
        let s = state(Mode::Coin);
        let mut widget = WidgetState::for_content(ContentKind::CoinFlip);
        for _ in 0..20 {
            widget.perform(WidgetAction::Flip, &s, Instant::now());
        }
        let WidgetState::Coin { history } = &widget else {
            panic!("coin widget expected");
        };
        assert_eq!(history.len(), HISTORY_LEN);
    }

    #[test]
    fn digital_clock_honours_flags() {
        let clock = Local.with_ymd_and_hms(2024, 3, 9, 15, 4, 5).unwrap();
        let mut s = state(Mode::Digital);
        assert_eq!(digital_time(&s, clock), "15:04:05");
        s.settings.insert("use_24h".into(), SettingValue::Bool(false));
        s.settings.insert("show_seconds".into(), SettingValue::Bool(false));
        assert_eq!(digital_time(&s, clock), "03:04 PM");
    }

    #[test]
    fn render_draws_title_and_buttons() {
        let s = state(Mode::Coin);
        let widget = WidgetState::for_content(ContentKind::CoinFlip);
        let area = Rect::new(0, 0, 18, 5);
        let mut buf = Buffer::empty(area);
        let clock = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        widget.render(&s, area, &mut buf, clock, Instant::now());
        assert!(row_text(&buf, 0).contains("#1 coin"));
        assert!(row_text(&buf, 3).contains("[flip]"));
    }
}
