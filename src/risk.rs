//! Portfolio risk controller
//!
//! Two independent gates decide whether new grids may be opened:
//!
//! - Calendar pauses: daily/weekly ROI (realized PnL over the deposit) past
//!   its stop-loss or take-profit bound pauses trading until the next day
//!   (or ISO week) boundary.
//! - Drawdown breaker: drawdown from the equity high-water mark at or below
//!   `drawdown_stop_pct` stops trading until it recovers above
//!   `drawdown_resume_pct`. The gap between the two is the hysteresis band.
//!
//! The breaker wins when both apply. Any mode other than ACTIVE means the
//! engine tears down every grid and builds no new ones.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::portfolio::{CalendarRoll, Portfolio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskMode {
    #[default]
    Active,
    PausedDaily,
    PausedWeekly,
    Stopped,
}

impl std::fmt::Display for RiskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskMode::Active => "ACTIVE",
            RiskMode::PausedDaily => "PAUSED_DAILY",
            RiskMode::PausedWeekly => "PAUSED_WEEKLY",
            RiskMode::Stopped => "STOPPED",
        };
        write!(f, "{}", s)
    }
}

/// Calendar pause currently in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseKind {
    Daily,
    Weekly,
}

/// Persisted controller state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskState {
    pub pause: Option<PauseKind>,
    pub stopped: bool,
    /// Manual resume: ignore the daily bounds until the next day
    pub suppress_daily: bool,
    /// Manual resume: ignore the weekly bounds until the next week
    pub suppress_weekly: bool,
    /// Drawdown at a manual resume taken inside the stop zone. Until drawdown
    /// recovers above the resume threshold the breaker re-trips only below it.
    pub drawdown_floor: Option<f64>,
}

/// A mode transition worth telling the operator about
#[derive(Debug, Clone, PartialEq)]
pub enum RiskEvent {
    Paused { mode: RiskMode, roi: f64 },
    Resumed { from: RiskMode },
    Stopped { drawdown_pct: f64 },
    Recovered { drawdown_pct: f64 },
    ManualResume,
}

impl std::fmt::Display for RiskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskEvent::Paused { mode, roi } => {
                write!(f, "Risk pause {} (ROI {:+.2}%)", mode, roi * 100.0)
            }
            RiskEvent::Resumed { from } => write!(f, "Resumed trading after {}", from),
            RiskEvent::Stopped { drawdown_pct } => {
                write!(f, "Drawdown breaker tripped at {:.2}%", drawdown_pct)
            }
            RiskEvent::Recovered { drawdown_pct } => {
                write!(f, "Drawdown recovered to {:.2}%, breaker cleared", drawdown_pct)
            }
            RiskEvent::ManualResume => write!(f, "Trading resumed manually"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskController {
    config: RiskConfig,
    state: RiskState,
}

impl RiskController {
    pub fn new(config: RiskConfig) -> Self {
        Self::with_state(config, RiskState::default())
    }

    pub fn with_state(config: RiskConfig, state: RiskState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn mode(&self) -> RiskMode {
        if self.state.stopped {
            return RiskMode::Stopped;
        }
        match self.state.pause {
            Some(PauseKind::Daily) => RiskMode::PausedDaily,
            Some(PauseKind::Weekly) => RiskMode::PausedWeekly,
            None => RiskMode::Active,
        }
    }

    pub fn allows_new_grids(&self) -> bool {
        self.mode() == RiskMode::Active
    }

    fn daily_breached(&self, p: &Portfolio) -> bool {
        let roi = p.daily_roi();
        roi <= self.config.daily_stop_loss || roi >= self.config.daily_take_profit
    }

    fn weekly_breached(&self, p: &Portfolio) -> bool {
        let roi = p.weekly_roi();
        roi <= self.config.weekly_stop_loss || roi >= self.config.weekly_take_profit
    }

    /// Lift calendar pauses whose period just ended
    pub fn on_calendar(&mut self, roll: CalendarRoll) -> Vec<RiskEvent> {
        let mut events = Vec::new();

        if roll.new_week {
            self.state.suppress_weekly = false;
            if self.state.pause == Some(PauseKind::Weekly) {
                self.state.pause = None;
                events.push(RiskEvent::Resumed {
                    from: RiskMode::PausedWeekly,
                });
            }
        }
        if roll.new_day {
            self.state.suppress_daily = false;
            if self.state.pause == Some(PauseKind::Daily) {
                self.state.pause = None;
                events.push(RiskEvent::Resumed {
                    from: RiskMode::PausedDaily,
                });
            }
        }

        for e in &events {
            info!("{}", e);
        }
        events
    }

    /// Re-check the bounds against the latest portfolio counters
    pub fn evaluate(&mut self, portfolio: &Portfolio) -> Vec<RiskEvent> {
        let mut events = Vec::new();
        let dd = portfolio.drawdown_pct();

        if self.state.stopped {
            if dd > self.config.drawdown_resume_pct {
                self.state.stopped = false;
                events.push(RiskEvent::Recovered { drawdown_pct: dd });
            }
        } else if let Some(floor) = self.state.drawdown_floor {
            if dd > self.config.drawdown_resume_pct {
                self.state.drawdown_floor = None;
            } else if dd <= self.config.drawdown_stop_pct && dd < floor {
                self.state.drawdown_floor = None;
                self.state.stopped = true;
                events.push(RiskEvent::Stopped { drawdown_pct: dd });
            }
        } else if dd <= self.config.drawdown_stop_pct {
            self.state.stopped = true;
            events.push(RiskEvent::Stopped { drawdown_pct: dd });
        }

        let weekly = !self.state.suppress_weekly && self.weekly_breached(portfolio);
        let daily = !self.state.suppress_daily && self.daily_breached(portfolio);

        match self.state.pause {
            None | Some(PauseKind::Daily) if weekly => {
                self.state.pause = Some(PauseKind::Weekly);
                events.push(RiskEvent::Paused {
                    mode: RiskMode::PausedWeekly,
                    roi: portfolio.weekly_roi(),
                });
            }
            None if daily => {
                self.state.pause = Some(PauseKind::Daily);
                events.push(RiskEvent::Paused {
                    mode: RiskMode::PausedDaily,
                    roi: portfolio.daily_roi(),
                });
            }
            _ => {}
        }

        for e in &events {
            warn!(drawdown_pct = format!("{:.2}", dd), "{}", e);
        }
        events
    }

    /// Operator override: clear every pause and suppress the bounds that are
    /// currently breached until their natural reset.
    pub fn force_resume(&mut self, portfolio: &Portfolio) -> RiskEvent {
        self.state.suppress_daily = self.daily_breached(portfolio);
        self.state.suppress_weekly = self.weekly_breached(portfolio);
        let dd = portfolio.drawdown_pct();
        self.state.drawdown_floor = (dd <= self.config.drawdown_resume_pct).then_some(dd);
        self.state.pause = None;
        self.state.stopped = false;

        info!("Risk controller force-resumed");
        RiskEvent::ManualResume
    }
}
