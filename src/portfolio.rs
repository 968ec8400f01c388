//! Paper portfolio accounting
//!
//! Counters change only on realized fills and on calendar boundaries.
//! Equity is `deposit + total_pnl`; the deposit is a fixed reference.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// ISO year/week pair used to detect week boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoWeekKey {
    pub year: i32,
    pub week: u32,
}

impl IsoWeekKey {
    pub fn of(ts: DateTime<Utc>) -> Self {
        let w = ts.iso_week();
        Self {
            year: w.year(),
            week: w.week(),
        }
    }
}

/// Which calendar boundaries were crossed since the last roll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarRoll {
    pub new_day: bool,
    pub new_week: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub deposit: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub deal_count: u64,
    /// High-water mark of equity
    pub max_equity: f64,
    /// Most negative drawdown seen, in percent
    pub max_drawdown: f64,
    pub day: NaiveDate,
    pub week: IsoWeekKey,
}

impl Portfolio {
    pub fn new(deposit: f64, now: DateTime<Utc>) -> Self {
        Self {
            deposit,
            total_pnl: 0.0,
            daily_pnl: 0.0,
            weekly_pnl: 0.0,
            deal_count: 0,
            max_equity: deposit,
            max_drawdown: 0.0,
            day: now.date_naive(),
            week: IsoWeekKey::of(now),
        }
    }

    pub fn equity(&self) -> f64 {
        self.deposit + self.total_pnl
    }

    /// Current drawdown from the high-water mark, in percent (≤ 0)
    pub fn drawdown_pct(&self) -> f64 {
        if self.max_equity <= 0.0 {
            return 0.0;
        }
        (self.equity() - self.max_equity) / self.max_equity * 100.0
    }

    pub fn daily_roi(&self) -> f64 {
        self.daily_pnl / self.deposit
    }

    pub fn weekly_roi(&self) -> f64 {
        self.weekly_pnl / self.deposit
    }

    /// Book one realized fill
    pub fn record_realized(&mut self, net: f64) {
        self.total_pnl += net;
        self.daily_pnl += net;
        self.weekly_pnl += net;
        self.deal_count += 1;

        let equity = self.equity();
        self.max_equity = self.max_equity.max(equity);
        self.max_drawdown = self.max_drawdown.min(self.drawdown_pct());
    }

    /// Reset daily/weekly PnL when `now` lies past the stored day or week
    pub fn roll_calendar(&mut self, now: DateTime<Utc>) -> CalendarRoll {
        let mut roll = CalendarRoll::default();

        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.daily_pnl = 0.0;
            roll.new_day = true;
        }

        let week = IsoWeekKey::of(now);
        if week != self.week {
            self.week = week;
            self.weekly_pnl = 0.0;
            roll.new_week = true;
        }

        roll
    }
}
