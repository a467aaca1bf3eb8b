//! Simulation calendar and tick accumulators.

use chrono::{Datelike, Months, NaiveDate};
use trade_core::snapshot::default_start_date;
use trade_core::{RegionId, RouteKey};

/// Upper bound on route ticks run by one update; the rest of the backlog is dropped.
pub const MAX_ROUTE_CATCH_UP: u32 = 8;

/// Upper bound on months closed by one update; the rest of the backlog is dropped.
pub const MAX_MONTH_CATCH_UP: u32 = 12;

#[derive(Clone, Debug, PartialEq)]
pub struct TradeClock {
    pub date: NaiveDate,
    /// Price ticks elapsed; one per simulated month.
    pub tick: u64,
    pub route_accumulator: f64,
    pub price_accumulator: f64,
    pub route_cursor: Option<RouteKey>,
    pub hub_cursor: Option<RegionId>,
    /// Route ticks elapsed.
    pub flow_ticks: u64,
}

impl Default for TradeClock {
    fn default() -> Self {
        Self::new(default_start_date())
    }
}

impl TradeClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            tick: 0,
            route_accumulator: 0.0,
            price_accumulator: 0.0,
            route_cursor: None,
            hub_cursor: None,
            flow_ticks: 0,
        }
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    /// Step the calendar one month and count a price tick.
    pub fn advance_month(&mut self) {
        match self.date.checked_add_months(Months::new(1)) {
            Some(d) => self.date = d,
            None => tracing::warn!(date = %self.date, "calendar overflow; date not advanced"),
        }
        self.tick += 1;
    }

    /// Add `delta_secs` and return how many route ticks are due, capped.
    pub fn take_route_ticks(&mut self, delta_secs: f64, interval_secs: f64) -> u32 {
        take_ticks(&mut self.route_accumulator, delta_secs, interval_secs, MAX_ROUTE_CATCH_UP)
    }

    /// Add `delta_secs` and return how many price ticks are due, capped.
    pub fn take_price_ticks(&mut self, delta_secs: f64, interval_secs: f64) -> u32 {
        take_ticks(&mut self.price_accumulator, delta_secs, interval_secs, MAX_MONTH_CATCH_UP)
    }
}

fn take_ticks(acc: &mut f64, delta_secs: f64, interval_secs: f64, cap: u32) -> u32 {
    if !(delta_secs.is_finite() && delta_secs > 0.0) || interval_secs <= 0.0 {
        return 0;
    }
    *acc += delta_secs;
    let due = (*acc / interval_secs).floor();
    *acc -= due * interval_secs;
    if due > f64::from(cap) {
        *acc = 0.0;
        return cap;
    }
    due as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn months_roll_over_years() {
        let mut c = TradeClock::new(NaiveDate::from_ymd_opt(1200, 12, 1).unwrap());
        c.advance_month();
        assert_eq!((c.year(), c.month()), (1201, 1));
        assert_eq!(c.tick, 1);
    }

    #[test]
    fn route_catch_up_is_capped() {
        let mut c = TradeClock::default();
        assert_eq!(c.take_route_ticks(2.0, 5.0), 0);
        assert_eq!(c.take_route_ticks(3.5, 5.0), 1);
        assert!((c.route_accumulator - 0.5).abs() < 1e-9);
        assert_eq!(c.take_route_ticks(1000.0, 5.0), MAX_ROUTE_CATCH_UP);
        assert_eq!(c.route_accumulator, 0.0);
        assert_eq!(c.take_price_ticks(90.0, 30.0), 3);
        assert_eq!(c.take_route_ticks(-1.0, 5.0), 0);
    }

    #[test]
    fn month_catch_up_is_capped() {
        let mut c = TradeClock::default();
        assert_eq!(c.take_price_ticks(1.0e12, 30.0), MAX_MONTH_CATCH_UP);
        assert_eq!(c.price_accumulator, 0.0);
        assert_eq!(c.take_price_ticks(f64::MAX, 30.0), MAX_MONTH_CATCH_UP);
        assert_eq!(c.take_price_ticks(45.0, 30.0), 1);
        assert!((c.price_accumulator - 15.0).abs() < 1e-9);
    }
}
