use tracing::{debug, warn};

use common::{Bar, Error, RawBar, Result};

/// What `BarAggregator::apply_update` did with an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarUpdate {
    /// First update seen; a new in-progress bar was opened.
    Started,
    /// Same bucket as the in-progress bar; folded in.
    Merged,
    /// Same bucket as the newest completed bar (e.g. the forming candle at the
    /// tail of a history load). That bar was reopened as the in-progress bar.
    Resumed,
    /// A new bucket began. Carries the bar that just completed.
    Closed(Bar),
    /// Older than the current bucket; dropped.
    Stale,
}

/// Outcome of `BarAggregator::load_history`.
#[derive(Debug, Default)]
pub struct HistoryLoad {
    pub accepted: usize,
    pub rejected: Vec<Error>,
}

/// Folds incremental OHLC updates into a bounded, time-ordered series of
/// completed bars plus at most one in-progress bar.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    /// Completed bars, oldest first.
    series: Vec<Bar>,
    in_progress: Option<Bar>,
    max_len: usize,
}

impl BarAggregator {
    pub const DEFAULT_MAX_LEN: usize = 200;

    pub fn new(max_len: usize) -> Self {
        Self {
            series: Vec::with_capacity(max_len + 1),
            in_progress: None,
            max_len,
        }
    }

    /// Completed bars, oldest first.
    pub fn series(&self) -> &[Bar] {
        &self.series
    }

    pub fn in_progress(&self) -> Option<&Bar> {
        self.in_progress.as_ref()
    }

    /// Replace the series wholesale with a historical batch.
    ///
    /// Does not go through the merge path. Malformed records, and records that
    /// do not advance the open time, are rejected individually and skipped.
    /// Any in-progress bar is discarded.
    pub fn load_history(&mut self, records: &[RawBar]) -> HistoryLoad {
        let mut load = HistoryLoad::default();
        let mut series: Vec<Bar> = Vec::with_capacity(records.len().min(self.max_len));

        for raw in records {
            let bar = match Bar::from_history(raw) {
                Ok(bar) => bar,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed historical bar");
                    load.rejected.push(e);
                    continue;
                }
            };
            if let Some(prev) = series.last() {
                if bar.open_time <= prev.open_time {
                    let e = Error::Validation(format!(
                        "historical bar at {} does not follow {}",
                        bar.open_time, prev.open_time
                    ));
                    warn!(error = %e, "Dropping out-of-order historical bar");
                    load.rejected.push(e);
                    continue;
                }
            }
            series.push(bar);
            load.accepted += 1;
        }

        if series.len() > self.max_len {
            let excess = series.len() - self.max_len;
            series.drain(..excess);
        }

        self.series = series;
        self.in_progress = None;
        debug!(
            bars = self.series.len(),
            rejected = load.rejected.len(),
            "Bar series replaced from history"
        );
        load
    }

    /// Fold one incremental update into the aggregator.
    ///
    /// Fails with `Error::Validation` if any of epoch/open/high/low/close/open_time
    /// is missing or non-numeric; the update is then dropped without touching state.
    pub fn apply_update(&mut self, raw: &RawBar) -> Result<BarUpdate> {
        let update = Bar::from_update(raw)?;

        let Some(current) = self.in_progress.as_mut() else {
            return Ok(self.open_first(update));
        };

        if update.open_time == current.open_time {
            current.merge(&update);
            return Ok(BarUpdate::Merged);
        }

        if update.open_time < current.open_time {
            warn!(
                open_time = update.open_time,
                current = current.open_time,
                "Dropping stale bar update"
            );
            return Ok(BarUpdate::Stale);
        }

        let closed = std::mem::replace(current, update);
        self.push_completed(closed);
        debug!(
            open_time = closed.open_time,
            close = closed.close,
            series_len = self.series.len(),
            "Bar closed"
        );
        Ok(BarUpdate::Closed(closed))
    }

    fn open_first(&mut self, update: Bar) -> BarUpdate {
        match self.series.last() {
            Some(last) if update.open_time == last.open_time => {
                let mut resumed = *last;
                self.series.pop();
                resumed.merge(&update);
                self.in_progress = Some(resumed);
                BarUpdate::Resumed
            }
            Some(last) if update.open_time < last.open_time => {
                warn!(
                    open_time = update.open_time,
                    newest = last.open_time,
                    "Dropping bar update older than completed series"
                );
                BarUpdate::Stale
            }
            _ => {
                self.in_progress = Some(update);
                BarUpdate::Started
            }
        }
    }

    fn push_completed(&mut self, bar: Bar) {
        self.series.push(bar);
        if self.series.len() > self.max_len {
            self.series.remove(0);
        }
    }
}

impl Default for BarAggregator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_LEN)
    }
}
