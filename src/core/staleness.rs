//! Monthly staleness of stored thresholds and the reminders it produces.
//!
//! Thresholds computed in one calendar month become due for an update on the
//! first day of the next month. Once due, every further full week without a
//! recompute makes them overdue again, and each new week gets its own
//! reminder.

use chrono::{Datelike, Months, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    DueForUpdate { since: NaiveDate },
    OverdueRepeat { since: NaiveDate, weeks: u32 },
}

impl Staleness {
    /// State on `today` for thresholds that became due on `since`.
    pub fn since(since: NaiveDate, today: NaiveDate) -> Self {
        if today < since {
            return Staleness::Fresh;
        }
        let weeks = ((today - since).num_days() / 7) as u32;
        if weeks == 0 {
            Staleness::DueForUpdate { since }
        } else {
            Staleness::OverdueRepeat { since, weeks }
        }
    }

    /// State on `today` for thresholds computed on `computed_on`.
    pub fn evaluate(computed_on: NaiveDate, today: NaiveDate) -> Self {
        match due_date(computed_on) {
            Some(since) => Staleness::since(since, today),
            None => Staleness::Fresh,
        }
    }

    pub fn needs_update(&self) -> bool {
        !matches!(self, Staleness::Fresh)
    }
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Staleness::Fresh => write!(f, "fresh"),
            Staleness::DueForUpdate { since } => write!(f, "due for update since {since}"),
            Staleness::OverdueRepeat { since, weeks } => {
                write!(f, "overdue by {weeks} week(s), due since {since}")
            }
        }
    }
}

/// First day of the month after `computed_on`'s month.
pub fn due_date(computed_on: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(computed_on.year(), computed_on.month(), 1)?
        .checked_add_months(Months::new(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub title: String,
    pub message: String,
}

/// Turns staleness checks into reminders, emitting each state at most once.
#[derive(Debug, Default)]
pub struct ReminderTracker {
    last_reminded: Option<Staleness>,
    unknown_since: Option<NaiveDate>,
}

impl ReminderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates staleness for this tick. `computed_on` is `None` when the
    /// stored snapshot does not record when it was computed; such thresholds
    /// count as due from the first tick that saw them.
    pub fn check(
        &mut self,
        computed_on: Option<NaiveDate>,
        today: NaiveDate,
    ) -> (Staleness, Option<Reminder>) {
        let state = match computed_on {
            Some(date) => Staleness::evaluate(date, today),
            None => Staleness::since(*self.unknown_since.get_or_insert(today), today),
        };

        // The first reminder of a stale stretch is always the due one, even
        // when the first tick after the month change lands weeks late.
        let first_of_stretch = self.last_reminded.is_none();
        let reminder = match state {
            Staleness::Fresh => {
                self.last_reminded = None;
                None
            }
            _ if self.last_reminded == Some(state) => None,
            Staleness::OverdueRepeat { since, weeks } if !first_of_stretch => Some(Reminder {
                title: format!("Thresholds Overdue ({weeks} week(s))"),
                message: format!(
                    "Thresholds have been due for an update since {since}. Run `fxalert update` to refresh them."
                ),
            }),
            _ => Some(Reminder {
                title: "Threshold Update Due".to_string(),
                message: match computed_on {
                    Some(date) => format!(
                        "Thresholds were computed on {date}. A new month has started, run `fxalert update` to refresh them."
                    ),
                    None => "Stored thresholds have no computation date. Run `fxalert update` to refresh them.".to_string(),
                },
            }),
        };

        if reminder.is_some() {
            self.last_reminded = Some(state);
        }
        (state, reminder)
    }

    /// Called after a successful recompute.
    pub fn reset(&mut self) {
        self.last_reminded = None;
        self.unknown_since = None;
    }
}
