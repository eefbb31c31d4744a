//! Stateless computations over a working set

use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;

use crate::models::{Item, WorkflowStatus};

/// Progress counters for a working set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
}

impl Progress {
    pub fn of<S: WorkflowStatus>(items: &[Item<S>]) -> Self {
        let mut progress = Progress {
            total: items.len(),
            ..Progress::default()
        };
        for item in items {
            if item.status == S::completed() {
                progress.completed += 1;
            } else if item.status == S::in_progress() {
                progress.in_progress += 1;
            } else if item.status == S::initial() {
                progress.not_started += 1;
            }
        }
        progress
    }

    /// Completed share rounded to a whole percent; 0 for an empty set
    pub fn percent(&self) -> u32 {
        rounded_percent(self.completed, self.total)
    }
}

fn rounded_percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

/// Count and share of one status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount<S> {
    pub status: S,
    pub count: usize,
    pub percent: u32,
}

/// Per-status counts in workflow order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBreakdown<S> {
    pub total: usize,
    pub rows: Vec<StatusCount<S>>,
}

impl<S: WorkflowStatus> StatusBreakdown<S> {
    pub fn of(items: &[Item<S>]) -> Self {
        let total = items.len();
        let rows = S::ALL
            .iter()
            .map(|&status| {
                let count = items.iter().filter(|item| item.status == status).count();
                StatusCount {
                    status,
                    count,
                    percent: rounded_percent(count, total),
                }
            })
            .collect();
        Self { total, rows }
    }

    pub fn count(&self, status: S) -> usize {
        self.rows
            .iter()
            .find(|row| row.status == status)
            .map_or(0, |row| row.count)
    }
}

/// Status filter applied by list views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter<S> {
    All,
    Only(S),
}

impl<S: WorkflowStatus> StatusFilter<S> {
    /// Parses `all` or a status wire name
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Some(StatusFilter::All);
        }
        S::parse(s).map(StatusFilter::Only)
    }

    pub fn matches(&self, status: S) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

/// Items passing the status filter whose title or description contains
/// `query`, ignoring case. An empty query matches everything.
pub fn filter_items<'a, S: WorkflowStatus>(
    items: &'a [Item<S>],
    filter: StatusFilter<S>,
    query: &str,
) -> Vec<&'a Item<S>> {
    let query = query.trim().to_lowercase();
    items
        .iter()
        .filter(|item| filter.matches(item.status))
        .filter(|item| {
            query.is_empty()
                || item.title.to_lowercase().contains(&query)
                || item.description.to_lowercase().contains(&query)
        })
        .collect()
}

/// Unfinished items due on or before `today + within_days`, soonest first.
/// Overdue items are included; a horizon past the calendar range is clamped.
pub fn upcoming_deadlines<S: WorkflowStatus>(
    items: &[Item<S>],
    today: NaiveDate,
    within_days: i64,
) -> Vec<&Item<S>> {
    let horizon = TimeDelta::try_days(within_days)
        .and_then(|delta| today.checked_add_signed(delta))
        .unwrap_or(if within_days < 0 {
            NaiveDate::MIN
        } else {
            NaiveDate::MAX
        });
    let mut due: Vec<&Item<S>> = items
        .iter()
        .filter(|item| !item.status.is_completed())
        .filter(|item| item.deadline.is_some_and(|deadline| deadline <= horizon))
        .collect();
    due.sort_by_key(|item| item.deadline);
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StageStatus, TechStatus};

    fn item(id: &str, title: &str, status: TechStatus) -> Item<TechStatus> {
        let mut item = Item::new(id, title);
        item.status = status;
        item
    }

    fn sample() -> Vec<Item<TechStatus>> {
        let mut hooks = item("2", "Hooks", TechStatus::InProgress);
        hooks.description = "useEffect and custom hooks".to_string();
        vec![
            item("1", "Components", TechStatus::Completed),
            hooks,
            item("3", "Router", TechStatus::NotStarted),
        ]
    }

    #[test]
    fn test_progress_counts() {
        let progress = Progress::of(&sample());
        assert_eq!(
            progress,
            Progress {
                total: 3,
                completed: 1,
                in_progress: 1,
                not_started: 1
            }
        );
        assert_eq!(progress.percent(), 33);
        assert_eq!(Progress::of::<TechStatus>(&[]).percent(), 0);
    }

    #[test]
    fn test_breakdown_follows_workflow_order() {
        let mut stage: Item<StageStatus> = Item::new("s1", "Schema");
        stage.status = StageStatus::Blocked;
        let breakdown = StatusBreakdown::of(&[stage]);

        let statuses: Vec<StageStatus> = breakdown.rows.iter().map(|r| r.status).collect();
        assert_eq!(statuses, StageStatus::ALL.to_vec());
        assert_eq!(breakdown.count(StageStatus::Blocked), 1);
        assert_eq!(breakdown.rows[2].percent, 100);
    }

    #[test]
    fn test_blocked_is_not_counted_as_started_or_not() {
        let mut stage: Item<StageStatus> = Item::new("s1", "Schema");
        stage.status = StageStatus::Blocked;
        let progress = Progress::of(&[stage]);
        assert_eq!(progress.total, 1);
        assert_eq!(progress.in_progress + progress.not_started + progress.completed, 0);
    }

    #[test]
    fn test_filter_by_status_and_query() {
        let items = sample();
        assert_eq!(filter_items(&items, StatusFilter::All, "").len(), 3);
        assert_eq!(filter_items(&items, StatusFilter::All, "EFFECT")[0].id, "2");
        assert!(filter_items(&items, StatusFilter::Only(TechStatus::Completed), "hooks").is_empty());

        let filter: StatusFilter<TechStatus> = StatusFilter::parse("not_started").unwrap();
        assert_eq!(filter_items(&items, filter, "")[0].id, "3");
        assert_eq!(StatusFilter::<TechStatus>::parse("ALL"), Some(StatusFilter::All));
    }

    #[test]
    fn test_upcoming_deadlines() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
        let mut items = sample();
        items[0].deadline = NaiveDate::from_ymd_opt(2025, 5, 11);
        items[1].deadline = NaiveDate::from_ymd_opt(2025, 5, 15);
        items[2].deadline = NaiveDate::from_ymd_opt(2025, 5, 1);

        let due = upcoming_deadlines(&items, today, 7);
        let ids: Vec<&str> = due.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert!(upcoming_deadlines(&items, today, 2).iter().all(|i| i.id == "3"));
    }

    #[test]
    fn test_upcoming_deadlines_extreme_horizons() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
        let mut items = sample();
        items[1].deadline = NaiveDate::from_ymd_opt(2025, 5, 15);
        items[2].deadline = NaiveDate::from_ymd_opt(2025, 5, 1);

        assert_eq!(upcoming_deadlines(&items, today, i64::MAX).len(), 2);
        assert!(upcoming_deadlines(&items, today, i64::MIN).is_empty());
        assert_eq!(upcoming_deadlines(&items, today, -5)[0].id, "3");
    }
}
