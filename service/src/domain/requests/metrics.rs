use std::collections::BTreeMap;
use std::str::FromStr;

use carebridge_common::{InstitutionId, LinkRequest, RequestStatus, UserCategory};
use chrono::{DateTime, Datelike, Duration, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_INSTITUTIONS: usize = 5;
const TRAILING_MONTHS: u32 = 12;

/// Creation-date window the totals are computed over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricsPeriod {
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "365d")]
    Year,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl MetricsPeriod {
    /// Earliest creation instant inside the period, `None` for `all`
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            MetricsPeriod::Week => 7,
            MetricsPeriod::Month => 30,
            MetricsPeriod::Quarter => 90,
            MetricsPeriod::Year => 365,
            MetricsPeriod::All => return None,
        };
        Some(now - Duration::days(days))
    }
}

impl FromStr for MetricsPeriod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "7d" => Ok(MetricsPeriod::Week),
            "30d" => Ok(MetricsPeriod::Month),
            "90d" => Ok(MetricsPeriod::Quarter),
            "365d" => Ok(MetricsPeriod::Year),
            "all" => Ok(MetricsPeriod::All),
            other => Err(format!("unknown metrics period `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsOptions {
    pub period: MetricsPeriod,
    pub top_institutions: usize,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            period: MetricsPeriod::All,
            top_institutions: DEFAULT_TOP_INSTITUTIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
}

impl StatusCounts {
    fn of<'a>(requests: impl IntoIterator<Item = &'a LinkRequest>) -> Self {
        requests.into_iter().fold(Self::default(), |mut counts, request| {
            counts.total += 1;
            match request.status {
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::Approved => counts.approved += 1,
                RequestStatus::Rejected => counts.rejected += 1,
            }
            counts
        })
    }

    /// Rounded percentage of approvals among reviewed requests, 0 when nothing was reviewed
    pub fn approval_rate(&self) -> u32 {
        let reviewed = self.approved + self.rejected;
        if reviewed == 0 {
            return 0;
        }
        (self.approved as f64 * 100.0 / reviewed as f64).round() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBucket {
    /// `YYYY-MM`
    pub month: String,
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionMetrics {
    pub institution_id: InstitutionId,
    pub name: String,
    pub total: usize,
    pub approval_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMetrics {
    pub category: UserCategory,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub approval_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequestMetrics {
    pub period: MetricsPeriod,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub approval_rate: u32,
    /// Mean time to review, one decimal
    pub average_response_hours: f64,
    pub this_week: usize,
    pub last_week: usize,
    /// Rounded percentage change, 0 when last week had no requests
    pub weekly_change: i64,
    /// Oldest month first
    pub monthly: Vec<MonthlyBucket>,
    pub top_institutions: Vec<InstitutionMetrics>,
    pub by_category: Vec<CategoryMetrics>,
}

/// Dashboard statistics over a request history.
///
/// The period restricts the totals, rates, rankings and category breakdown.
/// The weekly and monthly trends always look at the full history.
pub fn compute(requests: &[LinkRequest], now: DateTime<Utc>, options: MetricsOptions) -> LinkRequestMetrics {
    let since = options.period.since(now);
    let in_period = requests
        .iter()
        .filter(|request| since.is_none_or(|since| request.created_at >= since))
        .collect_vec();

    let counts = StatusCounts::of(in_period.iter().copied());
    let (this_week, last_week, weekly_change) = weekly_trend(requests, now);

    LinkRequestMetrics {
        period: options.period,
        counts,
        approval_rate: counts.approval_rate(),
        average_response_hours: average_response_hours(&in_period),
        this_week,
        last_week,
        weekly_change,
        monthly: monthly_series(requests, now),
        top_institutions: top_institutions(&in_period, options.top_institutions),
        by_category: by_category(&in_period),
    }
}

fn average_response_hours(requests: &[&LinkRequest]) -> f64 {
    let response_times = requests
        .iter()
        .filter_map(|request| request.response_time())
        .collect_vec();
    if response_times.is_empty() {
        return 0.0;
    }

    let total_seconds: i64 = response_times.iter().map(|d| d.num_seconds()).sum();
    let hours = total_seconds as f64 / response_times.len() as f64 / 3600.0;
    (hours * 10.0).round() / 10.0
}

fn weekly_trend(requests: &[LinkRequest], now: DateTime<Utc>) -> (usize, usize, i64) {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);

    let this_week = requests
        .iter()
        .filter(|r| r.created_at > week_ago && r.created_at <= now)
        .count();
    let last_week = requests
        .iter()
        .filter(|r| r.created_at > two_weeks_ago && r.created_at <= week_ago)
        .count();

    let change = if last_week == 0 {
        0
    } else {
        ((this_week as f64 - last_week as f64) * 100.0 / last_week as f64).round() as i64
    };
    (this_week, last_week, change)
}

fn month_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

fn monthly_series(requests: &[LinkRequest], now: DateTime<Utc>) -> Vec<MonthlyBucket> {
    // month index counted from year zero
    let current = now.year() * 12 + now.month0() as i32;
    let mut buckets: BTreeMap<i32, MonthlyBucket> = (0..TRAILING_MONTHS as i32)
        .map(|offset| {
            let index = current - offset;
            let bucket = MonthlyBucket {
                month: month_key(index.div_euclid(12), index.rem_euclid(12) as u32 + 1),
                total: 0,
                approved: 0,
                rejected: 0,
            };
            (index, bucket)
        })
        .collect();

    for request in requests {
        let index = request.created_at.year() * 12 + request.created_at.month0() as i32;
        if let Some(bucket) = buckets.get_mut(&index) {
            bucket.total += 1;
            match request.status {
                RequestStatus::Approved => bucket.approved += 1,
                RequestStatus::Rejected => bucket.rejected += 1,
                RequestStatus::Pending => {}
            }
        }
    }

    buckets.into_values().collect()
}

fn top_institutions(requests: &[&LinkRequest], limit: usize) -> Vec<InstitutionMetrics> {
    requests
        .iter()
        .into_group_map_by(|request| request.institution.id)
        .into_iter()
        .map(|(institution_id, group)| {
            let counts = StatusCounts::of(group.iter().map(|request| **request));
            InstitutionMetrics {
                institution_id,
                name: group[0].institution.name.clone(),
                total: counts.total,
                approval_rate: counts.approval_rate(),
            }
        })
        .sorted_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)))
        .take(limit)
        .collect()
}

fn by_category(requests: &[&LinkRequest]) -> Vec<CategoryMetrics> {
    requests
        .iter()
        .into_group_map_by(|request| request.requester.category)
        .into_iter()
        .sorted_by_key(|(category, _)| *category)
        .map(|(category, group)| {
            let counts = StatusCounts::of(group.iter().map(|request| **request));
            CategoryMetrics {
                category,
                counts,
                approval_rate: counts.approval_rate(),
            }
        })
        .collect()
}
