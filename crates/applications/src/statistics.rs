use serde::Serialize;

use crate::ApplicationStatus;

/// Application counts per status, as shown on the admin dashboard.
///
/// Applications without a status count only toward `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStatistics {
    pub total: u64,
    pub in_work: u64,
    pub new: u64,
    pub agree: u64,
    pub disagree: u64,
    pub dubbing: u64,
}

impl StatusStatistics {
    pub fn record(&mut self, status: Option<ApplicationStatus>, count: u64) {
        self.total += count;
        let slot = match status {
            Some(ApplicationStatus::InWork) => &mut self.in_work,
            Some(ApplicationStatus::New) => &mut self.new,
            Some(ApplicationStatus::Agree) => &mut self.agree,
            Some(ApplicationStatus::Disagree) => &mut self.disagree,
            Some(ApplicationStatus::Dubbing) => &mut self.dubbing,
            None => return,
        };
        *slot += count;
    }
}

impl FromIterator<Option<ApplicationStatus>> for StatusStatistics {
    fn from_iter<I: IntoIterator<Item = Option<ApplicationStatus>>>(iter: I) -> Self {
        let mut stats = Self::default();
        for status in iter {
            stats.record(status, 1);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn counts_by_status() {
        let stats: StatusStatistics = [
            Some(ApplicationStatus::New),
            Some(ApplicationStatus::New),
            Some(ApplicationStatus::InWork),
            None,
        ]
        .into_iter()
        .collect();

        assert_eq!(stats.total, 4);
        assert_eq!(stats.new, 2);
        assert_eq!(stats.in_work, 1);
        assert_eq!(stats.agree, 0);
    }

    #[test]
    fn serializes_dashboard_keys() {
        let json = serde_json::to_value(StatusStatistics::default()).unwrap();
        for key in ["total", "inWork", "new", "agree", "disagree", "dubbing"] {
            assert!(json.get(key).is_some(), "{key}");
        }
    }

    proptest! {
        #[test]
        fn buckets_sum_to_total_minus_unset(statuses in proptest::collection::vec(proptest::option::of(0usize..5), 0..200)) {
            let mapped: Vec<_> = statuses.iter().map(|s| s.map(|i| ApplicationStatus::ALL[i])).collect();
            let unset = mapped.iter().filter(|s| s.is_none()).count() as u64;
            let stats: StatusStatistics = mapped.into_iter().collect();

            let buckets = stats.in_work + stats.new + stats.agree + stats.disagree + stats.dubbing;
            prop_assert_eq!(buckets, stats.total - unset);
        }
    }
}
