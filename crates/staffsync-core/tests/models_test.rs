use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use staffsync_core::{
    EntityAction, EventId, EventPage, EventStatus, IntegrationEvent, ReplayFilter, StatusCounts,
};

fn status_strategy() -> impl Strategy<Value = EventStatus> {
    prop::sample::select(EventStatus::ALL.to_vec())
}

fn event_with(status: EventStatus, entity_type: &str, age_days: i64) -> IntegrationEvent {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    IntegrationEvent {
        id: EventId(7),
        entity_type: entity_type.to_string(),
        entity_id: "EMP0007".to_string(),
        action: EntityAction::Delete,
        payload: json!({}),
        status,
        attempts: 2,
        last_error: Some("timeout".to_string()),
        next_run_at: None,
        created_at: now - Duration::days(age_days),
        processed_at: None,
    }
}

proptest! {
    #[test]
    fn page_count_covers_every_row(total in 0i64..10_000, limit in 1u32..500) {
        let page = EventPage::new(Vec::new(), total, 1, limit);
        let capacity = i64::from(page.pages) * i64::from(limit);
        prop_assert!(capacity >= total);
        prop_assert!(capacity - total < i64::from(limit));
    }

    #[test]
    fn default_replay_filter_selects_only_failed_and_dead(status in status_strategy()) {
        let event = event_with(status, "employee", 1);
        prop_assert_eq!(ReplayFilter::default().matches(&event), status.is_replayable());
    }

    #[test]
    fn status_counts_total_matches_recorded(counts in prop::collection::vec((status_strategy(), 0i64..100), 0..20)) {
        let mut tally = StatusCounts::default();
        let mut expected = 0;
        for (status, count) in counts {
            tally.record(status, count);
            expected += count;
        }
        prop_assert_eq!(tally.total(), expected);
    }
}

#[test]
fn filtered_replay_leaves_non_matching_events_alone() {
    let since = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() - Duration::days(7);
    let filter = ReplayFilter::for_status(Some(EventStatus::Failed))
        .unwrap()
        .with_entity_type("employee")
        .with_since(since);

    assert!(filter.matches(&event_with(EventStatus::Failed, "employee", 3)));
    assert!(!filter.matches(&event_with(EventStatus::Dead, "employee", 3)));
    assert!(!filter.matches(&event_with(EventStatus::Failed, "department", 3)));
    assert!(!filter.matches(&event_with(EventStatus::Failed, "employee", 30)));
}
