//! Process-activity ranking.

use std::collections::HashMap;

use crate::cache::process_name_quick;
use crate::events::Event;

/// Per-PID activity row.
#[derive(Debug, Clone)]
pub struct PidActivity {
    pub pid: u32,
    pub name: String,
    pub count: u64,
    pub percentage: f64,
}

/// Count events by PID and rank descending. A PID's name comes from any
/// event that already carries one, then the quick /proc lookup, finally
/// "unknown".
pub fn analyze_process_activity(events: &[Event]) -> Vec<PidActivity> {
    let total = events.len();
    if total == 0 {
        return Vec::new();
    }

    let mut counts: HashMap<u32, u64> = HashMap::new();
    for event in events {
        *counts.entry(event.pid).or_default() += 1;
    }

    let mut activity: Vec<PidActivity> = counts
        .into_iter()
        .map(|(pid, count)| {
            let mut name = events
                .iter()
                .find(|e| e.pid == pid && !e.process_name.is_empty())
                .map(|e| e.process_name.clone())
                .unwrap_or_default();
            if name.is_empty() {
                name = process_name_quick(pid);
            }
            if name.is_empty() {
                name = "unknown".to_string();
            }

            PidActivity {
                pid,
                name,
                count,
                percentage: count as f64 / total as f64 * 100.0,
            }
        })
        .collect();

    activity.sort_by(|a, b| b.count.cmp(&a.count));
    activity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    fn event(pid: u32, name: &str) -> Event {
        Event {
            pid,
            process_name: name.to_string(),
            ..Event::of(EventType::Dns)
        }
    }

    #[test]
    fn test_empty_events() {
        assert!(analyze_process_activity(&[]).is_empty());
    }

    #[test]
    fn test_counts_and_percentages() {
        let events = vec![
            event(1, "a"),
            event(1, "a"),
            event(1, "a"),
            event(2, "b"),
        ];

        let activity = analyze_process_activity(&events);
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].pid, 1);
        assert_eq!(activity[0].count, 3);
        assert_eq!(activity[0].percentage, 75.0);
        assert_eq!(activity[1].count, 1);
        assert_eq!(activity[1].percentage, 25.0);
    }

    #[test]
    fn test_name_from_any_named_event() {
        let events = vec![event(9, ""), event(9, "late-name"), event(9, "")];

        let activity = analyze_process_activity(&events);
        assert_eq!(activity[0].name, "late-name");
    }

    #[test]
    fn test_unknown_name_fallback() {
        // An invalid PID defeats the /proc lookup, leaving "unknown".
        let events = vec![event(0, "")];

        let activity = analyze_process_activity(&events);
        assert_eq!(activity[0].name, "unknown");
    }

    #[test]
    fn test_sorted_descending() {
        let events = vec![
            event(1, "a"),
            event(2, "b"),
            event(2, "b"),
            event(3, "c"),
            event(3, "c"),
            event(3, "c"),
        ];

        let activity = analyze_process_activity(&events);
        let counts: Vec<u64> = activity.iter().map(|a| a.count).collect();
        assert_eq!(counts, vec![3, 2, 1]);
    }
}
