// Text rendering of the live data view

use crate::live_data::LiveData;
use crate::session::SessionState;
use chrono::{Local, TimeZone};

/// Placeholder shown before the first value arrives
pub const NO_VALUE: &str = "—";

/// Render the view using the local time zone
pub fn render(state: &SessionState, latest: Option<&LiveData>) -> String {
    render_in(state, latest, &Local)
}

/// Render the view with timestamps shown in `tz`
pub fn render_in<Tz: TimeZone>(
    state: &SessionState,
    latest: Option<&LiveData>,
    tz: &Tz,
) -> String {
    let mut lines = Vec::new();

    if let Some(error) = &state.error {
        lines.push(format!("Error: {}", error));
    }

    if !state.connected && state.error.is_none() {
        lines.push("Connecting…".to_string());
    }

    if state.connected {
        lines.push(live_value_line(latest, tz));
    }

    lines.join("\n")
}

fn live_value_line<Tz: TimeZone>(latest: Option<&LiveData>, tz: &Tz) -> String {
    let Some(data) = latest else {
        return format!("Live value: {}", NO_VALUE);
    };

    let mut line = format!("Live value: {:.2}", data.value);
    if let Some(observed_at) = data.observed_at() {
        let local = observed_at.with_timezone(tz);
        line.push_str(&format!(" ({})", local.naive_local().format("%H:%M:%S")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn test_initial_state_shows_connecting() {
        let out = render_in(&SessionState::default(), None, &Utc);
        assert_eq!(out, "Connecting…");
    }

    #[test]
    fn test_connected_without_value_shows_placeholder() {
        let state = SessionState {
            connected: true,
            error: None,
        };
        assert_eq!(render_in(&state, None, &Utc), "Live value: —");
    }

    #[test]
    fn test_connected_with_value_and_time() {
        let state = SessionState {
            connected: true,
            error: None,
        };
        // 2023-11-14T22:13:20Z
        let data = LiveData::new(95.5, at(1_700_000_000_000));
        assert_eq!(
            render_in(&state, Some(&data), &Utc),
            "Live value: 95.50 (22:13:20)"
        );
    }

    #[test]
    fn test_value_without_timestamp() {
        let state = SessionState {
            connected: true,
            error: None,
        };
        let data = LiveData {
            value: 91.234,
            timestamp: None,
        };
        assert_eq!(render_in(&state, Some(&data), &Utc), "Live value: 91.23");
    }

    #[test]
    fn test_error_replaces_connecting() {
        let state = SessionState {
            connected: false,
            error: Some("auth failed".to_string()),
        };
        assert_eq!(render_in(&state, None, &Utc), "Error: auth failed");
    }

    #[test]
    fn test_error_while_connected_keeps_value() {
        let state = SessionState {
            connected: true,
            error: Some("auth failed".to_string()),
        };
        let data = LiveData {
            value: 93.0,
            timestamp: None,
        };
        assert_eq!(
            render_in(&state, Some(&data), &Utc),
            "Error: auth failed\nLive value: 93.00"
        );
    }
}
