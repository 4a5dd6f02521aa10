//! Metric name constants, shared so emitting and exporting crates agree.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Frames dropped on full client channels (counter).
pub const WS_SLOW_CLIENT_DROPS_TOTAL: &str = "ws_slow_client_drops_total";
/// Upstream sessions opened (counter).
pub const UPSTREAM_SESSIONS_OPENED_TOTAL: &str = "upstream_sessions_opened_total";
/// Upstream sessions closed (counter).
pub const UPSTREAM_SESSIONS_CLOSED_TOTAL: &str = "upstream_sessions_closed_total";
/// Fallback pipeline invocations (counter, labels: kind).
pub const FALLBACK_INVOCATIONS_TOTAL: &str = "fallback_invocations_total";
/// Webhook callbacks with no pending entry (counter).
pub const STALE_CALLBACKS_TOTAL: &str = "stale_callbacks_total";
/// Pending callbacks that hit their TTL (counter).
pub const CALLBACK_TIMEOUTS_TOTAL: &str = "callback_timeouts_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_SLOW_CLIENT_DROPS_TOTAL,
            UPSTREAM_SESSIONS_OPENED_TOTAL,
            UPSTREAM_SESSIONS_CLOSED_TOTAL,
            FALLBACK_INVOCATIONS_TOTAL,
            STALE_CALLBACKS_TOTAL,
            CALLBACK_TIMEOUTS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
