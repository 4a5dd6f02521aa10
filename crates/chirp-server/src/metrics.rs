//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

pub use chirp_core::metrics::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Recorder without global install to avoid cross-test conflicts.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('\n') || output.contains('#'));
    }
}
