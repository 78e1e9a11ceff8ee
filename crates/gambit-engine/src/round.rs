use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Status labels the engine itself produces. Task statuses are free-form
/// strings; these constants cover the outcomes the engine and the helper
/// primitives report on their own.
pub mod status {
    pub const TIMED_OUT: &str = "execution timed out";
    pub const STOPPED: &str = "manually stopped";
    pub const EXCEPTION: &str = "exception";
    pub const NOT_FOUND: &str = "not found";
    pub const CLICK_FAILED: &str = "click failed";
    pub const AREA_NOT_CONFIGURED: &str = "area not configured";
    pub const UNKNOWN_SCREEN: &str = "unknown screen";
    pub const NO_ROUTE: &str = "no route";
}

/// Outcome of one execution round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Success,
    Fail,
    /// Transient miss; the engine re-runs the node and counts the attempt
    /// against the node's retry budget.
    Retry,
    /// Not ready yet; the engine re-runs the node without consuming a
    /// retry.
    Wait,
}

impl RoundOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
            Self::Retry => "retry",
            Self::Wait => "wait",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }
}

/// Post-round pacing attached to a [`RoundResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitDirective {
    /// Pause for the full duration after the round.
    Fixed(Duration),
    /// Ensure the round as a whole took at least the duration.
    RoundFloor(Duration),
}

impl WaitDirective {
    pub(crate) async fn apply(self, round_started_at: Instant) {
        let pause = match self {
            Self::Fixed(duration) => duration,
            Self::RoundFloor(floor) => floor
                .checked_sub(round_started_at.elapsed())
                .unwrap_or(Duration::ZERO),
        };
        if pause > Duration::ZERO {
            tokio::time::sleep(pause).await;
        }
    }
}

/// The value every node handler produces for one round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub outcome: RoundOutcome,
    pub status: Option<String>,
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitDirective>,
}

impl RoundResult {
    fn new(outcome: RoundOutcome) -> Self {
        Self {
            outcome,
            status: None,
            data: None,
            wait: None,
        }
    }

    pub fn success() -> Self {
        Self::new(RoundOutcome::Success)
    }

    pub fn fail() -> Self {
        Self::new(RoundOutcome::Fail)
    }

    pub fn retry() -> Self {
        Self::new(RoundOutcome::Retry)
    }

    pub fn wait_more() -> Self {
        Self::new(RoundOutcome::Wait)
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Pause for `duration` after this round. Takes priority over a round
    /// floor; the two directives are mutually exclusive.
    pub fn with_fixed_wait(mut self, duration: Duration) -> Self {
        self.wait = Some(WaitDirective::Fixed(duration));
        self
    }

    /// Ensure the producing round took at least `duration` in total.
    pub fn with_round_floor(mut self, duration: Duration) -> Self {
        if !matches!(self.wait, Some(WaitDirective::Fixed(_))) {
            self.wait = Some(WaitDirective::RoundFloor(duration));
        }
        self
    }

    /// Retry budget exhausted: same status and data, outcome forced to
    /// failure.
    pub(crate) fn into_failure(mut self) -> Self {
        self.outcome = RoundOutcome::Fail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn factories_expected_outcome_and_empty_fields() {
        assert_eq!(RoundResult::success().outcome, RoundOutcome::Success);
        assert_eq!(RoundResult::fail().outcome, RoundOutcome::Fail);
        assert_eq!(RoundResult::retry().outcome, RoundOutcome::Retry);
        assert_eq!(RoundResult::wait_more().outcome, RoundOutcome::Wait);

        let result = RoundResult::success();
        assert_eq!(result.status, None);
        assert_eq!(result.data, None);
        assert_eq!(result.wait, None);
    }

    #[test]
    fn builders_expected_fields_set() {
        let result = RoundResult::success()
            .with_status("ready")
            .with_data(json!({"count": 3}));
        assert_eq!(result.status.as_deref(), Some("ready"));
        assert_eq!(result.data, Some(json!({"count": 3})));
    }

    #[test]
    fn fixed_wait_expected_priority_over_round_floor() {
        let result = RoundResult::success()
            .with_fixed_wait(Duration::from_secs(2))
            .with_round_floor(Duration::from_secs(9));
        assert_eq!(result.wait, Some(WaitDirective::Fixed(Duration::from_secs(2))));
    }

    #[test]
    fn into_failure_expected_status_and_data_kept() {
        let result = RoundResult::retry()
            .with_status("not found")
            .with_data(json!(1))
            .into_failure();
        assert_eq!(result.outcome, RoundOutcome::Fail);
        assert_eq!(result.status.as_deref(), Some("not found"));
        assert_eq!(result.data, Some(json!(1)));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn round_floor_expected_tops_up_to_floor() {
        let started = Instant::now();
        tokio::time::sleep(Duration::from_secs(2)).await;

        WaitDirective::RoundFloor(Duration::from_secs(5))
            .apply(started)
            .await;
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn round_floor_already_elapsed_expected_no_sleep() {
        let started = Instant::now();
        tokio::time::sleep(Duration::from_secs(6)).await;

        WaitDirective::RoundFloor(Duration::from_secs(5))
            .apply(started)
            .await;
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn fixed_wait_expected_full_duration() {
        let started = Instant::now();
        WaitDirective::Fixed(Duration::from_secs(3)).apply(started).await;
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
