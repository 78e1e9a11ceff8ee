//! Reusable round-result-producing primitives for node handlers.
//!
//! Every concrete task composes these: click a configured area (optionally
//! until other areas appear or disappear), find text by OCR and click it,
//! and walk the screen route table one hop per round. All of them return
//! through the [`WaitPolicy`] so tasks can pace the game's animations
//! without hand-rolling sleeps.

use crate::engine::Round;
use crate::round::status;
use crate::{EngineError, RoundOutcome, RoundResult};
use gambit_vision::fuzzy;
use gambit_vision::{AreaSpec, Region, TextLine};
use std::time::Duration;
use tracing::debug;

/// Default LCS similarity a recognized string must clear to count as a
/// match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.6;

/// Post-round pacing forwarded into the produced [`RoundResult`].
///
/// Fixed waits take priority over round floors; success and non-success
/// outcomes are paced independently.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitPolicy {
    pub success_wait: Option<Duration>,
    pub retry_wait: Option<Duration>,
    pub success_round_floor: Option<Duration>,
    pub retry_round_floor: Option<Duration>,
}

impl WaitPolicy {
    pub fn success_wait(mut self, duration: Duration) -> Self {
        self.success_wait = Some(duration);
        self
    }

    pub fn retry_wait(mut self, duration: Duration) -> Self {
        self.retry_wait = Some(duration);
        self
    }

    pub fn success_round_floor(mut self, duration: Duration) -> Self {
        self.success_round_floor = Some(duration);
        self
    }

    pub fn retry_round_floor(mut self, duration: Duration) -> Self {
        self.retry_round_floor = Some(duration);
        self
    }

    fn attach(&self, result: RoundResult) -> RoundResult {
        let (fixed, floor) = if result.outcome == RoundOutcome::Success {
            (self.success_wait, self.success_round_floor)
        } else {
            (self.retry_wait, self.retry_round_floor)
        };
        match (fixed, floor) {
            (Some(duration), _) => result.with_fixed_wait(duration),
            (None, Some(duration)) => result.with_round_floor(duration),
            (None, None) => result,
        }
    }
}

/// Parameters of [`Round::click_area_until`].
#[derive(Clone, Debug, Default)]
pub struct ClickArea {
    pub area: String,
    /// Areas that must all become visible before the click counts as done.
    pub until_found: Vec<String>,
    /// Areas that must all disappear before the click counts as done.
    pub until_gone: Vec<String>,
    pub wait: WaitPolicy,
}

impl ClickArea {
    pub fn new(area: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            ..Self::default()
        }
    }

    pub fn until_found(mut self, area: impl Into<String>) -> Self {
        self.until_found.push(area.into());
        self
    }

    pub fn until_gone(mut self, area: impl Into<String>) -> Self {
        self.until_gone.push(area.into());
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Parameters of [`Round::ocr_click`].
#[derive(Clone, Debug)]
pub struct OcrClick {
    pub target: String,
    /// Crop recognition to this sub-region of the frame.
    pub region: Option<Region>,
    pub threshold: f64,
    pub offset: Option<(i32, i32)>,
    pub wait: WaitPolicy,
}

impl OcrClick {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            region: None,
            threshold: DEFAULT_FUZZY_THRESHOLD,
            offset: None,
            wait: WaitPolicy::default(),
        }
    }

    pub fn in_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_offset(mut self, dx: i32, dy: i32) -> Self {
        self.offset = Some((dx, dy));
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Parameters of [`Round::ocr_click_by_priority`].
#[derive(Clone, Debug)]
pub struct OcrClickByPriority {
    /// Acceptable labels, highest priority first.
    pub targets: Vec<String>,
    /// Labels that exist only to disambiguate and must never be clicked
    /// (e.g. "claimed" next to "claim").
    pub ignore: Vec<String>,
    pub region: Option<Region>,
    pub threshold: f64,
    pub offset: Option<(i32, i32)>,
    pub wait: WaitPolicy,
}

impl OcrClickByPriority {
    pub fn new(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ignore: Vec::new(),
            region: None,
            threshold: DEFAULT_FUZZY_THRESHOLD,
            offset: None,
            wait: WaitPolicy::default(),
        }
    }

    pub fn ignoring(mut self, label: impl Into<String>) -> Self {
        self.ignore.push(label.into());
        self
    }

    pub fn in_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_offset(mut self, dx: i32, dy: i32) -> Self {
        self.offset = Some((dx, dy));
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Parameters of [`Round::navigate_to_screen`].
#[derive(Clone, Debug)]
pub struct NavigateToScreen {
    pub target: String,
    pub wait: WaitPolicy,
}

impl NavigateToScreen {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            wait: WaitPolicy::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

impl Round<'_> {
    /// Click a configured area, optionally until other areas appear or
    /// disappear.
    ///
    /// Once the area was clicked in an earlier round and until-conditions
    /// are configured, the conditions are checked before clicking again;
    /// when they hold the helper succeeds with the area name as status. A
    /// missing area configuration is fatal; an area that is not on screen
    /// yet, or a click the window did not accept, is a retry.
    pub async fn click_area_until(&mut self, params: &ClickArea) -> Result<RoundResult, EngineError> {
        let services = self.services;
        let Some(spec) = services.vision.area_config(&params.area) else {
            return Ok(RoundResult::fail().with_status(status::AREA_NOT_CONFIGURED));
        };
        let mut until_found = Vec::new();
        for name in &params.until_found {
            match services.vision.area_config(name) {
                Some(spec) => until_found.push(spec),
                None => return Ok(RoundResult::fail().with_status(status::AREA_NOT_CONFIGURED)),
            }
        }
        let mut until_gone = Vec::new();
        for name in &params.until_gone {
            match services.vision.area_config(name) {
                Some(spec) => until_gone.push(spec),
                None => return Ok(RoundResult::fail().with_status(status::AREA_NOT_CONFIGURED)),
            }
        }
        let has_conditions = !until_found.is_empty() || !until_gone.is_empty();

        if self.clicked_before() && has_conditions {
            self.refresh_frame().await?;
            if self.until_conditions_met(&until_found, &until_gone).await? {
                return Ok(params
                    .wait
                    .attach(RoundResult::success().with_status(params.area.clone())));
            }
        }

        self.ensure_frame().await?;
        let Some(frame) = self.frame.as_ref() else {
            return Err(EngineError::Runtime("working frame unavailable".to_string()));
        };
        let Some(point) = services.vision.locate_area(frame, &spec).await? else {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::NOT_FOUND)));
        };
        if !services.input.click(point).await? {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::CLICK_FAILED)));
        }
        self.mark_clicked();
        debug!(area = %params.area, x = point.x, y = point.y, "clicked area");

        if has_conditions {
            // Loop back through the engine so the conditions are checked
            // against a fresh frame next round.
            self.invalidate_frame();
            Ok(params
                .wait
                .attach(RoundResult::wait_more().with_status(params.area.clone())))
        } else {
            Ok(params
                .wait
                .attach(RoundResult::success().with_status(params.area.clone())))
        }
    }

    async fn until_conditions_met(
        &self,
        until_found: &[AreaSpec],
        until_gone: &[AreaSpec],
    ) -> Result<bool, EngineError> {
        let services = self.services;
        let Some(frame) = self.frame.as_ref() else {
            return Ok(false);
        };
        for spec in until_found {
            if services.vision.locate_area(frame, spec).await?.is_none() {
                return Ok(false);
            }
        }
        for spec in until_gone {
            if services.vision.locate_area(frame, spec).await?.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Recognize text, fuzzy-match `target`, and click the best match.
    pub async fn ocr_click(&mut self, params: &OcrClick) -> Result<RoundResult, EngineError> {
        let services = self.services;
        self.ensure_frame().await?;
        let Some(frame) = self.frame.as_ref() else {
            return Err(EngineError::Runtime("working frame unavailable".to_string()));
        };
        let lines = services.vision.read_text(frame, params.region).await?;

        let candidates: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
        let Some(matched) = fuzzy::best_match(&params.target, &candidates, params.threshold) else {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::NOT_FOUND)));
        };
        let line = &lines[matched.index];
        let text = line.text.clone();
        let mut point = line.region.center();
        if let Some((dx, dy)) = params.offset {
            point = point.offset(dx, dy);
        }

        if !services.input.click(point).await? {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::CLICK_FAILED)));
        }
        self.mark_clicked();
        debug!(target = %params.target, matched = %text, score = matched.score, "clicked text");
        Ok(params.wait.attach(RoundResult::success().with_status(text)))
    }

    /// Like [`ocr_click`], but with an ordered list of acceptable labels
    /// and an ignore list of labels that must not be clicked.
    ///
    /// A recognized string is skipped when it matches an ignore label more
    /// strongly than the target under consideration.
    ///
    /// [`ocr_click`]: Round::ocr_click
    pub async fn ocr_click_by_priority(
        &mut self,
        params: &OcrClickByPriority,
    ) -> Result<RoundResult, EngineError> {
        let services = self.services;
        self.ensure_frame().await?;
        let Some(frame) = self.frame.as_ref() else {
            return Err(EngineError::Runtime("working frame unavailable".to_string()));
        };
        let lines = services.vision.read_text(frame, params.region).await?;

        for target in &params.targets {
            let Some(line) = best_line_for_target(target, &lines, &params.ignore, params.threshold)
            else {
                continue;
            };
            let text = line.text.clone();
            let mut point = line.region.center();
            if let Some((dx, dy)) = params.offset {
                point = point.offset(dx, dy);
            }
            if !services.input.click(point).await? {
                return Ok(params
                    .wait
                    .attach(RoundResult::retry().with_status(status::CLICK_FAILED)));
            }
            self.mark_clicked();
            debug!(target = %target, matched = %text, "clicked prioritized text");
            return Ok(params.wait.attach(RoundResult::success().with_status(text)));
        }

        Ok(params
            .wait
            .attach(RoundResult::retry().with_status(status::NOT_FOUND)))
    }

    /// Walk one hop of the screen route table toward `target`.
    ///
    /// Succeeds immediately when the target screen is already showing;
    /// otherwise clicks the first hop and returns a wait so the engine
    /// re-evaluates from the new screen. An unknown current screen or a
    /// missing route is a retry.
    pub async fn navigate_to_screen(
        &mut self,
        params: &NavigateToScreen,
    ) -> Result<RoundResult, EngineError> {
        let services = self.services;
        self.ensure_frame().await?;
        let Some(frame) = self.frame.as_ref() else {
            return Err(EngineError::Runtime("working frame unavailable".to_string()));
        };

        let Some(current) = services.vision.identify_screen(frame).await? else {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::UNKNOWN_SCREEN)));
        };
        if current == params.target {
            return Ok(params
                .wait
                .attach(RoundResult::success().with_status(current)));
        }

        let Some(route) = services.screens.route(&current, &params.target) else {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::NO_ROUTE)));
        };
        let Some(hop) = route.first() else {
            return Ok(params
                .wait
                .attach(RoundResult::success().with_status(current)));
        };
        let Some(spec) = services.vision.area_config(&hop.via_area) else {
            return Ok(RoundResult::fail().with_status(status::AREA_NOT_CONFIGURED));
        };
        let Some(point) = services.vision.locate_area(frame, &spec).await? else {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::NOT_FOUND)));
        };
        if !services.input.click(point).await? {
            return Ok(params
                .wait
                .attach(RoundResult::retry().with_status(status::CLICK_FAILED)));
        }
        debug!(from = %current, toward = %params.target, via = %hop.via_area, "navigation hop");
        // The click changes screens; force a fresh capture next round.
        self.invalidate_frame();
        Ok(params
            .wait
            .attach(RoundResult::wait_more().with_status(current)))
    }
}

fn best_line_for_target<'a>(
    target: &str,
    lines: &'a [TextLine],
    ignore: &[String],
    threshold: f64,
) -> Option<&'a TextLine> {
    let mut best: Option<(&TextLine, f64)> = None;
    for line in lines {
        let target_score = fuzzy::similarity(target, &line.text);
        if target_score < threshold {
            continue;
        }
        let ignore_score = ignore
            .iter()
            .map(|label| fuzzy::similarity(label, &line.text))
            .fold(0.0, f64::max);
        if ignore_score >= threshold && ignore_score > target_score {
            continue;
        }
        if best.is_none_or(|(_, score)| target_score > score) {
            best = Some((line, target_score));
        }
    }
    best.map(|(line, _)| line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_vision::Region;

    fn line(text: &str) -> TextLine {
        TextLine::new(text, Region::new(0, 0, 10, 10))
    }

    #[test]
    fn best_line_for_target_ignore_label_expected_skipped() {
        let lines = vec![line("Claimed"), line("Claim")];
        let ignore = vec!["Claimed".to_string()];

        let best = best_line_for_target("Claim", &lines, &ignore, 0.5)
            .expect("the plain claim line should match");
        assert_eq!(best.text, "Claim");
    }

    #[test]
    fn best_line_for_target_only_ignored_line_expected_none() {
        let lines = vec![line("Claimed")];
        let ignore = vec!["Claimed".to_string()];

        assert!(best_line_for_target("Claim", &lines, &ignore, 0.5).is_none());
    }

    #[test]
    fn best_line_for_target_no_ignore_expected_best_score() {
        let lines = vec![line("Clam"), line("Claim")];

        let best =
            best_line_for_target("Claim", &lines, &[], 0.5).expect("a line should match");
        assert_eq!(best.text, "Claim");
    }

    #[test]
    fn wait_policy_attach_expected_outcome_specific_directive() {
        let policy = WaitPolicy::default()
            .success_wait(Duration::from_secs(1))
            .retry_round_floor(Duration::from_secs(2));

        let success = policy.attach(RoundResult::success());
        assert_eq!(
            success.wait,
            Some(crate::WaitDirective::Fixed(Duration::from_secs(1)))
        );

        let retry = policy.attach(RoundResult::retry());
        assert_eq!(
            retry.wait,
            Some(crate::WaitDirective::RoundFloor(Duration::from_secs(2)))
        );

        let bare = WaitPolicy::default().attach(RoundResult::success());
        assert_eq!(bare.wait, None);
    }
}
