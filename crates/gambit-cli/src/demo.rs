//! The built-in demo operation and the scripted world it runs against.
//!
//! The demo walks the standard daily loop: navigate home, open the
//! mailbox, claim the rewards. With no fixture file the default script
//! plays a world where every step succeeds; a JSON fixture swaps in other
//! scenes to rehearse failure handling without a game window.

use async_trait::async_trait;
use gambit_engine::engine::Round;
use gambit_engine::{
    ClickArea, EngineError, GraphBuilder, GraphEdge, GraphNode, NavigateToScreen, NodeHandler,
    OcrClickByPriority, OperationServices, OperationTask, RoundResult, WaitPolicy,
};
use gambit_vision::testing::{Scene, ScriptedWorld};
use gambit_vision::{AreaSpec, Region, ScreenMap};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// On-disk description of a scripted world.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorldFixture {
    #[serde(default)]
    pub areas: Vec<AreaSpec>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub advance_on_click: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteEntry {
    pub from: String,
    pub to: String,
    pub via_area: String,
}

impl WorldFixture {
    pub fn load(path: &Path) -> Result<Self, String> {
        let bytes = std::fs::read(path)
            .map_err(|error| format!("failed reading fixture '{}': {error}", path.display()))?;
        serde_json::from_slice(&bytes)
            .map_err(|error| format!("failed parsing fixture '{}': {error}", path.display()))
    }

    pub fn services(&self) -> OperationServices {
        let world = ScriptedWorld::new();
        for area in &self.areas {
            world.define_area(area.clone());
        }
        for scene in &self.scenes {
            world.push_scene(scene.clone());
        }
        world.advance_on_click(self.advance_on_click);

        let mut screens = ScreenMap::new();
        for route in &self.routes {
            screens.connect(&route.from, &route.to, &route.via_area);
        }

        OperationServices::new(
            Arc::new(world.clone()),
            Arc::new(world.clone()),
            Arc::new(world),
        )
        .with_screens(screens)
    }
}

/// World where the whole daily loop succeeds on the first try.
pub fn default_fixture() -> WorldFixture {
    WorldFixture {
        areas: vec![
            AreaSpec::new("mailbox-button", Region::new(40, 40, 48, 48)).on_screen("home"),
            AreaSpec::new("claim-all-button", Region::new(520, 430, 120, 36)).on_screen("mailbox"),
        ],
        scenes: vec![
            Scene::on_screen("home").with_area("mailbox-button"),
            Scene::on_screen("mailbox")
                .with_area("claim-all-button")
                .with_text("Claimed", Region::new(520, 360, 120, 24))
                .with_text("Claim All", Region::new(520, 430, 120, 36)),
            Scene::on_screen("mailbox").with_text("Claimed", Region::new(520, 430, 120, 24)),
        ],
        routes: vec![RouteEntry {
            from: "mailbox".to_string(),
            to: "home".to_string(),
            via_area: "close-button".to_string(),
        }],
        advance_on_click: true,
    }
}

struct NavigateStep {
    params: NavigateToScreen,
}

#[async_trait]
impl NodeHandler for NavigateStep {
    async fn run(&self, round: &mut Round<'_>) -> Result<RoundResult, EngineError> {
        round.navigate_to_screen(&self.params).await
    }
}

struct OpenMailboxStep {
    params: ClickArea,
}

#[async_trait]
impl NodeHandler for OpenMailboxStep {
    async fn run(&self, round: &mut Round<'_>) -> Result<RoundResult, EngineError> {
        round.click_area_until(&self.params).await
    }
}

struct ClaimStep {
    params: OcrClickByPriority,
}

#[async_trait]
impl NodeHandler for ClaimStep {
    async fn run(&self, round: &mut Round<'_>) -> Result<RoundResult, EngineError> {
        round.ocr_click_by_priority(&self.params).await
    }
}

/// The built-in demo task: home screen, mailbox, claim everything.
pub struct DailyErrandsTask;

impl OperationTask for DailyErrandsTask {
    fn display_name(&self) -> &str {
        "daily errands"
    }

    fn build_graph(&self, graph: &mut GraphBuilder) {
        let pacing = WaitPolicy::default().retry_wait(Duration::from_millis(200));

        graph
            .add_node(GraphNode::handler(
                "go-home",
                Arc::new(NavigateStep {
                    params: NavigateToScreen::new("home").with_wait(pacing),
                }),
            ))
            .add_node(
                GraphNode::handler(
                    "open-mailbox",
                    Arc::new(OpenMailboxStep {
                        params: ClickArea::new("mailbox-button")
                            .until_found("claim-all-button")
                            .with_wait(pacing),
                    }),
                )
                .with_max_retries(5)
                .capture_before_run(),
            )
            .add_node(
                GraphNode::handler(
                    "claim-rewards",
                    Arc::new(ClaimStep {
                        params: OcrClickByPriority::new(["Claim All", "Claim"])
                            .ignoring("Claimed")
                            .with_wait(pacing),
                    }),
                )
                .with_max_retries(5)
                .capture_before_run(),
            )
            // The helpers report which screen/area they acted on as the
            // status, so the happy-path edges are declared as fallbacks.
            .add_edge(GraphEdge::on_success("go-home", "open-mailbox").fallback())
            .add_edge(GraphEdge::on_success("open-mailbox", "claim-rewards").fallback());
    }
}
