use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// One traversable hop between two named screens: clicking `via_area` on
/// the current screen lands on `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenHop {
    pub to: String,
    pub via_area: String,
}

/// Adjacency table of the game's named screens.
///
/// Routes are pure data; the engine's navigate helper walks them one hop
/// per round so recognition can re-anchor after every click.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenMap {
    adjacency: BTreeMap<String, Vec<ScreenHop>>,
}

impl ScreenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `via_area` on screen `from` leads to screen `to`.
    pub fn connect(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        via_area: impl Into<String>,
    ) -> &mut Self {
        self.adjacency.entry(from.into()).or_default().push(ScreenHop {
            to: to.into(),
            via_area: via_area.into(),
        });
        self
    }

    pub fn hops_from(&self, screen: &str) -> &[ScreenHop] {
        self.adjacency
            .get(screen)
            .map(|hops| hops.as_slice())
            .unwrap_or(&[])
    }

    /// Shortest hop sequence from `from` to `to`, or `None` when `to` is
    /// unreachable. An empty route means the screens are identical.
    pub fn route(&self, from: &str, to: &str) -> Option<Vec<ScreenHop>> {
        if from == to {
            return Some(Vec::new());
        }

        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut arrived_via: BTreeMap<&str, (&str, &ScreenHop)> = BTreeMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(from);
        queue.push_back(from);

        while let Some(screen) = queue.pop_front() {
            for hop in self.hops_from(screen) {
                if !visited.insert(hop.to.as_str()) {
                    continue;
                }
                arrived_via.insert(hop.to.as_str(), (screen, hop));
                if hop.to == to {
                    let mut path = Vec::new();
                    let mut cursor = to;
                    while cursor != from {
                        let (previous, hop) = arrived_via[cursor];
                        path.push(hop.clone());
                        cursor = previous;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(hop.to.as_str());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> ScreenMap {
        let mut map = ScreenMap::new();
        map.connect("home", "menu", "menu-button")
            .connect("menu", "home", "back-button")
            .connect("menu", "shop", "shop-entry")
            .connect("menu", "battle", "battle-entry")
            .connect("shop", "menu", "back-button");
        map
    }

    #[test]
    fn route_same_screen_expected_empty() {
        let map = sample_map();
        assert_eq!(map.route("home", "home"), Some(Vec::new()));
    }

    #[test]
    fn route_two_hops_expected_shortest_path() {
        let map = sample_map();
        let route = map.route("home", "shop").expect("shop should be reachable");
        assert_eq!(route.len(), 2);
        assert_eq!(route[0].via_area, "menu-button");
        assert_eq!(route[1].via_area, "shop-entry");
    }

    #[test]
    fn route_unreachable_screen_expected_none() {
        let map = sample_map();
        assert_eq!(map.route("battle", "home"), None);
        assert_eq!(map.route("home", "unknown"), None);
    }

    #[test]
    fn route_cycle_expected_terminates() {
        let mut map = ScreenMap::new();
        map.connect("a", "b", "ab").connect("b", "a", "ba");
        assert_eq!(map.route("a", "missing"), None);
    }
}
