use std::time::Instant;

use super::action::{Action, Request, View};
use crate::config::MIN_MENU_DEPTH;
use crate::models::snapshot::ClusterId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuId {
    Main,
    ClusterSelect(View),
    ClusterDetail { cluster: ClusterId, view: View },
    AwaitingNamespace { cluster: ClusterId, view: View },
}

/// One user's place in the menus. The stack always has `Main` at the bottom
/// and never grows past its depth bound.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub active_cluster: Option<ClusterId>,
    menu_stack: Vec<MenuId>,
    max_depth: usize,
    pub last_interaction_at: Instant,
}

impl SessionState {
    pub fn new(max_depth: usize, now: Instant) -> Self {
        Self {
            active_cluster: None,
            menu_stack: vec![MenuId::Main],
            max_depth: max_depth.max(MIN_MENU_DEPTH),
            last_interaction_at: now,
        }
    }

    pub fn current(&self) -> &MenuId {
        self.menu_stack.last().unwrap_or(&MenuId::Main)
    }

    pub fn depth(&self) -> usize {
        self.menu_stack.len()
    }

    pub fn reset(&mut self) {
        self.menu_stack.truncate(1);
        self.active_cluster = None;
    }

    fn push(&mut self, menu: MenuId) {
        if self.menu_stack.len() >= self.max_depth {
            // drop the oldest entry above Main
            self.menu_stack.remove(1);
        }
        self.menu_stack.push(menu);
    }

    fn pop(&mut self) {
        if self.menu_stack.len() > 1 {
            self.menu_stack.pop();
        }
    }
}

/// What the caller should do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Execute(Request),
    Menu,
    PromptCluster(View),
    PromptNamespace { cluster: ClusterId, view: View },
    Detail { cluster: ClusterId, view: View },
    Help,
    Pong,
    Hint(String),
}

const USAGE: &str = "Send /menu to browse, or /help for the list of commands.";

/// Applies one action to a session. Pure apart from mutating `state`; an
/// action that does not fit the current menu leaves the state as it was.
pub fn step(state: &mut SessionState, action: Action, clusters: &[ClusterId], now: Instant) -> Outcome {
    state.last_interaction_at = now;

    match action {
        Action::ShowMenu => {
            state.reset();
            Outcome::Menu
        }
        Action::Help => Outcome::Help,
        Action::Ping => Outcome::Pong,
        Action::Back => back(state),
        Action::Run(req) => {
            if let Some(c) = &req.cluster {
                if !clusters.contains(c) {
                    return unknown_cluster(c, clusters);
                }
            }
            state.reset();
            state.active_cluster = req.cluster.clone();
            Outcome::Execute(req)
        }
        Action::Open { view, cluster } => {
            let cluster = match cluster {
                Some(c) if !clusters.contains(&c) => return unknown_cluster(&c, clusters),
                Some(c) => Some(c),
                None => match clusters {
                    [only] => Some(only.clone()),
                    _ => None,
                },
            };
            state.reset();
            match cluster {
                Some(c) => enter_cluster(state, c, view),
                None => {
                    state.push(MenuId::ClusterSelect(view));
                    Outcome::PromptCluster(view)
                }
            }
        }
        Action::SelectCluster(c) => match state.current().clone() {
            MenuId::ClusterSelect(view) => {
                if !clusters.contains(&c) {
                    return unknown_cluster(&c, clusters);
                }
                enter_cluster(state, c, view)
            }
            _ => Outcome::Hint(format!("Pick a view from the menu before choosing a cluster. {}", USAGE)),
        },
        Action::PickNamespace => match state.current().clone() {
            MenuId::ClusterDetail { cluster, view } => {
                let view = if view.needs_namespace() { view } else { View::Pods };
                state.push(MenuId::AwaitingNamespace {
                    cluster: cluster.clone(),
                    view,
                });
                Outcome::PromptNamespace { cluster, view }
            }
            _ => Outcome::Hint(format!("Choose a cluster first. {}", USAGE)),
        },
        Action::SelectNamespace(ns) => choose_namespace(state, ns, true),
        Action::FreeText(text) => choose_namespace(state, text, false),
    }
}

fn enter_cluster(state: &mut SessionState, cluster: ClusterId, view: View) -> Outcome {
    state.active_cluster = Some(cluster.clone());
    state.push(MenuId::ClusterDetail {
        cluster: cluster.clone(),
        view,
    });
    if view.needs_namespace() {
        state.push(MenuId::AwaitingNamespace {
            cluster: cluster.clone(),
            view,
        });
        Outcome::PromptNamespace { cluster, view }
    } else {
        Outcome::Execute(Request {
            view,
            cluster: Some(cluster),
            namespace: None,
        })
    }
}

fn choose_namespace(state: &mut SessionState, ns: String, pressed: bool) -> Outcome {
    match state.current().clone() {
        MenuId::AwaitingNamespace { cluster, view } => {
            state.pop();
            Outcome::Execute(Request {
                view,
                cluster: Some(cluster),
                namespace: Some(ns),
            })
        }
        // a namespace button from the last prompt, pressed again
        MenuId::ClusterDetail { cluster, view } if pressed && view.needs_namespace() => {
            Outcome::Execute(Request {
                view,
                cluster: Some(cluster),
                namespace: Some(ns),
            })
        }
        _ => Outcome::Hint(format!("I did not understand {:?}. {}", ns, USAGE)),
    }
}

fn back(state: &mut SessionState) -> Outcome {
    if let MenuId::ClusterDetail { .. } = state.current() {
        state.reset();
        return Outcome::Menu;
    }
    state.pop();
    match state.current().clone() {
        MenuId::Main => {
            state.reset();
            Outcome::Menu
        }
        MenuId::ClusterSelect(view) => Outcome::PromptCluster(view),
        MenuId::ClusterDetail { cluster, view } => Outcome::Detail { cluster, view },
        MenuId::AwaitingNamespace { cluster, view } => Outcome::PromptNamespace { cluster, view },
    }
}

fn unknown_cluster(cluster: &str, clusters: &[ClusterId]) -> Outcome {
    Outcome::Hint(format!(
        "Unknown cluster {:?}. Available: {}",
        cluster,
        clusters.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::action::Router;
    use proptest::prelude::*;

    fn clusters() -> Vec<ClusterId> {
        vec!["c1".into(), "c2".into()]
    }

    fn press(state: &mut SessionState, payload: &str, clusters: &[ClusterId]) -> Outcome {
        let action = Router::parse_button(payload).unwrap();
        step(state, action, clusters, Instant::now())
    }

    fn say(state: &mut SessionState, text: &str, clusters: &[ClusterId]) -> Outcome {
        let action = Router::parse_text(text).unwrap();
        step(state, action, clusters, Instant::now())
    }

    #[test]
    fn menu_drill_down_equals_direct_command() {
        let cs = clusters();
        let mut s = SessionState::new(8, Instant::now());
        assert_eq!(say(&mut s, "menu", &cs), Outcome::Menu);
        assert_eq!(press(&mut s, "open:pods", &cs), Outcome::PromptCluster(View::Pods));
        assert_eq!(
            press(&mut s, "cluster:c1", &cs),
            Outcome::PromptNamespace {
                cluster: "c1".into(),
                view: View::Pods
            }
        );
        let drilled = say(&mut s, "ns1", &cs);

        let mut fresh = SessionState::new(8, Instant::now());
        let direct = say(&mut fresh, "pods c1 ns1", &cs);
        assert_eq!(drilled, direct);
        assert_eq!(drilled, Outcome::Execute(Request::new(View::Pods, Some("c1"), Some("ns1"))));
        assert_eq!(
            s.current(),
            &MenuId::ClusterDetail {
                cluster: "c1".into(),
                view: View::Pods
            }
        );
    }

    #[test]
    fn sole_cluster_skips_selection() {
        let cs = vec!["only".to_string()];
        let mut s = SessionState::new(8, Instant::now());
        assert_eq!(
            press(&mut s, "open:nodes", &cs),
            Outcome::Execute(Request::new(View::Nodes, Some("only"), None))
        );
        assert_eq!(s.active_cluster.as_deref(), Some("only"));
    }

    #[test]
    fn cluster_selection_executes_and_enters_detail() {
        let cs = clusters();
        let mut s = SessionState::new(8, Instant::now());
        press(&mut s, "open:operators", &cs);
        assert_eq!(
            press(&mut s, "cluster:c2", &cs),
            Outcome::Execute(Request::new(View::Operators, Some("c2"), None))
        );
        assert_eq!(
            s.current(),
            &MenuId::ClusterDetail {
                cluster: "c2".into(),
                view: View::Operators
            }
        );
        assert_eq!(press(&mut s, "back", &cs), Outcome::Menu);
        assert_eq!(s.current(), &MenuId::Main);
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn direct_command_resets_mid_flow() {
        let cs = clusters();
        let mut s = SessionState::new(8, Instant::now());
        press(&mut s, "open:pods", &cs);
        press(&mut s, "cluster:c1", &cs);
        assert_eq!(
            say(&mut s, "nodes c2", &cs),
            Outcome::Execute(Request::new(View::Nodes, Some("c2"), None))
        );
        assert_eq!(s.current(), &MenuId::Main);
    }

    #[test]
    fn unknown_input_keeps_state() {
        let cs = clusters();
        let mut s = SessionState::new(8, Instant::now());
        press(&mut s, "open:metrics", &cs);
        let before = s.current().clone();
        assert!(matches!(say(&mut s, "hello there", &cs), Outcome::Hint(_)));
        assert!(matches!(press(&mut s, "cluster:c9", &cs), Outcome::Hint(_)));
        assert!(matches!(press(&mut s, "pickns", &cs), Outcome::Hint(_)));
        assert_eq!(s.current(), &before);
    }

    #[test]
    fn back_from_namespace_prompt_shows_detail() {
        let cs = clusters();
        let mut s = SessionState::new(8, Instant::now());
        press(&mut s, "open:pods", &cs);
        press(&mut s, "cluster:c1", &cs);
        assert_eq!(
            press(&mut s, "back", &cs),
            Outcome::Detail {
                cluster: "c1".into(),
                view: View::Pods
            }
        );
        assert_eq!(
            press(&mut s, "pickns", &cs),
            Outcome::PromptNamespace {
                cluster: "c1".into(),
                view: View::Pods
            }
        );
    }

    #[test]
    fn back_from_cluster_select_returns_to_menu() {
        let cs = clusters();
        let mut s = SessionState::new(8, Instant::now());
        press(&mut s, "open:nodes", &cs);
        assert_eq!(press(&mut s, "back", &cs), Outcome::Menu);
        assert_eq!(press(&mut s, "back", &cs), Outcome::Menu);
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn unknown_cluster_in_command_is_a_hint() {
        let mut s = SessionState::new(8, Instant::now());
        let out = say(&mut s, "nodes c9", &clusters());
        assert_eq!(
            out,
            Outcome::Hint("Unknown cluster \"c9\". Available: c1, c2".into())
        );
    }

    fn any_action() -> impl Strategy<Value = Action> {
        let views = proptest::sample::select(View::MENU.to_vec());
        let cluster = proptest::sample::select(vec!["c1".to_string(), "c2".to_string(), "zz".to_string()]);
        prop_oneof![
            Just(Action::ShowMenu),
            Just(Action::Back),
            Just(Action::Help),
            Just(Action::PickNamespace),
            views.clone().prop_map(|view| Action::Open { view, cluster: None }),
            cluster.clone().prop_map(Action::SelectCluster),
            "[a-z]{1,6}".prop_map(Action::SelectNamespace),
            "[a-z]{1,6}".prop_map(Action::FreeText),
            (views, cluster).prop_map(|(view, c)| Action::Run(Request {
                view,
                cluster: Some(c),
                namespace: None
            })),
        ]
    }

    #[test]
    fn shallowest_stack_still_returns_to_detail_after_namespace() {
        let cs = clusters();
        let mut s = SessionState::new(1, Instant::now());
        press(&mut s, "open:pods", &cs);
        press(&mut s, "cluster:c1", &cs);
        assert_eq!(s.depth(), MIN_MENU_DEPTH);
        say(&mut s, "ns1", &cs);
        assert_eq!(
            s.current(),
            &MenuId::ClusterDetail {
                cluster: "c1".into(),
                view: View::Pods
            }
        );
    }

    proptest! {
        #[test]
        fn back_from_any_detail_returns_to_main(
            depth in MIN_MENU_DEPTH..6usize,
            history in proptest::collection::vec(any_action(), 0..20),
        ) {
            let cs = clusters();
            let mut s = SessionState::new(depth, Instant::now());
            for action in history {
                step(&mut s, action, &cs, Instant::now());
                prop_assert!(s.depth() >= 1 && s.depth() <= depth);
                if let MenuId::ClusterDetail { .. } = s.current() {
                    let mut branch = s.clone();
                    prop_assert_eq!(step(&mut branch, Action::Back, &cs, Instant::now()), Outcome::Menu);
                    prop_assert_eq!(branch.current(), &MenuId::Main);
                }
                if let MenuId::AwaitingNamespace { cluster, .. } = s.current().clone() {
                    let mut branch = s.clone();
                    step(&mut branch, Action::FreeText("ns1".into()), &cs, Instant::now());
                    prop_assert!(
                        matches!(branch.current(), MenuId::ClusterDetail { cluster: c, .. } if *c == cluster),
                        "landed on {:?}",
                        branch.current()
                    );
                }
            }
        }
    }
}
