use std::fmt;

use crate::error::UnknownAction;
use crate::models::snapshot::ClusterId;
use crate::transport::Input;

/// What a reply shows about a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Status,
    Report,
    Operators,
    Nodes,
    Namespaces,
    Namespace,
    Pods,
    Metrics,
}

impl View {
    pub const MENU: [View; 7] = [
        View::Status,
        View::Report,
        View::Operators,
        View::Nodes,
        View::Namespaces,
        View::Pods,
        View::Metrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            View::Status => "status",
            View::Report => "report",
            View::Operators => "operators",
            View::Nodes => "nodes",
            View::Namespaces => "namespaces",
            View::Namespace => "namespace",
            View::Pods => "pods",
            View::Metrics => "metrics",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            View::Status => "📊 Status",
            View::Report => "📋 Report",
            View::Operators => "⚙️ Operators",
            View::Nodes => "🖥️ Nodes",
            View::Namespaces => "📁 Namespaces",
            View::Namespace => "📁 Namespace",
            View::Pods => "🐳 Pods",
            View::Metrics => "📈 Metrics",
        }
    }

    /// Views that drill down into one namespace.
    pub fn needs_namespace(self) -> bool {
        matches!(self, View::Pods | View::Namespace)
    }

    fn parse(word: &str) -> Option<View> {
        let view = match word {
            "status" | "estado" | "cluster" => View::Status,
            "report" | "informe" | "reporte" => View::Report,
            "operators" | "operadores" => View::Operators,
            "nodes" | "nodos" => View::Nodes,
            "namespaces" => View::Namespaces,
            "namespace" => View::Namespace,
            "pods" | "pod" => View::Pods,
            "metrics" | "metricas" | "métricas" => View::Metrics,
            _ => return None,
        };
        Some(view)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully specified query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub view: View,
    pub cluster: Option<ClusterId>,
    pub namespace: Option<String>,
}

impl Request {
    pub fn new(view: View, cluster: Option<&str>, namespace: Option<&str>) -> Self {
        Self {
            view,
            cluster: cluster.map(str::to_string),
            namespace: namespace.map(str::to_string),
        }
    }
}

/// Every inbound input, typed or pressed, normalized to one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ShowMenu,
    Help,
    Ping,
    Back,
    /// Start a view from the menu; the cluster may still be missing.
    Open { view: View, cluster: Option<ClusterId> },
    /// Direct command with everything it needs.
    Run(Request),
    SelectCluster(ClusterId),
    PickNamespace,
    SelectNamespace(String),
    FreeText(String),
}

/// Callback payloads carried by buttons. `parse_button` accepts exactly
/// what these produce.
pub mod data {
    use super::View;

    pub const MENU: &str = "menu";
    pub const BACK: &str = "back";
    pub const HELP: &str = "help";
    pub const PICK_NAMESPACE: &str = "pickns";

    pub fn open(view: View) -> String {
        format!("open:{}", view)
    }

    pub fn open_for(view: View, cluster: &str) -> String {
        format!("open:{}:{}", view, cluster)
    }

    pub fn cluster(id: &str) -> String {
        format!("cluster:{}", id)
    }

    pub fn namespace(name: &str) -> String {
        format!("ns:{}", name)
    }
}

/// Maps typed commands and button payloads onto [`Action`].
pub struct Router;

impl Router {
    pub fn route(input: &Input) -> Result<Action, UnknownAction> {
        match input {
            Input::Text(text) => Self::parse_text(text),
            Input::Button(payload) => Self::parse_button(payload),
        }
    }

    pub fn parse_text(text: &str) -> Result<Action, UnknownAction> {
        let trimmed = text.trim();
        let is_command = trimmed.starts_with('/');
        let mut words = trimmed.trim_start_matches('/').split_whitespace();

        let Some(first) = words.next() else {
            return Err(UnknownAction(text.to_string()));
        };
        // "/pods@my_bot" in group chats
        let verb = first.split('@').next().unwrap_or(first).to_lowercase();
        let args: Vec<&str> = words.collect();

        let simple = match verb.as_str() {
            "menu" | "menú" | "opciones" => Some(Action::ShowMenu),
            "help" | "ayuda" | "start" => Some(Action::Help),
            "ping" => Some(Action::Ping),
            "back" | "volver" => Some(Action::Back),
            _ => None,
        };
        if let Some(action) = simple {
            return if args.is_empty() {
                Ok(action)
            } else {
                Err(UnknownAction(text.to_string()))
            };
        }

        let Some(view) = View::parse(&verb) else {
            return if is_command {
                Err(UnknownAction(text.to_string()))
            } else {
                Ok(Action::FreeText(trimmed.to_string()))
            };
        };

        match (view, args.as_slice()) {
            (View::Status, []) => Ok(Action::Run(Request::new(View::Status, None, None))),
            (v, []) => Ok(Action::Open { view: v, cluster: None }),
            (v, [cluster]) if v.needs_namespace() => Ok(Action::Open {
                view: v,
                cluster: Some(cluster.to_string()),
            }),
            (v, [cluster]) => Ok(Action::Run(Request::new(v, Some(*cluster), None))),
            (v, [cluster, ns]) if v.needs_namespace() => {
                Ok(Action::Run(Request::new(v, Some(*cluster), Some(*ns))))
            }
            _ => Err(UnknownAction(text.to_string())),
        }
    }

    pub fn parse_button(payload: &str) -> Result<Action, UnknownAction> {
        let unknown = || UnknownAction(payload.to_string());
        match payload {
            data::MENU => return Ok(Action::ShowMenu),
            data::BACK => return Ok(Action::Back),
            data::HELP => return Ok(Action::Help),
            "ping" => return Ok(Action::Ping),
            data::PICK_NAMESPACE => return Ok(Action::PickNamespace),
            _ => {}
        }

        let (tag, rest) = payload.split_once(':').ok_or_else(unknown)?;
        if rest.is_empty() {
            return Err(unknown());
        }
        match tag {
            "open" => {
                let (view, cluster) = match rest.split_once(':') {
                    Some((v, c)) if !c.is_empty() => (v, Some(c.to_string())),
                    Some(_) => return Err(unknown()),
                    None => (rest, None),
                };
                let view = View::parse(view).ok_or_else(unknown)?;
                Ok(Action::Open { view, cluster })
            }
            "cluster" => Ok(Action::SelectCluster(rest.to_string())),
            "ns" => Ok(Action::SelectNamespace(rest.to_string())),
            _ => Err(unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn run(view: View, cluster: Option<&str>, ns: Option<&str>) -> Action {
        Action::Run(Request::new(view, cluster, ns))
    }

    #[test_case("/menu", Action::ShowMenu; "menu command")]
    #[test_case("menú", Action::ShowMenu; "spanish menu")]
    #[test_case("/start", Action::Help; "start is help")]
    #[test_case("ayuda", Action::Help; "spanish help")]
    #[test_case("/ping@sentinel_bot", Action::Ping; "bot suffix")]
    #[test_case("status", run(View::Status, None, None); "status of all clusters")]
    #[test_case("/estado prod", run(View::Status, Some("prod"), None); "spanish status")]
    #[test_case("report prod", run(View::Report, Some("prod"), None); "report")]
    #[test_case("/informe prod", run(View::Report, Some("prod"), None); "informe")]
    #[test_case("nodos prod", run(View::Nodes, Some("prod"), None); "spanish nodes")]
    #[test_case("pods c1 ns1", run(View::Pods, Some("c1"), Some("ns1")); "full pods")]
    #[test_case("/namespace c1 kube-system", run(View::Namespace, Some("c1"), Some("kube-system")); "namespace detail")]
    #[test_case("PODS", Action::Open { view: View::Pods, cluster: None }; "case insensitive")]
    #[test_case("pods c1", Action::Open { view: View::Pods, cluster: Some("c1".into()) }; "pods needs namespace")]
    #[test_case("metricas", Action::Open { view: View::Metrics, cluster: None }; "metrics without cluster")]
    #[test_case("openshift-monitoring", Action::FreeText("openshift-monitoring".into()); "free text")]
    fn text_commands(input: &str, expected: Action) {
        assert_eq!(Router::parse_text(input), Ok(expected));
    }

    #[test_case("/reboot"; "unknown slash command")]
    #[test_case("   "; "blank")]
    #[test_case("nodes a b"; "too many arguments")]
    #[test_case("menu now"; "arguments to menu")]
    fn rejected_text(input: &str) {
        assert!(Router::parse_text(input).is_err());
    }

    #[test_case("menu", Action::ShowMenu; "menu")]
    #[test_case("back", Action::Back; "back")]
    #[test_case("pickns", Action::PickNamespace; "pick namespace")]
    #[test_case("open:pods", Action::Open { view: View::Pods, cluster: None }; "open view")]
    #[test_case("open:nodes:c2", Action::Open { view: View::Nodes, cluster: Some("c2".into()) }; "open view for cluster")]
    #[test_case("cluster:c1", Action::SelectCluster("c1".into()); "cluster")]
    #[test_case("ns:ns1", Action::SelectNamespace("ns1".into()); "namespace")]
    fn buttons(payload: &str, expected: Action) {
        assert_eq!(Router::parse_button(payload), Ok(expected));
    }

    #[test_case("open:bogus"; "unknown view")]
    #[test_case("cluster:"; "empty cluster")]
    #[test_case("open:pods:"; "empty cluster in open")]
    #[test_case("launch"; "unknown payload")]
    fn rejected_buttons(payload: &str) {
        assert!(Router::parse_button(payload).is_err());
    }

    #[test]
    fn button_payloads_round_trip_through_router() {
        for view in View::MENU {
            assert_eq!(
                Router::parse_button(&data::open(view)),
                Ok(Action::Open { view, cluster: None })
            );
        }
        assert_eq!(
            Router::parse_button(&data::open_for(View::Pods, "c1")),
            Ok(Action::Open { view: View::Pods, cluster: Some("c1".into()) })
        );
    }
}
