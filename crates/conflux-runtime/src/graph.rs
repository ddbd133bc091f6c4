//! The resolved graph: which extensions exist, where they run, and where
//! their messages go when the sender names no destination.

use std::collections::HashMap;

use conflux_core::error::Result;
use conflux_core::msg::{Loc, MsgType};
use conflux_core::value::Value;

use crate::config::ConfluxConfig;
use crate::path::ResultReturnPolicy;

#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub addon: String,
    pub group: String,
    pub loc: Loc,
    pub property: Value,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub dests: Vec<Loc>,
    pub policy: ResultReturnPolicy,
}

#[derive(Debug, Clone)]
pub struct Graph {
    app_uri: String,
    graph_id: String,
    nodes: Vec<NodeSpec>,
    groups: Vec<(String, String)>,
    routes: HashMap<(String, MsgType, String), Route>,
}

impl Graph {
    pub fn from_config(cfg: &ConfluxConfig) -> Result<Self> {
        let app_uri = cfg.app.uri.clone();
        let graph_id = cfg.app.graph_id.clone();
        let loc = |node: &str, group: &str| {
            Loc::new(Some(&app_uri), Some(&graph_id), Some(group), Some(node))
        };

        let mut nodes = Vec::with_capacity(cfg.graph.nodes.len());
        for n in &cfg.graph.nodes {
            let property = match &n.property {
                Some(json) => Value::from_json(json),
                None => Value::Object(Vec::new()),
            };
            nodes.push(NodeSpec {
                name: n.name.clone(),
                addon: n.addon.clone(),
                group: n.extension_group.clone(),
                loc: loc(&n.name, &n.extension_group),
                property,
            });
        }

        let groups = cfg
            .graph
            .group_names()
            .into_iter()
            .map(|g| (g.to_owned(), cfg.graph.group_addon(g).to_owned()))
            .collect();

        let mut routes = HashMap::new();
        for conn in &cfg.graph.connections {
            let kinds = [
                (MsgType::Cmd, &conn.cmd),
                (MsgType::Data, &conn.data),
                (MsgType::AudioFrame, &conn.audio_frame),
                (MsgType::VideoFrame, &conn.video_frame),
            ];
            for (ty, list) in kinds {
                for r in list {
                    let dests = r
                        .dest
                        .iter()
                        .filter_map(|d| nodes.iter().find(|n: &&NodeSpec| n.name == d.extension))
                        .map(|n| n.loc.clone())
                        .collect();
                    routes.insert(
                        (conn.extension.clone(), ty, r.name.clone()),
                        Route {
                            dests,
                            policy: r.result_return_policy,
                        },
                    );
                }
            }
        }

        Ok(Self {
            app_uri,
            graph_id,
            nodes,
            groups,
            routes,
        })
    }

    pub fn app_uri(&self) -> &str {
        &self.app_uri
    }

    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    /// Location of something outside the graph but inside this app, such as
    /// a client connection.
    pub fn app_loc(&self) -> Loc {
        Loc::new(Some(&self.app_uri), Some(&self.graph_id), None, None)
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn nodes_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a NodeSpec> + 'a {
        self.nodes.iter().filter(move |n| n.group == group)
    }

    /// (group name, group addon) in declaration order.
    pub fn groups(&self) -> &[(String, String)] {
        &self.groups
    }

    pub fn route(&self, src: &str, ty: MsgType, name: &str) -> Option<&Route> {
        self.routes.get(&(src.to_owned(), ty, name.to_owned()))
    }

    /// Fill in the parts of `loc` the sender left out.
    pub fn complete_loc(&self, loc: &Loc) -> Loc {
        let mut out = loc.clone();
        out.app_uri.get_or_insert_with(|| self.app_uri.clone());
        out.graph_id.get_or_insert_with(|| self.graph_id.clone());
        if out.extension_group.is_none() {
            if let Some(node) = out.extension.as_deref().and_then(|e| self.node(e)) {
                out.extension_group = Some(node.group.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    #[test]
    fn routes_resolve_to_full_locations() {
        let cfg = config::load_from_str(
            r#"
version: 1
app: { uri: "app://x" }
graph:
  nodes:
    - { name: "a", addon: "echo", extension_group: "g1" }
    - { name: "b", addon: "echo", extension_group: "g2", property: { k: 1 } }
  connections:
    - extension: "a"
      cmd: [ { name: "hello", dest: [ { extension: "b" } ], result_return_policy: "first_error_or_last_ok" } ]
"#,
        )
        .unwrap();
        let graph = Graph::from_config(&cfg).unwrap();

        let route = graph.route("a", MsgType::Cmd, "hello").unwrap();
        assert_eq!(route.policy, ResultReturnPolicy::FirstErrorOrLastOk);
        assert_eq!(
            route.dests,
            vec![Loc::new(Some("app://x"), Some("default"), Some("g2"), Some("b"))]
        );
        assert!(graph.route("a", MsgType::Data, "hello").is_none());
        assert_eq!(graph.node("b").unwrap().property.get("k"), Some(&Value::Int64(1)));
        assert_eq!(graph.groups().len(), 2);
        assert_eq!(graph.groups()[0].1, "default_extension_group");

        let filled = graph.complete_loc(&Loc::extension("a"));
        assert_eq!(filled.extension_group.as_deref(), Some("g1"));
    }
}
