use petgraph::{Graph, graph::NodeIndex, visit::EdgeRef};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::{
    EdgeType, LogLevel,
    logging::{self, is_log_enabled},
    metadata::Group,
    sorting::{
        error::{BuildGroupsGraphError, CyclicInteractionError, UndefinedGroupError},
        traversal::find_cycle,
    },
};

pub type GroupsGraph = Graph<Box<str>, EdgeType>;

/// Build the DAG of groups declared in the masterlist and userlist. An edge
/// from one group to another means that the other group loads after it.
pub fn build_groups_graph(
    masterlist_groups: &[Group],
    userlist_groups: &[Group],
) -> Result<GroupsGraph, BuildGroupsGraphError> {
    let masterlist_groups = sorted_by_name(masterlist_groups);
    let userlist_groups = sorted_by_name(userlist_groups);

    let mut graph = GroupsGraph::new();
    let mut group_nodes: HashMap<&str, NodeIndex> = HashMap::default();

    logging::trace!("Adding masterlist groups to groups graph...");
    add_groups(
        &mut graph,
        &mut group_nodes,
        &masterlist_groups,
        EdgeType::MasterlistLoadAfter,
    )?;

    logging::trace!("Adding user groups to groups graph...");
    add_groups(
        &mut graph,
        &mut group_nodes,
        &userlist_groups,
        EdgeType::UserLoadAfter,
    )?;

    if let Some(cycle) = find_cycle(&graph, |node| node.clone().into_string()) {
        Err(CyclicInteractionError::new(cycle).into())
    } else {
        Ok(graph)
    }
}

fn sorted_by_name(groups: &[Group]) -> Vec<&Group> {
    let mut groups: Vec<_> = groups.iter().collect();
    groups.sort_by_key(|a| a.name());

    groups
}

fn add_groups<'a>(
    graph: &mut GroupsGraph,
    group_nodes: &mut HashMap<&'a str, NodeIndex>,
    groups: &[&'a Group],
    edge_type: EdgeType,
) -> Result<(), UndefinedGroupError> {
    for group in groups {
        let key = group.name();
        if !group_nodes.contains_key(key) {
            let node_index = graph.add_node(group.name().into());
            group_nodes.insert(key, node_index);
        }
    }

    for group in groups {
        if is_log_enabled(LogLevel::Trace) {
            logging::trace!(
                "Group \"{}\" directly loads after groups \"{}\"",
                group.name(),
                group.after_groups().join(", ")
            );
        }

        let Some(node_index) = group_nodes.get(group.name()) else {
            logging::error!(
                "Unexpectedly couldn't find node for group {}: it should have just been added to the graph",
                group.name()
            );
            return Err(UndefinedGroupError::new(group.name().to_owned()));
        };

        for other_group_name in sorted_clone(group.after_groups()) {
            if let Some(other_index) = group_nodes.get(other_group_name) {
                graph.update_edge(*other_index, *node_index, edge_type);
            } else {
                return Err(UndefinedGroupError::new(other_group_name.to_owned()));
            }
        }
    }

    Ok(())
}

fn sorted_clone(strings: &[String]) -> Vec<&str> {
    let mut strings: Vec<_> = strings.iter().map(String::as_str).collect();
    strings.sort_unstable();

    strings
}

pub fn find_group_node(
    graph: &GroupsGraph,
    group_name: &str,
) -> Result<NodeIndex, UndefinedGroupError> {
    graph
        .node_indices()
        .find(|n| graph[*n].as_ref() == group_name)
        .ok_or_else(|| UndefinedGroupError::new(group_name.to_owned()))
}

/// For each group, collect the groups that transitively precede it, i.e. its
/// ancestors in the groups DAG. If `masterlist_edges_only` is true, paths
/// that involve a user-defined "load after" are ignored.
pub fn preceding_groups(
    graph: &GroupsGraph,
    masterlist_edges_only: bool,
) -> HashMap<NodeIndex, HashSet<NodeIndex>> {
    let mut preceding = HashMap::default();

    for node in graph.node_indices() {
        let mut ancestors = HashSet::default();
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            for edge in graph.edges_directed(current, petgraph::Direction::Incoming) {
                if masterlist_edges_only && *edge.weight() == EdgeType::UserLoadAfter {
                    continue;
                }

                if ancestors.insert(edge.source()) {
                    stack.push(edge.source());
                }
            }
        }

        preceding.insert(node, ancestors);
    }

    preceding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    mod build_groups_graph {
        use super::*;

        #[test]
        fn should_error_if_an_after_group_does_not_exist() {
            let groups = &[Group::new("b".into()).with_after_groups(vec!["a".into()])];

            match build_groups_graph(groups, &[]) {
                Err(BuildGroupsGraphError::UndefinedGroup(e)) => {
                    assert_eq!("a", e.into_group_name());
                }
                _ => panic!("Expected an undefined group error"),
            }
        }

        #[test]
        fn should_error_if_masterlist_group_loads_after_user_group() {
            let masterlist = &[Group::new("b".into()).with_after_groups(vec!["a".into()])];
            let userlist = &[Group::new("a".into())];

            match build_groups_graph(masterlist, userlist) {
                Err(BuildGroupsGraphError::UndefinedGroup(e)) => {
                    assert_eq!("a", e.into_group_name());
                }
                _ => panic!("Expected an undefined group error"),
            }
        }

        #[test]
        fn should_error_if_after_groups_are_cyclic() {
            let masterlist = &[
                Group::new("a".into()),
                Group::new("b".into()).with_after_groups(vec!["a".into()]),
            ];
            let userlist = &[
                Group::new("a".into()).with_after_groups(vec!["c".into()]),
                Group::new("c".into()).with_after_groups(vec!["b".into()]),
            ];

            match build_groups_graph(masterlist, userlist) {
                Err(BuildGroupsGraphError::CycleFound(e)) => {
                    let cycle = e.into_cycle();

                    assert_eq!(
                        &[
                            Vertex::new("a".into())
                                .with_out_edge_type(EdgeType::MasterlistLoadAfter),
                            Vertex::new("b".into()).with_out_edge_type(EdgeType::UserLoadAfter),
                            Vertex::new("c".into()).with_out_edge_type(EdgeType::UserLoadAfter),
                        ],
                        cycle.as_slice()
                    );
                }
                _ => panic!("Expected a cyclic interaction error"),
            }
        }

        #[test]
        fn cyclic_interaction_error_should_only_include_groups_that_are_part_of_the_cycle() {
            let masterlist = &[
                Group::new("a".into()).with_after_groups(vec!["b".into()]),
                Group::new("b".into()).with_after_groups(vec!["a".into()]),
                Group::new("c".into()).with_after_groups(vec!["b".into()]),
            ];

            match build_groups_graph(masterlist, &[]) {
                Err(BuildGroupsGraphError::CycleFound(e)) => {
                    let cycle = e.into_cycle();

                    assert_eq!(
                        &[
                            Vertex::new("a".into())
                                .with_out_edge_type(EdgeType::MasterlistLoadAfter),
                            Vertex::new("b".into())
                                .with_out_edge_type(EdgeType::MasterlistLoadAfter),
                        ],
                        cycle.as_slice()
                    );
                }
                _ => panic!("Expected a cyclic interaction error"),
            }
        }
    }

    mod preceding_groups {
        use super::*;

        #[test]
        fn should_collect_transitive_ancestors() {
            let masterlist = &[
                Group::new("a".into()),
                Group::new("b".into()).with_after_groups(vec!["a".into()]),
                Group::new("c".into()).with_after_groups(vec!["b".into()]),
            ];
            let graph = build_groups_graph(masterlist, &[]).unwrap();

            let preceding = preceding_groups(&graph, false);

            let a = find_group_node(&graph, "a").unwrap();
            let b = find_group_node(&graph, "b").unwrap();
            let c = find_group_node(&graph, "c").unwrap();

            assert!(preceding[&c].contains(&a));
            assert!(preceding[&c].contains(&b));
            assert!(preceding[&b].contains(&a));
            assert!(!preceding[&a].contains(&c));
        }

        #[test]
        fn should_ignore_paths_involving_user_edges_when_asked_to() {
            let masterlist = &[
                Group::new("a".into()),
                Group::new("b".into()).with_after_groups(vec!["a".into()]),
            ];
            let userlist = &[Group::new("c".into()).with_after_groups(vec!["b".into()])];
            let graph = build_groups_graph(masterlist, userlist).unwrap();

            let a = find_group_node(&graph, "a").unwrap();
            let b = find_group_node(&graph, "b").unwrap();
            let c = find_group_node(&graph, "c").unwrap();

            let all = preceding_groups(&graph, false);
            assert!(all[&c].contains(&a));
            assert!(all[&c].contains(&b));

            let masterlist_only = preceding_groups(&graph, true);
            assert!(masterlist_only[&c].is_empty());
            assert!(masterlist_only[&b].contains(&a));
        }
    }
}
