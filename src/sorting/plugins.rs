use std::rc::Rc;

use petgraph::{Graph, graph::NodeIndex};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::{
    EdgeType, logging,
    metadata::{File, Group, Priority, PluginMetadata},
    plugin::error::PluginDataError,
    sorting::{
        error::{CyclicInteractionError, SortingError, UndefinedGroupError},
        groups::{GroupsGraph, find_group_node, preceding_groups},
    },
};

use super::traversal;

/// The sorting-relevant view of one installed plugin: its header data plus
/// its merged metadata, split by source so that edges can be tagged with the
/// rule that produced them.
#[derive(Debug)]
pub struct PluginSortingData<'a, T: SortingPlugin> {
    plugin: &'a T,
    pub(super) is_master: bool,

    load_order_index: usize,

    pub(super) group: Box<str>,
    group_is_user_metadata: bool,
    masterlist_load_after: Box<[String]>,
    user_load_after: Box<[String]>,
    masterlist_req: Box<[String]>,
    user_req: Box<[String]>,
    priority: Priority,
    global_priority: Priority,
}

impl<'a, T: SortingPlugin> PluginSortingData<'a, T> {
    pub fn new(
        plugin: &'a T,
        masterlist_metadata: Option<&PluginMetadata>,
        user_metadata: Option<&PluginMetadata>,
        load_order_index: usize,
    ) -> Self {
        let masterlist_priority =
            masterlist_metadata.map_or_else(Priority::default, PluginMetadata::priority);
        let user_priority = user_metadata.map_or_else(Priority::default, PluginMetadata::priority);

        let masterlist_global_priority =
            masterlist_metadata.map_or_else(Priority::default, PluginMetadata::global_priority);
        let user_global_priority =
            user_metadata.map_or_else(Priority::default, PluginMetadata::global_priority);

        Self {
            plugin,
            // Light plugins share an index slot with each other, so they
            // partition with the non-masters.
            is_master: plugin.is_master() && !plugin.is_light(),
            load_order_index,
            group: user_metadata
                .and_then(|m| m.group())
                .or_else(|| masterlist_metadata.and_then(|m| m.group()))
                .unwrap_or(Group::DEFAULT_NAME)
                .into(),
            group_is_user_metadata: user_metadata.and_then(|m| m.group()).is_some(),
            masterlist_load_after: masterlist_metadata
                .map(|m| to_filenames(m.load_after_files()))
                .unwrap_or_default(),
            user_load_after: user_metadata
                .map(|m| to_filenames(m.load_after_files()))
                .unwrap_or_default(),
            masterlist_req: masterlist_metadata
                .map(|m| to_filenames(m.requirements()))
                .unwrap_or_default(),
            user_req: user_metadata
                .map(|m| to_filenames(m.requirements()))
                .unwrap_or_default(),
            priority: masterlist_priority.merge(user_priority),
            global_priority: masterlist_global_priority.merge(user_global_priority),
        }
    }

    pub(super) fn name(&self) -> &str {
        self.plugin.name()
    }

    fn masters(&self) -> Result<Vec<String>, PluginDataError> {
        self.plugin.masters()
    }
}

/// The plugin data that sorting needs. [crate::Plugin] implements this; tests
/// substitute their own type.
pub trait SortingPlugin {
    fn name(&self) -> &str;
    fn is_master(&self) -> bool;
    fn is_light(&self) -> bool;
    fn masters(&self) -> Result<Vec<String>, PluginDataError>;
}

fn to_filenames(files: &[File]) -> Box<[String]> {
    files.iter().map(|f| f.name().as_str().to_owned()).collect()
}

type InnerPluginsGraph<'a, T> = Graph<Rc<PluginSortingData<'a, T>>, EdgeType>;

#[derive(Debug)]
struct PluginsGraph<'a, T: SortingPlugin> {
    // Put the sorting data in Rc so that it can be held onto while mutating
    // the graph.
    inner: InnerPluginsGraph<'a, T>,
    paths_cache: HashMap<NodeIndex, HashSet<NodeIndex>>,
}

impl<'a, T: SortingPlugin> PluginsGraph<'a, T> {
    fn new() -> Self {
        PluginsGraph {
            inner: Graph::default(),
            paths_cache: HashMap::default(),
        }
    }

    fn add_node(&mut self, plugin: PluginSortingData<'a, T>) -> NodeIndex {
        self.inner.add_node(Rc::new(plugin))
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge_type: EdgeType) {
        if self.is_path_cached(from, to) {
            return;
        }

        logging::debug!(
            "Adding {} edge from \"{}\" to \"{}\".",
            edge_type,
            self.inner[from].name(),
            self.inner[to].name()
        );

        self.inner.add_edge(from, to, edge_type);

        self.cache_path(from, to);
    }

    fn node_indices(&self) -> petgraph::graph::NodeIndices {
        self.inner.node_indices()
    }

    /// Adds edges for the master-flag partition, each plugin's header masters
    /// and the "load after" and "requirement" metadata of each plugin.
    fn add_specific_edges(&mut self) -> Result<(), SortingError> {
        logging::trace!("Adding edges based on plugin data and non-group metadata...");

        let mut node_index_iter = self.node_indices();
        while let Some(node_index) = node_index_iter.next() {
            let plugin = Rc::clone(&self[node_index]);

            // Masters always load before non-masters.
            for other_node_index in node_index_iter.clone() {
                let other_plugin = &self[other_node_index];

                if plugin.is_master == other_plugin.is_master {
                    continue;
                }

                if other_plugin.is_master {
                    self.add_edge(other_node_index, node_index, EdgeType::MasterFlag);
                } else {
                    self.add_edge(node_index, other_node_index, EdgeType::MasterFlag);
                }
            }

            for master in plugin.masters()? {
                if let Some(other_node_index) = self.node_index_by_name(&master) {
                    self.add_edge(other_node_index, node_index, EdgeType::Master);
                }
            }

            for file in &plugin.masterlist_req {
                if let Some(other_node_index) = self.node_index_by_name(file) {
                    self.add_edge(
                        other_node_index,
                        node_index,
                        EdgeType::MasterlistRequirement,
                    );
                }
            }

            for file in &plugin.user_req {
                if let Some(other_node_index) = self.node_index_by_name(file) {
                    self.add_edge(other_node_index, node_index, EdgeType::UserRequirement);
                }
            }

            for file in &plugin.masterlist_load_after {
                if let Some(other_node_index) = self.node_index_by_name(file) {
                    self.add_edge(other_node_index, node_index, EdgeType::MasterlistLoadAfter);
                }
            }

            for file in &plugin.user_load_after {
                if let Some(other_node_index) = self.node_index_by_name(file) {
                    self.add_edge(other_node_index, node_index, EdgeType::UserLoadAfter);
                }
            }
        }

        Ok(())
    }

    fn add_early_loading_plugin_edges(&mut self, early_loading_plugins: &[String]) {
        logging::trace!(
            "Adding edges for implicitly active plugins and plugins with hardcoded positions..."
        );

        if early_loading_plugins.is_empty() {
            return;
        }

        let mut early_loader_indices = Vec::new();
        let mut other_plugin_indices = Vec::new();
        for node_index in self.node_indices() {
            let plugin = &self[node_index];
            if let Some(i) = early_loading_plugins
                .iter()
                .position(|e| unicase::eq(e.as_str(), plugin.name()))
            {
                early_loader_indices.push((i, node_index));
            } else {
                other_plugin_indices.push(node_index);
            }
        }

        early_loader_indices.sort_by_key(|e| e.0);

        for window in early_loader_indices.windows(2) {
            if let [(_, from_index), (_, to_index)] = *window {
                self.add_edge(from_index, to_index, EdgeType::Hardcoded);
            }
        }

        if let Some((_, from_index)) = early_loader_indices.last() {
            for to_index in other_plugin_indices {
                self.add_edge(*from_index, to_index, EdgeType::Hardcoded);
            }
        }
    }

    fn check_for_cycles(&mut self) -> Result<(), CyclicInteractionError> {
        if let Some(cycle) = traversal::find_cycle(&self.inner, |node| node.name().to_owned()) {
            Err(CyclicInteractionError::new(cycle))
        } else {
            Ok(())
        }
    }

    /// Adds edges between plugins whose groups are transitively ordered.
    /// Group edges are soft: an edge that would close a cycle with the edges
    /// added so far is skipped.
    fn add_group_edges(&mut self, groups_graph: &GroupsGraph) {
        logging::trace!("Adding edges based on plugin group memberships...");

        let plugins_in_groups = get_plugins_in_groups(&self.inner);

        let all_preceding = preceding_groups(groups_graph, false);
        let masterlist_preceding = preceding_groups(groups_graph, true);

        for group_node in groups_graph.node_indices() {
            let to_plugins = plugins_in_group(&plugins_in_groups, groups_graph, group_node);
            if to_plugins.is_empty() {
                continue;
            }

            let Some(preceding) = all_preceding.get(&group_node) else {
                continue;
            };

            // Iterate ancestors in node-index order so that edge insertion
            // order is deterministic.
            let mut preceding: Vec<_> = preceding.iter().copied().collect();
            preceding.sort();

            for preceding_node in preceding {
                let from_plugins =
                    plugins_in_group(&plugins_in_groups, groups_graph, preceding_node);

                let is_masterlist_path = masterlist_preceding
                    .get(&group_node)
                    .is_some_and(|m| m.contains(&preceding_node));

                for from_plugin in from_plugins {
                    for to_plugin in to_plugins {
                        self.try_add_group_edge(*from_plugin, *to_plugin, is_masterlist_path);
                    }
                }
            }
        }
    }

    fn try_add_group_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        is_masterlist_path: bool,
    ) {
        let involves_user_metadata = !is_masterlist_path
            || self[from].group_is_user_metadata
            || self[to].group_is_user_metadata;

        let edge_type = if involves_user_metadata {
            EdgeType::UserGroup
        } else {
            EdgeType::MasterlistGroup
        };

        if self.is_path_cached(from, to) {
            return;
        }

        if self.path_exists(to, from) {
            logging::debug!(
                "Skipping {} edge from \"{}\" to \"{}\" as it would create a cycle.",
                edge_type,
                self[from].name(),
                self[to].name()
            );
        } else {
            self.add_edge(from, to, edge_type);
        }
    }

    /// Adds an edge between each pair of plugins that the earlier rules left
    /// unordered, in the direction given by comparing their priorities, then
    /// their current load order indices, then their names.
    ///
    /// Pairs are visited in the current load order, and each edge is only
    /// added after checking that no path already orders the pair, so the
    /// edges cannot introduce a cycle.
    fn add_tie_break_edges(&mut self) {
        logging::trace!("Adding edges to break ties between plugins...");

        let nodes: Vec<_> = self.node_indices().collect();

        for (position, first) in nodes.iter().enumerate() {
            for second in nodes.iter().skip(position + 1) {
                if self.path_exists(*first, *second) || self.path_exists(*second, *first) {
                    continue;
                }

                let (from, to) = if loads_first(&self[*first], &self[*second]) {
                    (*first, *second)
                } else {
                    (*second, *first)
                };

                self.add_edge(from, to, EdgeType::TieBreak);
            }
        }
    }

    /// Produce the sorted order as the reverse postorder of a depth-first
    /// traversal that visits roots in the current load order.
    fn topological_sort(&self) -> Vec<NodeIndex> {
        let mut visited: HashSet<NodeIndex> = HashSet::default();
        let mut order = Vec::new();

        for start in self.node_indices() {
            if !visited.insert(start) {
                continue;
            }

            let mut stack = vec![(start, self.edge_targets(start))];

            while let Some((node, targets)) = stack.last_mut() {
                if let Some(target) = targets.next() {
                    if visited.insert(target) {
                        stack.push((target, self.edge_targets(target)));
                    }
                } else {
                    // All of this node's successors are finished, so it loads
                    // before everything already collected.
                    order.push(*node);
                    stack.pop();
                }
            }
        }

        order.reverse();

        order
    }

    fn edge_targets(&self, node: NodeIndex) -> std::vec::IntoIter<NodeIndex> {
        traversal::edge_targets(&self.inner, node).into_iter()
    }

    fn cache_path(&mut self, from: NodeIndex, to: NodeIndex) {
        self.paths_cache.entry(from).or_default().insert(to);
    }

    fn is_path_cached(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.paths_cache.get(&from).is_some_and(|s| s.contains(&to))
    }

    fn node_index_by_name(&self, name: &str) -> Option<NodeIndex> {
        self.node_indices()
            .find(|i| unicase::eq(self[*i].name(), name))
    }

    fn path_exists(&mut self, from: NodeIndex, to: NodeIndex) -> bool {
        if self.is_path_cached(from, to) {
            return true;
        }

        // Everything the search discovers is reachable from `from`, so it
        // all feeds the cache even when no path to `to` exists.
        let cache = self.paths_cache.entry(from).or_default();
        traversal::path_exists(&self.inner, from, to, |node| {
            cache.insert(node);
        })
    }
}

impl<'a, T: SortingPlugin> std::ops::Index<NodeIndex> for PluginsGraph<'a, T> {
    type Output = Rc<PluginSortingData<'a, T>>;

    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.inner[index]
    }
}

/// Decide which of two mutually-unordered plugins loads first: the one with
/// the higher global priority, then the higher priority, then the earlier
/// current load order position, then the case-insensitively smaller name.
fn loads_first<T: SortingPlugin>(a: &PluginSortingData<T>, b: &PluginSortingData<T>) -> bool {
    a.global_priority
        .cmp(&b.global_priority)
        .then_with(|| a.priority.cmp(&b.priority))
        .reverse()
        .then_with(|| a.load_order_index.cmp(&b.load_order_index))
        .then_with(|| {
            unicase::UniCase::new(a.name()).cmp(&unicase::UniCase::new(b.name()))
        })
        .is_lt()
}

/// Calculate an order for the given plugins that satisfies their header
/// masters and metadata, is deterministic, and otherwise changes the current
/// load order as little as possible.
pub fn sort_plugins<T: SortingPlugin>(
    mut plugins_sorting_data: Vec<PluginSortingData<T>>,
    groups_graph: &GroupsGraph,
    early_loading_plugins: &[String],
) -> Result<Vec<String>, SortingError> {
    if plugins_sorting_data.is_empty() {
        return Ok(Vec::new());
    }

    validate_plugin_groups(&plugins_sorting_data, groups_graph)?;

    // Sort the plugins by their current load order positions. This is the
    // vertex iteration order for everything that follows, so given the same
    // input load order the same edges get added and the same result comes
    // out.
    plugins_sorting_data.sort_by_key(|p| p.load_order_index);

    let mut graph = PluginsGraph::new();

    for plugin in plugins_sorting_data {
        graph.add_node(plugin);
    }

    graph.add_specific_edges()?;
    graph.add_early_loading_plugin_edges(early_loading_plugins);

    // Check for cycles now because from this point on edges are only added if
    // they don't cause cycles, so checking now provides quicker feedback if
    // there is an issue.
    graph.check_for_cycles()?;

    graph.add_group_edges(groups_graph);
    graph.add_tie_break_edges();

    // Check for cycles again, just in case there's a bug that lets some
    // occur. The check doesn't take a significant amount of time.
    graph.check_for_cycles()?;

    let sorted_nodes = graph.topological_sort();

    let sorted_plugin_names = sorted_nodes
        .into_iter()
        .map(|i| graph[i].name().to_owned())
        .collect();

    Ok(sorted_plugin_names)
}

fn validate_plugin_groups<T: SortingPlugin>(
    plugins_sorting_data: &[PluginSortingData<T>],
    groups_graph: &GroupsGraph,
) -> Result<(), UndefinedGroupError> {
    for plugin in plugins_sorting_data {
        find_group_node(groups_graph, &plugin.group)?;
    }

    Ok(())
}

fn get_plugins_in_groups<T: SortingPlugin>(
    graph: &InnerPluginsGraph<T>,
) -> HashMap<Box<str>, Vec<NodeIndex>> {
    let mut plugins_in_groups: HashMap<Box<str>, Vec<NodeIndex>> = HashMap::default();

    for node in graph.node_indices() {
        let group_name = graph[node].group.clone();

        plugins_in_groups.entry(group_name).or_default().push(node);
    }

    plugins_in_groups
}

fn plugins_in_group<'a>(
    plugins_in_groups: &'a HashMap<Box<str>, Vec<NodeIndex>>,
    groups_graph: &GroupsGraph,
    group_node: NodeIndex,
) -> &'a [NodeIndex] {
    plugins_in_groups
        .get(&groups_graph[group_node])
        .map(Vec::as_slice)
        .unwrap_or_default()
}
