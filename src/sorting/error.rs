use std::fmt::Display;

use crate::{Vertex, plugin::error::PluginDataError};

/// Indicates that metadata referenced a group that is not defined in any
/// loaded metadata list.
#[derive(Clone, Default, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UndefinedGroupError {
    group_name: String,
}

impl UndefinedGroupError {
    pub(crate) fn new(group_name: String) -> Self {
        Self { group_name }
    }

    pub(crate) fn into_group_name(self) -> String {
        self.group_name
    }
}

impl Display for UndefinedGroupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "the group \"{}\" does not exist", self.group_name)
    }
}

impl std::error::Error for UndefinedGroupError {}

/// Indicates that sorting found a cycle of plugins or groups. The cycle's
/// vertices record which rule contributed each of its edges.
#[derive(Clone, Default, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CyclicInteractionError {
    cycle: Vec<Vertex>,
}

impl CyclicInteractionError {
    pub(crate) fn new(cycle: Vec<Vertex>) -> Self {
        Self { cycle }
    }

    pub(crate) fn into_cycle(self) -> Vec<Vertex> {
        self.cycle
    }
}

impl Display for CyclicInteractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cycle = display_cycle(&self.cycle);
        write!(f, "cyclic interaction detected: {cycle}")
    }
}

impl std::error::Error for CyclicInteractionError {}

pub(crate) fn display_cycle(cycle: &[Vertex]) -> String {
    cycle
        .iter()
        .map(|v| {
            if let Some(edge_type) = v.out_edge_type() {
                format!("{} --[{}]-> ", v.name(), edge_type)
            } else {
                v.name().to_owned()
            }
        })
        .chain(cycle.first().iter().map(|v| v.name().to_owned()))
        .collect()
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub(crate) enum BuildGroupsGraphError {
    UndefinedGroup(UndefinedGroupError),
    CycleFound(CyclicInteractionError),
}

impl Display for BuildGroupsGraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndefinedGroup(_) => write!(f, "encountered an undefined group"),
            Self::CycleFound(_) => write!(f, "the groups graph is cyclic"),
        }
    }
}

impl std::error::Error for BuildGroupsGraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UndefinedGroup(e) => Some(e),
            Self::CycleFound(e) => Some(e),
        }
    }
}

impl From<UndefinedGroupError> for BuildGroupsGraphError {
    fn from(value: UndefinedGroupError) -> Self {
        BuildGroupsGraphError::UndefinedGroup(value)
    }
}

impl From<CyclicInteractionError> for BuildGroupsGraphError {
    fn from(value: CyclicInteractionError) -> Self {
        BuildGroupsGraphError::CycleFound(value)
    }
}

#[derive(Debug)]
pub(crate) enum SortingError {
    UndefinedGroup(UndefinedGroupError),
    CycleFound(CyclicInteractionError),
    PluginDataError(PluginDataError),
}

impl Display for SortingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndefinedGroup(_) => write!(f, "found an undefined group"),
            Self::CycleFound(_) => write!(f, "found a cycle"),
            Self::PluginDataError(_) => write!(f, "failed to read plugin data"),
        }
    }
}

impl std::error::Error for SortingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::UndefinedGroup(e) => Some(e),
            Self::CycleFound(e) => Some(e),
            Self::PluginDataError(e) => Some(e),
        }
    }
}

impl From<UndefinedGroupError> for SortingError {
    fn from(value: UndefinedGroupError) -> Self {
        SortingError::UndefinedGroup(value)
    }
}

impl From<CyclicInteractionError> for SortingError {
    fn from(value: CyclicInteractionError) -> Self {
        SortingError::CycleFound(value)
    }
}

impl From<PluginDataError> for SortingError {
    fn from(value: PluginDataError) -> Self {
        SortingError::PluginDataError(value)
    }
}
