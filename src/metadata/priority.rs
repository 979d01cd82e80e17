/// Records where a priority value was set, if anywhere.
///
/// Priorities read from a masterlist carry the `Default` source and
/// priorities read from a userlist (or set through the user metadata API)
/// carry the `User` source.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PrioritySource {
    #[default]
    Unset,
    Default,
    User,
}

/// A signed plugin priority with an explicit unset state.
///
/// An unset priority compares as the value zero, but is overwritten by any
/// set priority when metadata is merged. Two priorities with the same value
/// but different sources compare deterministically, with the unset source
/// ordering lowest and the user source highest.
// The field order matters: the derived ordering compares values before
// sources.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Priority {
    value: i8,
    source: PrioritySource,
}

impl Priority {
    /// Create a set priority with the given value and the `Default` source.
    #[must_use]
    pub fn new(value: i8) -> Self {
        Self {
            value,
            source: PrioritySource::Default,
        }
    }

    /// Get the priority's value, which is zero if the priority is unset.
    pub fn value(&self) -> i8 {
        self.value
    }

    /// Check if the priority has been explicitly set.
    pub fn is_set(&self) -> bool {
        self.source != PrioritySource::Unset
    }

    /// Get where the priority's value was set.
    pub fn source(&self) -> PrioritySource {
        self.source
    }

    pub(crate) fn into_user(self) -> Self {
        if self.is_set() {
            Self {
                value: self.value,
                source: PrioritySource::User,
            }
        } else {
            self
        }
    }

    /// The merged priority is the other priority if it is set, otherwise this
    /// priority. An explicitly-set zero still wins over an unset value, so it
    /// is not possible to unset a priority by merging.
    pub(crate) fn merge(self, other: Self) -> Self {
        if other.is_set() { other } else { self }
    }
}
