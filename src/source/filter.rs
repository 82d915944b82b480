//! Statement filter deciding which statements become rank edges

use super::triples::Statement;
use graphrank_algorithms::NodeId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One of the four id lists of an [`EdgeFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterList {
    IncludedPredicates,
    IncludedGraphs,
    ExcludedPredicates,
    ExcludedGraphs,
}

impl FilterList {
    pub const ALL: [FilterList; 4] = [
        FilterList::IncludedPredicates,
        FilterList::IncludedGraphs,
        FilterList::ExcludedPredicates,
        FilterList::ExcludedGraphs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterList::IncludedPredicates => "included-predicates",
            FilterList::IncludedGraphs => "included-graphs",
            FilterList::ExcludedPredicates => "excluded-predicates",
            FilterList::ExcludedGraphs => "excluded-graphs",
        }
    }
}

impl fmt::Display for FilterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterList::ALL
            .into_iter()
            .find(|list| list.name() == s)
            .ok_or_else(|| format!("unknown filter list '{}'", s))
    }
}

/// Which statements count as edges.
///
/// An empty include list lets everything through; exclude lists always apply.
/// Graph ids are context ids, the default graph is context 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeFilter {
    pub included_predicates: BTreeSet<NodeId>,
    pub included_graphs: BTreeSet<NodeId>,
    pub excluded_predicates: BTreeSet<NodeId>,
    pub excluded_graphs: BTreeSet<NodeId>,
    pub include_explicit: bool,
    pub include_implicit: bool,
}

impl Default for EdgeFilter {
    fn default() -> Self {
        Self {
            included_predicates: BTreeSet::new(),
            included_graphs: BTreeSet::new(),
            excluded_predicates: BTreeSet::new(),
            excluded_graphs: BTreeSet::new(),
            include_explicit: true,
            include_implicit: true,
        }
    }
}

impl EdgeFilter {
    pub fn list(&self, list: FilterList) -> &BTreeSet<NodeId> {
        match list {
            FilterList::IncludedPredicates => &self.included_predicates,
            FilterList::IncludedGraphs => &self.included_graphs,
            FilterList::ExcludedPredicates => &self.excluded_predicates,
            FilterList::ExcludedGraphs => &self.excluded_graphs,
        }
    }

    fn list_mut(&mut self, list: FilterList) -> &mut BTreeSet<NodeId> {
        match list {
            FilterList::IncludedPredicates => &mut self.included_predicates,
            FilterList::IncludedGraphs => &mut self.included_graphs,
            FilterList::ExcludedPredicates => &mut self.excluded_predicates,
            FilterList::ExcludedGraphs => &mut self.excluded_graphs,
        }
    }

    /// Returns false if the id was already listed
    pub fn add(&mut self, list: FilterList, id: NodeId) -> bool {
        self.list_mut(list).insert(id)
    }

    /// Returns false if the id was not listed
    pub fn remove(&mut self, list: FilterList, id: NodeId) -> bool {
        self.list_mut(list).remove(&id)
    }

    pub fn accepts(&self, statement: &Statement) -> bool {
        if statement.explicit && !self.include_explicit {
            return false;
        }
        if !statement.explicit && !self.include_implicit {
            return false;
        }
        if !self.included_predicates.is_empty()
            && !self.included_predicates.contains(&statement.predicate)
        {
            return false;
        }
        if !self.included_graphs.is_empty() && !self.included_graphs.contains(&statement.context) {
            return false;
        }
        !self.excluded_predicates.contains(&statement.predicate)
            && !self.excluded_graphs.contains(&statement.context)
    }

    /// Hex SHA-256 of the filter together with the filtering flag
    pub fn digest(&self, filtering: bool) -> String {
        let mut hasher = Sha256::new();
        hasher.update([filtering as u8]);
        for list in FilterList::ALL {
            let ids = self.list(list);
            hasher.update((ids.len() as u64).to_be_bytes());
            for id in ids {
                hasher.update(id.to_be_bytes());
            }
        }
        hasher.update([self.include_explicit as u8, self.include_implicit as u8]);
        format!("{:x}", hasher.finalize())
    }
}
