//! File-group exclusivity.
//!
//! Groups are declared as an ordered list. Each group's effective filter is
//! its own filter plus the negation of the include patterns of every group
//! that outranks it, so a file is owned by at most one group and gets only
//! that group's headers.

use std::collections::BTreeMap;

use globset::GlobSet;

use revship_core::{FileGroup, GroupPriority};
use revship_revision::scan;

use crate::error::SyncError;

/// Negated include patterns of every later group, per group.
///
/// Plain backward accumulation: the last group gets nothing, group `i` gets
/// the negations of groups `i+1..`. Excludes (`!x`) are not negated again.
pub fn derive_negations(groups: &[FileGroup]) -> Vec<Vec<String>> {
    let mut negations = vec![Vec::new(); groups.len()];
    let mut running: Vec<String> = Vec::new();
    for i in (0..groups.len()).rev() {
        negations[i] = running.clone();
        running.extend(
            groups[i]
                .filter
                .iter()
                .filter(|f| !f.starts_with('!'))
                .map(|f| format!("!{f}")),
        );
    }
    negations
}

/// Effective filter of every group under `priority`.
pub fn effective_filters(groups: &[FileGroup], priority: GroupPriority) -> Vec<Vec<String>> {
    let negations = match priority {
        GroupPriority::LastWins => derive_negations(groups),
        GroupPriority::FirstWins => {
            let reversed: Vec<FileGroup> = groups.iter().rev().cloned().collect();
            let mut negations = derive_negations(&reversed);
            negations.reverse();
            negations
        }
    };
    groups
        .iter()
        .zip(negations)
        .map(|(group, negated)| group.filter.iter().cloned().chain(negated).collect())
        .collect()
}

#[derive(Debug)]
struct CompiledGroup {
    include: GlobSet,
    exclude: GlobSet,
    headers: BTreeMap<String, String>,
}

impl CompiledGroup {
    fn matches(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }
}

/// Compiled effective filters.
#[derive(Debug)]
pub struct GroupMatcher {
    groups: Vec<CompiledGroup>,
}

impl GroupMatcher {
    pub fn new(groups: &[FileGroup], priority: GroupPriority) -> Result<Self, SyncError> {
        let compiled = groups
            .iter()
            .zip(effective_filters(groups, priority))
            .map(|(group, filter)| {
                let (excludes, includes): (Vec<&String>, Vec<&String>) =
                    filter.iter().partition(|f| f.starts_with('!'));
                let excludes: Vec<&str> = excludes.iter().map(|f| &f[1..]).collect();
                Ok(CompiledGroup {
                    include: scan::glob_set(&includes)?,
                    exclude: scan::glob_set(&excludes)?,
                    headers: group.headers.clone(),
                })
            })
            .collect::<Result<Vec<_>, SyncError>>()?;
        Ok(Self { groups: compiled })
    }

    /// Indices of every group whose effective filter matches `relative`.
    pub fn matching(&self, relative: &str) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.matches(relative))
            .map(|(i, _)| i)
            .collect()
    }

    /// The group owning `relative`, if any.
    pub fn owner(&self, relative: &str) -> Option<usize> {
        self.groups.iter().position(|group| group.matches(relative))
    }

    pub fn headers(&self, group: usize) -> Option<&BTreeMap<String, String>> {
        self.groups.get(group).map(|g| &g.headers)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
