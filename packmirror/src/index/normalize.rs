//! Index normalization: `name -> {sha256}` mappings into download tasks.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, Stream};

use super::template::UriTemplate;
use super::types::HashEntry;
use crate::error::MirrorResult;
use crate::fetch::FetchTask;

/// An ordered, URI-deduplicated set of download tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    tasks: Vec<FetchTask>,
    positions: HashMap<String, usize>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task unless its URI is already present.
    ///
    /// Returns `false` for a duplicate; the first task for a URI wins.
    pub fn insert(&mut self, task: FetchTask) -> bool {
        if self.positions.contains_key(&task.uri) {
            return false;
        }
        self.positions.insert(task.uri.clone(), self.tasks.len());
        self.tasks.push(task);
        true
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, uri: &str) -> Option<&FetchTask> {
        self.positions.get(uri).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.positions.contains_key(uri)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FetchTask> {
        self.tasks.iter()
    }

    /// A new set holding only the given URIs, in this set's order.
    ///
    /// URIs unknown to this set are ignored.
    pub fn restrict<'a, I>(&self, uris: I) -> TaskSet
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut wanted: Vec<usize> = uris
            .into_iter()
            .filter_map(|uri| self.positions.get(uri).copied())
            .collect();
        wanted.sort_unstable();
        wanted.dedup();

        let mut restricted = TaskSet::new();
        for i in wanted {
            restricted.insert(self.tasks[i].clone());
        }
        restricted
    }

    /// A forward-only producer over the tasks, consumed by the scheduler.
    ///
    /// Tasks are cloned one at a time as the scheduler pulls them, so no
    /// request state exists for tasks that have not been issued yet.
    pub fn stream(&self) -> impl Stream<Item = MirrorResult<FetchTask>> + Unpin + '_ {
        stream::iter(self.tasks.iter().cloned().map(Ok))
    }
}

/// Turn a `name -> {sha256}` mapping into a task set.
///
/// Pure and deterministic; duplicate URIs collapse to the first entry.
pub fn normalize<'a, I>(entries: I, template: &UriTemplate) -> MirrorResult<TaskSet>
where
    I: IntoIterator<Item = (&'a str, &'a HashEntry)>,
{
    let mut set = TaskSet::new();
    for (name, entry) in entries {
        let uri = template.render(name, &entry.sha256)?;
        set.insert(FetchTask::new(uri, entry.sha256.clone()));
    }
    Ok(set)
}

/// Lazily render tasks from a `name -> {sha256}` mapping.
///
/// Each task is rendered only when the scheduler pulls it; a malformed entry
/// is yielded as an `Err`, which stops the scheduler's intake. Duplicate URIs
/// are dropped, first wins.
pub fn task_stream<'a, I>(
    entries: I,
    template: &'a UriTemplate,
) -> impl Stream<Item = MirrorResult<FetchTask>> + Unpin + 'a
where
    I: IntoIterator<Item = (&'a str, &'a HashEntry)>,
    I::IntoIter: 'a,
{
    let mut seen = HashSet::new();
    stream::iter(entries.into_iter().filter_map(move |(name, entry)| {
        match template.render(name, &entry.sha256) {
            Ok(uri) => seen
                .insert(uri.clone())
                .then(|| Ok(FetchTask::new(uri, entry.sha256.clone()))),
            Err(e) => Some(Err(e)),
        }
    }))
}
