use serde::Serialize;

use crate::{ItemId, PackageId, Task};

/// Ordered batch of detail requests sharing a priority index.
///
/// Higher indices run earlier. The index and the task list are fixed at
/// construction; the scheduler tracks task progress on its own copy.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Package {
    id: PackageId,
    index: i64,
    tasks: Vec<Task>,
}

impl Package {
    /// Builds a package with a fresh identity, one pending task per item, in item order.
    pub fn new(index: i64, items: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            id: PackageId::new(),
            index,
            tasks: items.into_iter().map(Task::new).collect(),
        }
    }

    /// Identity used when the package is brought forward.
    pub fn id(&self) -> &PackageId {
        &self.id
    }

    /// Priority index.
    pub fn index(&self) -> i64 {
        self.index
    }

    /// Tasks in submission order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Item ids in submission order.
    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.tasks.iter().map(|task| task.item_id)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when the package carries no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub(crate) fn into_parts(self) -> (PackageId, i64, Vec<Task>) {
        (self.id, self.index, self.tasks)
    }
}

/// Orders packages by descending index, keeping submission order on ties.
pub fn sort_by_priority(mut packages: Vec<Package>) -> Vec<Package> {
    // sort_by is stable
    packages.sort_by(|a, b| b.index.cmp(&a.index));
    packages
}
