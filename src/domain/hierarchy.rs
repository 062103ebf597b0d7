//! Hierarchy rules for the category forest
//!
//! Everything here is a pure function over ID lookups supplied by the
//! caller, so the same rules run against the in-memory catalog, the JSONL
//! store or the SQLite index.

use std::collections::{HashMap, HashSet, VecDeque};

use super::category::{Category, CategoryNode};
use super::id::CategoryId;

/// Outcome of checking a proposed parent for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    /// The proposed parent is not below the category
    Clear,
    /// The category would become its own parent
    SelfParent,
    /// The proposed parent is a descendant of the category
    Descendant,
    /// The stored parent chain already loops
    Loop,
}

impl Ancestry {
    pub fn is_clear(&self) -> bool {
        matches!(self, Ancestry::Clear)
    }
}

/// Checks whether `category` may be placed under `proposed_parent`.
///
/// Walks up from the proposed parent through `parent_of`, which returns the
/// parent of a node or `None` at a root or unknown node. The walk costs
/// O(depth) lookups and never enumerates the category's subtree.
pub fn check_reparent<E, F>(
    category: &CategoryId,
    proposed_parent: &CategoryId,
    mut parent_of: F,
) -> Result<Ancestry, E>
where
    F: FnMut(&CategoryId) -> Result<Option<CategoryId>, E>,
{
    if category == proposed_parent {
        return Ok(Ancestry::SelfParent);
    }

    let mut visited = HashSet::new();
    let mut current = Some(proposed_parent.clone());

    while let Some(id) = current {
        if &id == category {
            return Ok(Ancestry::Descendant);
        }
        if !visited.insert(id.clone()) {
            return Ok(Ancestry::Loop);
        }
        current = parent_of(&id)?;
    }

    Ok(Ancestry::Clear)
}

/// Returns the chain from the root down to `start`, inclusive.
///
/// Stops early if the stored chain revisits a node.
pub fn ancestor_chain<E, F>(start: Category, mut find: F) -> Result<Vec<Category>, E>
where
    F: FnMut(&CategoryId) -> Result<Option<Category>, E>,
{
    let mut visited = HashSet::from([start.id.clone()]);
    let mut next = start.parent_id.clone();
    let mut chain = vec![start];

    while let Some(parent_id) = next {
        if !visited.insert(parent_id.clone()) {
            break;
        }
        match find(&parent_id)? {
            Some(parent) => {
                next = parent.parent_id.clone();
                chain.push(parent);
            }
            None => break,
        }
    }

    chain.reverse();
    Ok(chain)
}

/// Collects `root` and every descendant, breadth-first.
pub fn subtree_ids<E, F>(root: &CategoryId, mut children_of: F) -> Result<Vec<CategoryId>, E>
where
    F: FnMut(&CategoryId) -> Result<Vec<CategoryId>, E>,
{
    let mut seen = HashSet::from([root.clone()]);
    let mut order = vec![root.clone()];
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(id) = queue.pop_front() {
        for child in children_of(&id)? {
            if seen.insert(child.clone()) {
                order.push(child.clone());
                queue.push_back(child);
            }
        }
    }

    Ok(order)
}

/// Sorts categories by name ignoring case, then by ID
pub fn sort_by_name(categories: &mut [Category]) {
    categories.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Builds the nested forest in two passes.
///
/// The first pass groups every category by parent ID (nodes whose parent
/// is missing from the input are treated as roots). The second emits each
/// node once, attaching its group as children.
pub fn build_forest<F>(categories: Vec<Category>, ads_count: F) -> Vec<CategoryNode>
where
    F: Fn(&CategoryId) -> usize,
{
    let known: HashSet<CategoryId> = categories.iter().map(|c| c.id.clone()).collect();

    let mut groups: HashMap<Option<CategoryId>, Vec<Category>> = HashMap::new();
    for category in categories {
        let key = category.parent_id.clone().filter(|p| known.contains(p));
        groups.entry(key).or_default().push(category);
    }
    for group in groups.values_mut() {
        sort_by_name(group);
    }

    let roots = groups.remove(&None).unwrap_or_default();
    emit(roots, &mut groups, &ads_count)
}

fn emit<F>(
    level: Vec<Category>,
    groups: &mut HashMap<Option<CategoryId>, Vec<Category>>,
    ads_count: &F,
) -> Vec<CategoryNode>
where
    F: Fn(&CategoryId) -> usize,
{
    level
        .into_iter()
        .map(|category| {
            let children = groups
                .remove(&Some(category.id.clone()))
                .unwrap_or_default();
            CategoryNode {
                ads_count: ads_count(&category.id),
                children: emit(children, groups, ads_count),
                category,
            }
        })
        .collect()
}
