// ============================================================================
// OrgTree Core - Subtree Builder
// File: crates/orgtree-core/src/services/subtree_builder.rs
// Description: Rebuilds presentation trees from flat group/member rows
// ============================================================================
//! Flat rows are converted by a bounded pool of hydration futures, linked
//! through an index arena, and each root's subtree is assembled on its own
//! task. Trees are read without a transaction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use tokio::task::JoinSet;
use tracing::{debug, error};
use uuid::Uuid;

use orgtree_shared::config::EngineSettings;
use orgtree_shared::constants::SIMPLIFY_MIN_MEMBERS;

use crate::domain::{
    path_is_within, GroupSubtree, GroupTreeNode, GroupType, GroupWithMembers, Person, SubtreeRequest,
};
use crate::error::DomainError;
use crate::repositories::{HierarchyStore, SubtreeQuery};

pub struct SubtreeBuilder<S: HierarchyStore> {
    store: Arc<S>,
    concurrency: usize,
    simplify_max_members: usize,
}

impl<S: HierarchyStore> SubtreeBuilder<S> {
    pub fn new(store: Arc<S>, settings: &EngineSettings) -> Self {
        Self {
            store,
            concurrency: settings.hydration_concurrency.max(1),
            simplify_max_members: settings.simplify_max_members,
        }
    }

    pub async fn build(&self, request: &SubtreeRequest) -> Result<GroupSubtree, DomainError> {
        let root_group_ids = match request.root_group_id {
            Some(id) => vec![id],
            None => request.viewable_group_ids.clone(),
        };
        let rows = self
            .store
            .fetch_subtree(&SubtreeQuery {
                tenant_id: request.tenant_id,
                root_group_ids,
                max_depth: request.max_depth,
                active_only: request.active_only,
            })
            .await?;

        if let Some(root) = request.root_group_id {
            if !rows.iter().any(|row| row.group.id == root) {
                return Err(DomainError::GroupNotFound(root));
            }
        }
        debug!("Building subtree for tenant {} from {} groups", request.tenant_id, rows.len());

        let nodes: Vec<GroupTreeNode> = stream::iter(rows)
            .map(|row| self.convert(row, request))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut arena = TreeArena::link(nodes);
        let roots = arena.root_indices(request);

        let mut tasks: JoinSet<(usize, Option<GroupTreeNode>)> = JoinSet::new();
        let mut slots: Vec<Option<GroupTreeNode>> = vec![None; roots.len()];
        for (position, root) in roots.into_iter().enumerate() {
            let Some(subtree) = arena.take_subtree(root) else { continue };
            let simplify = request.simplify;
            let max_members = self.simplify_max_members;
            tasks.spawn(async move {
                let node = subtree.assemble().map(|mut node| {
                    if simplify {
                        simplify_node(&mut node, max_members);
                    }
                    node.recompute_depth();
                    node
                });
                (position, node)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (position, node) = joined.map_err(|e| {
                error!("Subtree task failed for tenant {}: {}", request.tenant_id, e);
                DomainError::InternalError(format!("subtree task failed: {}", e))
            })?;
            slots[position] = node;
        }

        let roots: Vec<GroupTreeNode> = slots.into_iter().flatten().collect();
        let depth = roots.iter().map(|r| r.depth).max().unwrap_or(0);
        Ok(GroupSubtree { roots, depth })
    }

    async fn convert(&self, row: GroupWithMembers, request: &SubtreeRequest) -> Result<GroupTreeNode, DomainError> {
        let GroupWithMembers { group, mut members } = row;

        if request.hydrate_members && !members.is_empty() {
            let ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
            let mut people: HashMap<Uuid, Person> = self
                .store
                .find_people_by_ids(group.tenant_id, &ids)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();
            for member in members.iter_mut() {
                member.person = people.remove(&member.id);
            }
        }

        let crm_roles = if request.hydrate_crm_roles && !group.crm_role_ids.is_empty() {
            self.store
                .find_crm_roles_by_ids(group.tenant_id, &group.crm_role_ids)
                .await?
        } else {
            Vec::new()
        };

        let is_manager = group.group_type == GroupType::Manager;
        let display_name = if request.use_manager_names && is_manager && !members.is_empty() {
            members
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            group.name.clone()
        };
        if request.exclude_manager_users && is_manager {
            members.clear();
        }

        Ok(GroupTreeNode {
            group,
            display_name,
            members,
            crm_roles,
            children: Vec::new(),
            depth: 1,
        })
    }
}

/// Converted nodes plus child index lists
struct TreeArena {
    nodes: Vec<Option<GroupTreeNode>>,
    children: Vec<Vec<usize>>,
    index: HashMap<Uuid, usize>,
}

impl TreeArena {
    fn link(nodes: Vec<GroupTreeNode>) -> Self {
        let index: HashMap<Uuid, usize> = nodes.iter().enumerate().map(|(i, n)| (n.group.id, i)).collect();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            if let Some(parent) = node.group.parent_id.and_then(|p| index.get(&p).copied()) {
                if parent != i {
                    children[parent].push(i);
                }
            }
        }
        for list in children.iter_mut() {
            sort_siblings(list, &nodes);
        }

        Self {
            nodes: nodes.into_iter().map(Some).collect(),
            children,
            index,
        }
    }

    fn node(&self, idx: usize) -> Option<&GroupTreeNode> {
        self.nodes.get(idx).and_then(|n| n.as_ref())
    }

    fn root_indices(&self, request: &SubtreeRequest) -> Vec<usize> {
        if let Some(root) = request.root_group_id {
            return self.index.get(&root).copied().into_iter().collect();
        }

        let mut roots: Vec<usize> = if request.viewable_group_ids.is_empty() {
            (0..self.nodes.len())
                .filter(|i| {
                    self.node(*i)
                        .and_then(|n| n.group.parent_id)
                        .map_or(true, |p| !self.index.contains_key(&p))
                })
                .collect()
        } else {
            let viewable: HashSet<usize> = request
                .viewable_group_ids
                .iter()
                .filter_map(|id| self.index.get(id).copied())
                .collect();
            viewable
                .iter()
                .copied()
                .filter(|i| {
                    let Some(node) = self.node(*i) else { return false };
                    !viewable.iter().any(|other| {
                        other != i
                            && self
                                .node(*other)
                                .map_or(false, |o| path_is_within(&node.group.path, &o.group.path))
                    })
                })
                .collect()
        };

        roots.sort_by(|a, b| {
            let key = |i: &usize| self.node(*i).map(|n| (n.group.order, n.group.name.clone()));
            key(a).cmp(&key(b))
        });
        roots
    }

    /// Moves a root and everything below it out of the arena.
    fn take_subtree(&mut self, root: usize) -> Option<SubtreeArena> {
        let mut nodes: Vec<GroupTreeNode> = Vec::new();
        let mut local: HashMap<usize, usize> = HashMap::new();
        let mut order: Vec<usize> = Vec::new();
        let mut queue: VecDeque<usize> = VecDeque::from([root]);

        while let Some(idx) = queue.pop_front() {
            let Some(node) = self.nodes.get_mut(idx).and_then(|slot| slot.take()) else { continue };
            local.insert(idx, nodes.len());
            nodes.push(node);
            order.push(idx);
            queue.extend(self.children[idx].iter().copied());
        }
        if nodes.is_empty() {
            return None;
        }

        let children = order
            .iter()
            .map(|idx| {
                self.children[*idx]
                    .iter()
                    .filter_map(|child| local.get(child).copied())
                    .collect()
            })
            .collect();
        Some(SubtreeArena { nodes, children })
    }
}

fn sort_siblings(list: &mut [usize], nodes: &[GroupTreeNode]) {
    list.sort_by(|a, b| {
        let (na, nb) = (&nodes[*a].group, &nodes[*b].group);
        (na.order, &na.name).cmp(&(nb.order, &nb.name))
    });
}

/// One root's nodes; index 0 is the root
struct SubtreeArena {
    nodes: Vec<GroupTreeNode>,
    children: Vec<Vec<usize>>,
}

impl SubtreeArena {
    fn assemble(self) -> Option<GroupTreeNode> {
        let SubtreeArena { nodes, children } = self;
        let mut slots: Vec<Option<GroupTreeNode>> = nodes.into_iter().map(Some).collect();
        attach(0, &mut slots, &children)
    }
}

fn attach(idx: usize, slots: &mut [Option<GroupTreeNode>], children: &[Vec<usize>]) -> Option<GroupTreeNode> {
    let mut node = slots.get_mut(idx)?.take()?;
    node.children = children[idx]
        .iter()
        .filter_map(|child| attach(*child, slots, children))
        .collect();
    Some(node)
}

/// Collapses a manager whose only child is a childless IC group with a small
/// membership into one node. Runs bottom-up; depths must be recomputed after.
pub fn simplify_node(node: &mut GroupTreeNode, max_members: usize) {
    for child in node.children.iter_mut() {
        simplify_node(child, max_members);
    }

    let absorbs = node.group.group_type == GroupType::Manager
        && node.children.len() == 1
        && node.children.first().map_or(false, |child| {
            child.group.group_type == GroupType::Ic
                && child.children.is_empty()
                && (SIMPLIFY_MIN_MEMBERS..=max_members).contains(&child.members.len())
        });
    if absorbs {
        if let Some(child) = node.children.pop() {
            node.members.extend(child.members);
        }
    }
}
