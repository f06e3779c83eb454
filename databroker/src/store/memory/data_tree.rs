use crate::data::{DataPath, NormalizedNode};
use im::OrdMap;

/// One recorded change of a write transaction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Modification {
    Write(DataPath, NormalizedNode),
    Merge(DataPath, NormalizedNode),
    Delete(DataPath),
}

impl Modification {
    pub(crate) fn path(&self) -> &DataPath {
        match self {
            Modification::Write(path, _) => path,
            Modification::Merge(path, _) => path,
            Modification::Delete(path) => path,
        }
    }

    /// Returns `root` with this modification applied.
    pub(crate) fn apply(&self, root: &NormalizedNode) -> NormalizedNode {
        let updated = match self {
            Modification::Write(path, data) => {
                update(Some(root), path.args(), &mut |_| Some(data.clone()))
            }
            Modification::Merge(path, data) => update(Some(root), path.args(), &mut |existing| {
                Some(match existing {
                    Some(existing) => existing.merged(data),
                    None => data.clone(),
                })
            }),
            Modification::Delete(path) => {
                if root.find(path).is_none() {
                    return root.clone();
                }
                update(Some(root), path.args(), &mut |_| None)
            }
        };
        // deleting the root leaves an empty tree
        updated.unwrap_or_else(NormalizedNode::container)
    }
}

/// Applies every modification in order.
pub(crate) fn apply_all(root: &NormalizedNode, modifications: &[Modification]) -> NormalizedNode {
    modifications
        .iter()
        .fold(root.clone(), |tree, modification| modification.apply(&tree))
}

/// Finds the first modified path whose subtree differs between `base` and
/// `current`, i.e. somebody else changed what this transaction touches.
pub(crate) fn find_conflict(
    base: &NormalizedNode,
    current: &NormalizedNode,
    modifications: &[Modification],
) -> Option<DataPath> {
    modifications
        .iter()
        .map(Modification::path)
        .find(|path| base.find(path) != current.find(path))
        .cloned()
}

fn update(
    node: Option<&NormalizedNode>,
    args: &[String],
    f: &mut dyn FnMut(Option<&NormalizedNode>) -> Option<NormalizedNode>,
) -> Option<NormalizedNode> {
    match args.split_first() {
        None => f(node),
        Some((head, rest)) => {
            // missing intermediate nodes, and leaves in the way, become containers
            let mut children = match node {
                Some(NormalizedNode::Container(children)) => children.clone(),
                _ => OrdMap::new(),
            };
            match update(children.get(head.as_str()), rest, f) {
                Some(child) => {
                    children.insert(head.clone(), child);
                }
                None => {
                    children.remove(head.as_str());
                }
            }
            Some(NormalizedNode::Container(children))
        }
    }
}
