// ABOUTME: Tree distance helpers used for label proximity and context-aware field disambiguation.
// ABOUTME: Distance is the number of parent steps from each node up to their lowest common ancestor, summed.

use std::collections::HashMap;

use crate::dom::tree::DocumentTree;

/// Steps from `a` and from `b` up to their lowest common ancestor, summed.
///
/// Equal nodes have distance 0, siblings 2, parent/child 1. Returns `None` if
/// the nodes share no ancestor (different trees).
pub fn lca_distance<T: DocumentTree>(tree: &T, a: T::Node, b: T::Node) -> Option<usize> {
    let mut steps_from_a: HashMap<T::Node, usize> = HashMap::new();
    steps_from_a.insert(a, 0);
    for (i, ancestor) in tree.ancestors(a).into_iter().enumerate() {
        steps_from_a.insert(ancestor, i + 1);
    }

    if let Some(&steps) = steps_from_a.get(&b) {
        return Some(steps);
    }
    for (j, ancestor) in tree.ancestors(b).into_iter().enumerate() {
        if let Some(&steps) = steps_from_a.get(&ancestor) {
            return Some(steps + j + 1);
        }
    }
    None
}

/// Parent steps from `descendant` up to `ancestor`, or `None` if `ancestor`
/// is not on the path.
pub fn steps_up<T: DocumentTree>(tree: &T, descendant: T::Node, ancestor: T::Node) -> Option<usize> {
    if descendant == ancestor {
        return Some(0);
    }
    tree.ancestors(descendant)
        .into_iter()
        .position(|n| n == ancestor)
        .map(|i| i + 1)
}

/// Document-order position of every element under (and including) the root.
pub fn document_positions<T: DocumentTree>(tree: &T) -> HashMap<T::Node, usize> {
    let root = tree.root();
    let mut positions = HashMap::new();
    positions.insert(root, 0);
    for (i, node) in tree.descendants(root).into_iter().enumerate() {
        positions.insert(node, i + 1);
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::html::HtmlTree;

    const HTML: &str = r#"
        <div id="c">
            <span id="label">Sponsored</span>
            <a id="sib">@near</a>
            <div id="d1"><div id="d2"><div id="d3"><a id="deep">@far</a></div></div></div>
        </div>
    "#;

    fn id(tree: &HtmlTree, css: &str) -> ego_tree::NodeId {
        tree.query(css).unwrap()[0]
    }

    #[test]
    fn test_sibling_distance_is_two() {
        let tree = HtmlTree::parse_fragment(HTML);
        let label = id(&tree, "#label");
        let sib = id(&tree, "#sib");
        assert_eq!(lca_distance(&tree, label, sib), Some(2));
        assert_eq!(lca_distance(&tree, label, label), Some(0));
    }

    #[test]
    fn test_nested_distance() {
        let tree = HtmlTree::parse_fragment(HTML);
        let label = id(&tree, "#label");
        let deep = id(&tree, "#deep");
        // label -> c (1), deep -> d3 -> d2 -> d1 -> c (4)
        assert_eq!(lca_distance(&tree, label, deep), Some(5));
    }

    #[test]
    fn test_ancestor_distance() {
        let tree = HtmlTree::parse_fragment(HTML);
        let c = id(&tree, "#c");
        let deep = id(&tree, "#deep");
        assert_eq!(lca_distance(&tree, c, deep), Some(4));
        assert_eq!(lca_distance(&tree, deep, c), Some(4));
        assert_eq!(steps_up(&tree, deep, c), Some(4));
        assert_eq!(steps_up(&tree, c, deep), None);
    }

    #[test]
    fn test_document_positions_follow_preorder() {
        let tree = HtmlTree::parse_fragment(HTML);
        let positions = document_positions(&tree);
        assert!(positions[&id(&tree, "#label")] < positions[&id(&tree, "#sib")]);
        assert!(positions[&id(&tree, "#d3")] < positions[&id(&tree, "#deep")]);
    }
}
