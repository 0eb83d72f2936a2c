//! Query Abstract Syntax Tree
//!
//! A parsed label query is a tree of boolean operators over leaf terms:
//!
//! ```text
//! (a AND (b OR c)) <2019        AND(AND(a, OR(b, c)), <20190101000000000)
//! !(a, b) >=2018                AND(NOT(OR(a, b)), >=20180101000000000)
//! @unlabeled                    UNLABELED
//! ()                            EMPTY
//! ```
//!
//! The `Display` form above is stable and used to compare parse results.

use std::fmt;

/// A node of a parsed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    And(Box<QueryNode>, Box<QueryNode>),
    Or(Box<QueryNode>, Box<QueryNode>),
    Not(Box<QueryNode>),
    /// Records carrying the named label
    Label(String),
    /// The single record with this id
    Id(u32),
    /// Records with a timestamp strictly before the bound
    DateLt(i64),
    /// Records with a timestamp at or before the bound
    DateLte(i64),
    /// Records with a timestamp strictly after the bound
    DateGt(i64),
    /// Records with a timestamp at or after the bound
    DateGte(i64),
    /// Records without any label
    Unlabeled,
    /// No condition; matches every record that has a timestamp
    Empty,
}

impl QueryNode {
    pub fn and(left: QueryNode, right: QueryNode) -> Self {
        QueryNode::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: QueryNode, right: QueryNode) -> Self {
        QueryNode::Or(Box::new(left), Box::new(right))
    }

    pub fn not(child: QueryNode) -> Self {
        QueryNode::Not(Box::new(child))
    }

    pub fn label(name: impl Into<String>) -> Self {
        QueryNode::Label(name.into())
    }

    /// Whether this node has children
    pub fn is_operator(&self) -> bool {
        matches!(self, QueryNode::And(..) | QueryNode::Or(..) | QueryNode::Not(_))
    }

    /// Label names referenced anywhere in the tree, in first-seen order
    pub fn labels(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            match node {
                QueryNode::And(l, r) | QueryNode::Or(l, r) => {
                    pending.push(&**r);
                    pending.push(&**l);
                }
                QueryNode::Not(child) => pending.push(&**child),
                QueryNode::Label(name) => {
                    if !names.contains(&name.as_str()) {
                        names.push(name.as_str());
                    }
                }
                _ => {}
            }
        }
        names
    }

    /// Operands of the chain of same-kind binary operators rooted here,
    /// leftmost first
    ///
    /// `AND(AND(a, b), c)` yields `[a, b, c]`. Any other node yields itself.
    /// Flat queries like `a b c ...` parse into chains as long as the query;
    /// tree walks iterate over these instead of recursing per operand.
    pub fn operands(&self) -> Vec<&QueryNode> {
        let mut operands = Vec::new();
        let mut node = self;
        loop {
            match (self, node) {
                (QueryNode::And(..), QueryNode::And(l, r))
                | (QueryNode::Or(..), QueryNode::Or(l, r)) => {
                    operands.push(&**r);
                    node = &**l;
                }
                _ => break,
            }
        }
        operands.push(node);
        operands.reverse();
        operands
    }

    /// Move the children out, leaving cheap placeholders behind
    fn take_children(&mut self, out: &mut Vec<QueryNode>) {
        match self {
            QueryNode::And(l, r) | QueryNode::Or(l, r) => {
                out.push(std::mem::replace(&mut **l, QueryNode::Empty));
                out.push(std::mem::replace(&mut **r, QueryNode::Empty));
            }
            QueryNode::Not(child) => out.push(std::mem::replace(&mut **child, QueryNode::Empty)),
            _ => {}
        }
    }
}

impl Drop for QueryNode {
    fn drop(&mut self) {
        // Tear deep trees down with a heap stack rather than the call stack
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut node) = pending.pop() {
            node.take_children(&mut pending);
        }
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::And(..) | QueryNode::Or(..) => {
                let name = if matches!(self, QueryNode::And(..)) { "AND" } else { "OR" };
                let operands = self.operands();
                for _ in 1..operands.len() {
                    write!(f, "{}(", name)?;
                }
                write!(f, "{}", operands[0])?;
                for operand in &operands[1..] {
                    write!(f, ", {})", operand)?;
                }
                Ok(())
            }
            QueryNode::Not(child) => write!(f, "NOT({})", child),
            QueryNode::Label(name) => write!(f, "{}", name),
            QueryNode::Id(id) => write!(f, "ID={}", id),
            QueryNode::DateLt(t) => write!(f, "<{}", t),
            QueryNode::DateLte(t) => write!(f, "<={}", t),
            QueryNode::DateGt(t) => write!(f, ">{}", t),
            QueryNode::DateGte(t) => write!(f, ">={}", t),
            QueryNode::Unlabeled => write!(f, "UNLABELED"),
            QueryNode::Empty => write!(f, "EMPTY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let node = QueryNode::and(
            QueryNode::not(QueryNode::or(QueryNode::label("a"), QueryNode::label("b"))),
            QueryNode::DateGte(2018_01_01_00_00_00_000),
        );
        assert_eq!(node.to_string(), "AND(NOT(OR(a, b)), >=20180101000000000)");

        assert_eq!(QueryNode::Id(12).to_string(), "ID=12");
        assert_eq!(QueryNode::DateLt(5).to_string(), "<5");
        assert_eq!(QueryNode::DateLte(5).to_string(), "<=5");
        assert_eq!(QueryNode::DateGt(5).to_string(), ">5");
        assert_eq!(QueryNode::Unlabeled.to_string(), "UNLABELED");
        assert_eq!(QueryNode::Empty.to_string(), "EMPTY");
    }

    #[test]
    fn test_labels() {
        let node = QueryNode::or(
            QueryNode::and(QueryNode::label("a"), QueryNode::label("b")),
            QueryNode::not(QueryNode::label("a")),
        );
        assert_eq!(node.labels(), vec!["a", "b"]);
        assert!(node.is_operator());
        assert!(!QueryNode::Empty.is_operator());
        assert!(QueryNode::Unlabeled.labels().is_empty());
    }

    #[test]
    fn test_operands() {
        let chain = QueryNode::and(
            QueryNode::and(QueryNode::label("a"), QueryNode::label("b")),
            QueryNode::or(QueryNode::label("c"), QueryNode::label("d")),
        );
        let operands: Vec<String> = chain.operands().iter().map(|n| n.to_string()).collect();
        assert_eq!(operands, vec!["a", "b", "OR(c, d)"]);
        assert_eq!(chain.to_string(), "AND(AND(a, b), OR(c, d))");
        assert_eq!(QueryNode::Id(1).operands(), vec![&QueryNode::Id(1)]);
    }

    #[test]
    fn test_long_chain() {
        let mut node = QueryNode::Id(0);
        for i in 1..100_000 {
            node = QueryNode::or(node, QueryNode::Id(i));
        }
        assert_eq!(node.operands().len(), 100_000);
        assert_eq!(node.labels(), Vec::<&str>::new());

        let text = node.to_string();
        assert!(text.starts_with("OR(OR(OR("));
        assert!(text.contains("(ID=0, ID=1), ID=2), ID=3)"));
        assert!(text.ends_with(", ID=99999)"));
        drop(node);
    }
}
