use crate::expr::{AggFunc, BinaryOp, Expr, UnaryOp, WindowFunc};
use keel_core::{DataType, Scalar};

/// Index of an item in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(pub usize);

/// Append-only node storage. Trees are sets of [`Node`] references into it,
/// so copying a tree is a flat `Vec` clone.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: T) -> Node {
        self.items.push(item);
        Node(self.items.len() - 1)
    }

    pub fn get(&self, node: Node) -> &T {
        &self.items[node.0]
    }

    pub fn get_mut(&mut self, node: Node) -> &mut T {
        &mut self.items[node.0]
    }

    pub fn replace(&mut self, node: Node, item: T) -> T {
        std::mem::replace(&mut self.items[node.0], item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends every item of `other`, re-indexing its internal references
    /// with `remap`. Returns the offset applied to `other`'s nodes.
    pub fn append<F>(&mut self, other: &Arena<T>, remap: F) -> usize
    where
        T: Clone,
        F: Fn(&mut T, usize),
    {
        let offset = self.items.len();
        for item in &other.items {
            let mut item = item.clone();
            remap(&mut item, offset);
            self.items.push(item);
        }
        offset
    }
}

/// Arena form of [`Expr`]: children are [`Node`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum AExpr {
    Column(String),
    Literal(Scalar),
    Alias(Node, String),
    Unary { op: UnaryOp, input: Node },
    Binary { left: Node, op: BinaryOp, right: Node },
    Agg { func: AggFunc, input: Node },
    Window { func: WindowFunc, input: Node },
    Cast { input: Node, data_type: DataType },
    FillNull { input: Node, value: Scalar },
}

impl AExpr {
    /// Child nodes, left to right.
    pub fn inputs(&self) -> Vec<Node> {
        match self {
            AExpr::Column(_) | AExpr::Literal(_) => vec![],
            AExpr::Alias(input, _)
            | AExpr::Unary { input, .. }
            | AExpr::Agg { input, .. }
            | AExpr::Window { input, .. }
            | AExpr::Cast { input, .. }
            | AExpr::FillNull { input, .. } => vec![*input],
            AExpr::Binary { left, right, .. } => vec![*left, *right],
        }
    }

    pub(crate) fn shift(&mut self, offset: usize) {
        match self {
            AExpr::Column(_) | AExpr::Literal(_) => {}
            AExpr::Alias(input, _)
            | AExpr::Unary { input, .. }
            | AExpr::Agg { input, .. }
            | AExpr::Window { input, .. }
            | AExpr::Cast { input, .. }
            | AExpr::FillNull { input, .. } => input.0 += offset,
            AExpr::Binary { left, right, .. } => {
                left.0 += offset;
                right.0 += offset;
            }
        }
    }
}

/// Interns `expr` bottom-up; children always get lower indices than parents.
pub fn to_aexpr(expr: &Expr, arena: &mut Arena<AExpr>) -> Node {
    let node = match expr {
        Expr::Column(name) => AExpr::Column(name.clone()),
        Expr::Literal(value) => AExpr::Literal(value.clone()),
        Expr::Alias(input, name) => AExpr::Alias(to_aexpr(input, arena), name.clone()),
        Expr::Unary { op, input } => AExpr::Unary {
            op: *op,
            input: to_aexpr(input, arena),
        },
        Expr::Binary { left, op, right } => {
            let left = to_aexpr(left, arena);
            let right = to_aexpr(right, arena);
            AExpr::Binary {
                left,
                op: *op,
                right,
            }
        }
        Expr::Agg { func, input } => AExpr::Agg {
            func: *func,
            input: to_aexpr(input, arena),
        },
        Expr::Window { func, input } => AExpr::Window {
            func: func.clone(),
            input: to_aexpr(input, arena),
        },
        Expr::Cast { input, data_type } => AExpr::Cast {
            input: to_aexpr(input, arena),
            data_type: *data_type,
        },
        Expr::FillNull { input, value } => AExpr::FillNull {
            input: to_aexpr(input, arena),
            value: value.clone(),
        },
    };
    arena.add(node)
}

/// Rebuilds the tree rooted at `node`.
pub fn to_expr(node: Node, arena: &Arena<AExpr>) -> Expr {
    let boxed = |n: Node| Box::new(to_expr(n, arena));
    match arena.get(node) {
        AExpr::Column(name) => Expr::Column(name.clone()),
        AExpr::Literal(value) => Expr::Literal(value.clone()),
        AExpr::Alias(input, name) => Expr::Alias(boxed(*input), name.clone()),
        AExpr::Unary { op, input } => Expr::Unary {
            op: *op,
            input: boxed(*input),
        },
        AExpr::Binary { left, op, right } => Expr::Binary {
            left: boxed(*left),
            op: *op,
            right: boxed(*right),
        },
        AExpr::Agg { func, input } => Expr::Agg {
            func: *func,
            input: boxed(*input),
        },
        AExpr::Window { func, input } => Expr::Window {
            func: func.clone(),
            input: boxed(*input),
        },
        AExpr::Cast { input, data_type } => Expr::Cast {
            input: boxed(*input),
            data_type: *data_type,
        },
        AExpr::FillNull { input, value } => Expr::FillNull {
            input: boxed(*input),
            value: value.clone(),
        },
    }
}

/// Column names referenced under `node`, in first-reference order.
pub fn aexpr_columns(node: Node, arena: &Arena<AExpr>) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        let expr = arena.get(n);
        if let AExpr::Column(name) = expr {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        // Reverse so the left-most child is visited first.
        stack.extend(expr.inputs().into_iter().rev());
    }
    out
}

/// See [`Expr::output_name`].
pub fn aexpr_output_name(node: Node, arena: &Arena<AExpr>) -> String {
    match arena.get(node) {
        AExpr::Alias(_, name) => name.clone(),
        _ => aexpr_columns(node, arena)
            .into_iter()
            .next()
            .unwrap_or_else(|| "literal".to_string()),
    }
}

/// True if any node under `node` satisfies `pred`.
pub fn has_aexpr<F: Fn(&AExpr) -> bool>(node: Node, arena: &Arena<AExpr>, pred: F) -> bool {
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        let expr = arena.get(n);
        if pred(expr) {
            return true;
        }
        stack.extend(expr.inputs());
    }
    false
}

/// Expressions whose value depends on more than the current row.
pub fn is_row_dependent(node: Node, arena: &Arena<AExpr>) -> bool {
    has_aexpr(node, arena, |e| {
        matches!(e, AExpr::Agg { .. } | AExpr::Window { .. })
    })
}

/// `Some(name)` if `node` is a bare column reference.
pub fn as_column(node: Node, arena: &Arena<AExpr>) -> Option<&str> {
    match arena.get(node) {
        AExpr::Column(name) => Some(name),
        _ => None,
    }
}

/// Splits nested `&` into its conjuncts.
pub fn split_conjunction(node: Node, arena: &Arena<AExpr>) -> Vec<Node> {
    match arena.get(node) {
        AExpr::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut out = split_conjunction(*left, arena);
            out.extend(split_conjunction(*right, arena));
            out
        }
        _ => vec![node],
    }
}

/// Folds predicates back into one left-deep `&` chain.
pub fn combine_conjunction(predicates: &[Node], arena: &mut Arena<AExpr>) -> Option<Node> {
    let (first, rest) = predicates.split_first()?;
    Some(rest.iter().fold(*first, |acc, &p| {
        arena.add(AExpr::Binary {
            left: acc,
            op: BinaryOp::And,
            right: p,
        })
    }))
}
