//! Computation graph nodes.
//!
//! A [`Var`] is a cheap handle to a shared node. Every operation on variables computes its
//! value eagerly with the tensor engine and records the operands as children, so the graph
//! is complete as soon as the output exists and [`Var::backward`] only walks it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ferrograd_tensor::{Element, Tensor};

use crate::error::GradError;

static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_node_id() -> NodeId {
    NodeId(NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Unique identifier of a node in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// The operation that produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Leaf that never receives a gradient.
    Constant,
    /// Leaf whose gradient is tracked.
    Variable,
    /// `-a`
    Neg,
    /// `exp(a)`
    Exp,
    /// `ln(a)`
    Ln,
    /// Logistic function.
    Sigmoid,
    /// Rectifier.
    Relu,
    /// `a + b` under broadcasting.
    Add,
    /// `a - b` under broadcasting.
    Sub,
    /// `a * b` under broadcasting.
    Mul,
    /// `a / b` under broadcasting.
    Div,
    /// `a ^ b` under broadcasting.
    Pow,
    /// Matrix product of two rank-2 operands.
    MatMul,
    /// Sum of all elements.
    Sum,
    /// Mean of all elements.
    Mean,
    /// Mean squared error between a prediction and a target.
    Mse,
    /// Mean cross-entropy of row-wise softmax logits against class indices.
    SoftmaxCrossEntropy,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Constant => "constant",
            Op::Variable => "variable",
            Op::Neg => "neg",
            Op::Exp => "exp",
            Op::Ln => "ln",
            Op::Sigmoid => "sigmoid",
            Op::Relu => "relu",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Pow => "pow",
            Op::MatMul => "matmul",
            Op::Sum => "sum",
            Op::Mean => "mean",
            Op::Mse => "mse",
            Op::SoftmaxCrossEntropy => "softmax_cross_entropy",
        }
    }
}

struct VarNode<T: Element> {
    id: NodeId,
    op: Op,
    alias: String,
    value: Tensor<T>,
    grad: Mutex<Option<Tensor<T>>>,
    children: Vec<Var<T>>,
    requires_grad: bool,
}

/// A tensor value tracked by the computation graph.
///
/// Cloning a `Var` clones the handle; both clones refer to the same node, value and
/// gradient slot.
///
/// # Example
///
/// ```rust
/// use ferrograd_autograd::{GradError, Var};
/// use ferrograd_tensor::Tensor;
///
/// # fn main() -> Result<(), GradError> {
/// let a = Var::variable(Tensor::<f64>::scalar(4.0))?;
/// let b = Var::variable(Tensor::<f64>::scalar(5.0))?;
/// let c = a.mul(&b)?;
/// c.backward()?;
/// assert_eq!(a.grad().map(|g| g.to_vec()), Some(vec![5.0]));
/// assert_eq!(b.grad().map(|g| g.to_vec()), Some(vec![4.0]));
/// # Ok(())
/// # }
/// ```
pub struct Var<T: Element>(Arc<VarNode<T>>);

impl<T: Element> Clone for Var<T> {
    fn clone(&self) -> Self {
        Var(Arc::clone(&self.0))
    }
}

impl<T: Element> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.0.id)
            .field("op", &self.0.op)
            .field("alias", &self.0.alias)
            .field("shape", &self.0.value.shape())
            .field("requires_grad", &self.0.requires_grad)
            .finish()
    }
}

impl<T: Element> Var<T> {
    fn leaf(value: Tensor<T>, op: Op, alias: String, requires_grad: bool) -> Self {
        Var(Arc::new(VarNode {
            id: next_node_id(),
            op,
            alias,
            value,
            grad: Mutex::new(None),
            children: Vec::new(),
            requires_grad,
        }))
    }

    /// Creates a leaf whose gradient is tracked.
    ///
    /// # Errors
    ///
    /// Returns [`GradError::IntegerGradient`] for integer element types.
    pub fn variable(value: Tensor<T>) -> Result<Self, GradError> {
        Self::named_variable(Op::Variable.name(), value)
    }

    /// Creates a tracked leaf with a user-facing alias, e.g. `"w"` or `"bias"`.
    pub fn named_variable(alias: impl Into<String>, value: Tensor<T>) -> Result<Self, GradError> {
        if !T::IS_FLOAT {
            return Err(GradError::IntegerGradient(T::DTYPE));
        }
        Ok(Self::leaf(value, Op::Variable, alias.into(), true))
    }

    /// Creates a leaf that never receives a gradient. Any element type is accepted.
    pub fn constant(value: Tensor<T>) -> Self {
        Self::leaf(value, Op::Constant, Op::Constant.name().to_string(), false)
    }

    pub(crate) fn from_op(op: Op, value: Tensor<T>, children: Vec<Var<T>>) -> Self {
        let requires_grad = children.iter().any(Var::requires_grad);
        Var(Arc::new(VarNode {
            id: next_node_id(),
            op,
            alias: op.name().to_string(),
            value,
            grad: Mutex::new(None),
            children,
            requires_grad,
        }))
    }

    /// Identifier of this node.
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    /// The operation that produced this node.
    pub fn op(&self) -> Op {
        self.0.op
    }

    /// The alias given at construction, or the operation name for interior nodes.
    pub fn alias(&self) -> &str {
        &self.0.alias
    }

    /// The forward value.
    ///
    /// The returned tensor shares storage with the node, so in-place updates such as
    /// [`Tensor::gradient_step`] change the value seen by the graph.
    pub fn value(&self) -> &Tensor<T> {
        &self.0.value
    }

    /// The operands this node was computed from.
    pub fn children(&self) -> &[Var<T>] {
        &self.0.children
    }

    /// Whether a gradient flows into this node.
    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// The accumulated gradient, or `None` before any backward pass reached this node.
    pub fn grad(&self) -> Option<Tensor<T>> {
        self.grad_slot().clone()
    }

    /// Clears the accumulated gradient.
    pub fn zero_grad(&self) {
        *self.grad_slot() = None;
    }

    pub(crate) fn grad_slot(&self) -> MutexGuard<'_, Option<Tensor<T>>> {
        self.0
            .grad
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unary(&self, op: Op, value: Tensor<T>) -> Self {
        Self::from_op(op, value, vec![self.clone()])
    }

    fn binary(&self, other: &Var<T>, op: Op, value: Tensor<T>) -> Self {
        Self::from_op(op, value, vec![self.clone(), other.clone()])
    }

    /// `-self`
    pub fn neg(&self) -> Result<Self, GradError> {
        Ok(self.unary(Op::Neg, self.value().neg(None)?))
    }

    /// `exp(self)`
    pub fn exp(&self) -> Result<Self, GradError> {
        Ok(self.unary(Op::Exp, self.value().exp(None)?))
    }

    /// `ln(self)`
    pub fn ln(&self) -> Result<Self, GradError> {
        Ok(self.unary(Op::Ln, self.value().ln(None)?))
    }

    /// Elementwise logistic function.
    pub fn sigmoid(&self) -> Result<Self, GradError> {
        Ok(self.unary(Op::Sigmoid, self.value().sigmoid(None)?))
    }

    /// Elementwise rectifier.
    pub fn relu(&self) -> Result<Self, GradError> {
        Ok(self.unary(Op::Relu, self.value().relu(None)?))
    }

    /// Elementwise sum under broadcasting.
    pub fn add(&self, other: &Var<T>) -> Result<Self, GradError> {
        Ok(self.binary(other, Op::Add, self.value().add(other.value(), None)?))
    }

    /// Elementwise difference under broadcasting.
    pub fn sub(&self, other: &Var<T>) -> Result<Self, GradError> {
        Ok(self.binary(other, Op::Sub, self.value().sub(other.value(), None)?))
    }

    /// Elementwise product under broadcasting.
    pub fn mul(&self, other: &Var<T>) -> Result<Self, GradError> {
        Ok(self.binary(other, Op::Mul, self.value().mul(other.value(), None)?))
    }

    /// Elementwise quotient under broadcasting.
    pub fn div(&self, other: &Var<T>) -> Result<Self, GradError> {
        Ok(self.binary(other, Op::Div, self.value().div(other.value(), None)?))
    }

    /// Elementwise power under broadcasting.
    pub fn pow(&self, other: &Var<T>) -> Result<Self, GradError> {
        Ok(self.binary(other, Op::Pow, self.value().pow(other.value(), None)?))
    }

    /// Matrix product.
    pub fn matmul(&self, other: &Var<T>) -> Result<Self, GradError> {
        Ok(self.binary(other, Op::MatMul, self.value().matmul(other.value())?))
    }

    /// Sum of all elements, as a `(1,)` node.
    pub fn sum(&self) -> Result<Self, GradError> {
        Ok(self.unary(Op::Sum, self.value().sum(false)?))
    }

    /// Mean of all elements, as a `(1,)` node.
    pub fn mean(&self) -> Result<Self, GradError> {
        Ok(self.unary(Op::Mean, self.value().mean(false)?))
    }
}
