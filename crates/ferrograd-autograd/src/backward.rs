//! Reverse-mode gradient computation.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use ferrograd_tensor::{Element, Tensor, TensorError};

use crate::error::GradError;
use crate::loss::softmax_cross_entropy_grad;
use crate::var::{NodeId, Op, Var};

impl<T: Element> Var<T> {
    /// Runs the backward pass from a scalar output, seeding it with a gradient of one.
    ///
    /// Gradients are added to whatever each node already holds; call
    /// [`Var::zero_grad`] between passes to start from zero.
    ///
    /// # Errors
    ///
    /// Returns [`GradError::NotScalarOutput`] if the output holds more than one element, or
    /// the first tensor fault raised while propagating.
    pub fn backward(&self) -> Result<(), GradError> {
        if !self.value().is_scalar_like() {
            return Err(GradError::NotScalarOutput {
                shape: self.value().shape().to_vec(),
            });
        }
        self.backward_with(Tensor::ones(self.value().shape())?)
    }

    /// Runs the backward pass with an explicit gradient for this output.
    ///
    /// `seed` must have the same shape as the value.
    pub fn backward_with(&self, seed: Tensor<T>) -> Result<(), GradError> {
        if seed.shape() != self.value().shape() {
            return Err(TensorError::DimensionMismatch {
                message: "backward seed must match the output shape".to_string(),
                expected: format!("{:?}", self.value().shape()),
                actual: format!("{:?}", seed.shape()),
            }
            .into());
        }
        if !self.requires_grad() {
            log::debug!("backward from {:?}: no tracked inputs", self.id());
            return Ok(());
        }

        let order = topological_sort(self);
        log::debug!("backward from {:?} over {} nodes", self.id(), order.len());

        let mut adjoints: HashMap<NodeId, Tensor<T>> = HashMap::new();
        adjoints.insert(self.id(), seed);

        for node in order.iter().rev() {
            let Some(grad) = adjoints.remove(&node.id()) else {
                continue;
            };
            let local = local_gradients(node, &grad)?;
            node.accumulate(grad)?;

            for (child, child_grad) in node.children().iter().zip(local) {
                let Some(child_grad) = child_grad else {
                    continue;
                };
                match adjoints.entry(child.id()) {
                    Entry::Occupied(mut entry) => {
                        let sum = entry.get().add(&child_grad, None)?;
                        entry.insert(sum);
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(child_grad);
                    }
                }
            }
        }
        Ok(())
    }

    fn accumulate(&self, grad: Tensor<T>) -> Result<(), TensorError> {
        let mut slot = self.grad_slot();
        let next = match slot.as_ref() {
            Some(prev) => prev.add(&grad, None)?,
            None => grad,
        };
        *slot = Some(next);
        Ok(())
    }
}

/// Topological sort via DFS postorder: every node comes after all of its children.
fn topological_sort<T: Element>(root: &Var<T>) -> Vec<Var<T>> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();

    fn dfs<T: Element>(node: &Var<T>, visited: &mut HashSet<NodeId>, order: &mut Vec<Var<T>>) {
        if !node.requires_grad() || !visited.insert(node.id()) {
            return;
        }
        for child in node.children() {
            dfs(child, visited, order);
        }
        order.push(node.clone());
    }

    dfs(root, &mut visited, &mut order);
    order
}

/// Sums `grad` back down to `shape`, undoing a broadcast.
///
/// Leading axes that broadcasting prepended are summed away, then every axis the operand
/// held with extent 1 is summed with `keep_dims`.
pub(crate) fn unbroadcast<T: Element>(
    grad: Tensor<T>,
    shape: &[usize],
) -> Result<Tensor<T>, TensorError> {
    if grad.shape() == shape {
        return Ok(grad);
    }
    let mut g = grad;
    while g.rank() > shape.len() {
        g = g.sum_along_axis(0, false)?;
    }
    for (axis, &dim) in shape.iter().enumerate() {
        if dim == 1 && g.shape().get(axis).is_some_and(|&d| d != 1) {
            g = g.sum_along_axis(axis, true)?;
        }
    }
    g.reshape(shape)
}

fn scalar<T: Element>(v: f64) -> Tensor<T> {
    Tensor::scalar(T::from_f64(v))
}

/// Gradient of each child of `node`, given the gradient flowing into `node`.
///
/// Children that do not require a gradient get `None`.
fn local_gradients<T: Element>(
    node: &Var<T>,
    grad: &Tensor<T>,
) -> Result<Vec<Option<Tensor<T>>>, TensorError> {
    let children = node.children();
    let out = node.value();
    let wants = |i: usize| children.get(i).is_some_and(Var::requires_grad);

    let mut grads = vec![None; children.len()];
    match node.op() {
        Op::Constant | Op::Variable => {}
        Op::Neg => {
            grads[0] = Some(grad.neg(None)?);
        }
        Op::Exp => {
            grads[0] = Some(grad.mul(out, None)?);
        }
        Op::Ln => {
            grads[0] = Some(grad.div(children[0].value(), None)?);
        }
        Op::Sigmoid => {
            let slope = out.mul(&scalar::<T>(1.0).sub(out, None)?, None)?;
            grads[0] = Some(grad.mul(&slope, None)?);
        }
        Op::Relu => {
            let zero = T::from_f64(0.0);
            let one = T::from_f64(1.0);
            let mask = children[0]
                .value()
                .apply(move |x| if x > zero { one } else { zero }, None)?;
            grads[0] = Some(grad.mul(&mask, None)?);
        }
        Op::Add => {
            for (i, child) in children.iter().enumerate() {
                if wants(i) {
                    grads[i] = Some(unbroadcast(grad.clone(), child.value().shape())?);
                }
            }
        }
        Op::Sub => {
            let (a, b) = (children[0].value(), children[1].value());
            if wants(0) {
                grads[0] = Some(unbroadcast(grad.clone(), a.shape())?);
            }
            if wants(1) {
                grads[1] = Some(unbroadcast(grad.neg(None)?, b.shape())?);
            }
        }
        Op::Mul => {
            let (a, b) = (children[0].value(), children[1].value());
            if wants(0) {
                grads[0] = Some(unbroadcast(grad.mul(b, None)?, a.shape())?);
            }
            if wants(1) {
                grads[1] = Some(unbroadcast(grad.mul(a, None)?, b.shape())?);
            }
        }
        Op::Div => {
            let (a, b) = (children[0].value(), children[1].value());
            if wants(0) {
                grads[0] = Some(unbroadcast(grad.div(b, None)?, a.shape())?);
            }
            if wants(1) {
                // d(a/b)/db = -a / b^2
                let num = grad.mul(a, None)?.neg(None)?;
                let g = num.div(&b.mul(b, None)?, None)?;
                grads[1] = Some(unbroadcast(g, b.shape())?);
            }
        }
        Op::Pow => {
            let (a, b) = (children[0].value(), children[1].value());
            if wants(0) {
                let reduced = a.pow(&b.sub(&scalar(1.0), None)?, None)?;
                let g = grad.mul(b, None)?.mul(&reduced, None)?;
                grads[0] = Some(unbroadcast(g, a.shape())?);
            }
            if wants(1) {
                let g = grad.mul(out, None)?.mul(&a.ln(None)?, None)?;
                grads[1] = Some(unbroadcast(g, b.shape())?);
            }
        }
        Op::MatMul => {
            let (a, b) = (children[0].value(), children[1].value());
            if wants(0) {
                grads[0] = Some(grad.matmul(&b.transpose()?)?);
            }
            if wants(1) {
                grads[1] = Some(a.transpose()?.matmul(grad)?);
            }
        }
        Op::Sum => {
            let shape = children[0].value().shape();
            grads[0] = Some(Tensor::ones(shape)?.mul(grad, None)?);
        }
        Op::Mean => {
            let input = children[0].value();
            let share = T::from_f64(1.0 / input.numel() as f64);
            grads[0] = Some(Tensor::full(input.shape(), share)?.mul(grad, None)?);
        }
        Op::Mse => {
            let (pred, target) = (children[0].value(), children[1].value());
            let diff = pred.sub(target, None)?;
            let scale = scalar(2.0 / diff.numel() as f64);
            let g = diff.mul(&scale, None)?.mul(grad, None)?;
            if wants(1) {
                grads[1] = Some(unbroadcast(g.neg(None)?, target.shape())?);
            }
            if wants(0) {
                grads[0] = Some(unbroadcast(g, pred.shape())?);
            }
        }
        Op::SoftmaxCrossEntropy => {
            let (logits, target) = (children[0].value(), children[1].value());
            grads[0] = Some(softmax_cross_entropy_grad(logits, target, grad)?);
        }
    }

    for (i, slot) in grads.iter_mut().enumerate() {
        if !wants(i) {
            *slot = None;
        }
    }
    Ok(grads)
}
