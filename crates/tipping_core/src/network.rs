//! Directed network of tipping elements.
//!
//! Nodes are identified by their insertion index. Each ordered pair of
//! nodes carries at most one coupling. The network is the vector field
//! handed to the evolvers: `f(x, t)` sums each node's local rate with the
//! coupling terms of its incoming edges, `jac(x, t)` assembles the matching
//! dense Jacobian.

use crate::coupling::Coupling;
use crate::element::{Element, ElementKind};
use crate::error::{Result, TippingError};
use crate::traits::{CouplingDynamics, DynamicalSystem, JacobianSystem, LocalDynamics};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub coupling: Coupling,
}

/// Plain description of a network: elements in id order plus edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub elements: Vec<Element>,
    pub couplings: Vec<Edge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "NetworkSpec", try_from = "NetworkSpec")]
pub struct TippingNetwork {
    elements: Vec<Element>,
    edges: Vec<Edge>,
    /// Edge ids grouped by destination node.
    incoming: Vec<Vec<usize>>,
    /// Edge ids grouped by source node.
    outgoing: Vec<Vec<usize>>,
}

impl TippingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a network from a node list and an edge list, failing on the
    /// first invalid edge.
    pub fn from_parts(elements: Vec<Element>, couplings: Vec<Edge>) -> Result<Self> {
        let mut net = Self::new();
        for element in elements {
            net.add_element(element);
        }
        for edge in couplings {
            net.add_coupling(edge.from, edge.to, edge.coupling)?;
        }
        Ok(net)
    }

    /// Appends a node and returns its id.
    pub fn add_element(&mut self, element: impl Into<Element>) -> usize {
        let id = self.elements.len();
        self.elements.push(element.into());
        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        id
    }

    /// Adds the directed coupling `from -> to` and returns its edge id.
    pub fn add_coupling(&mut self, from: usize, to: usize, coupling: Coupling) -> Result<usize> {
        self.check_node(from)?;
        self.check_node(to)?;
        if self.edge_id(from, to).is_some() {
            return Err(TippingError::DuplicateCoupling { from, to });
        }
        let coupling = coupling.bind(&self.elements[from], &self.elements[to], (from, to))?;

        let id = self.edges.len();
        self.edges.push(Edge { from, to, coupling });
        self.incoming[to].push(id);
        self.outgoing[from].push(id);
        Ok(id)
    }

    pub fn node_count(&self) -> usize {
        self.elements.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn element(&self, id: usize) -> Result<&Element> {
        self.check_node(id)?;
        Ok(&self.elements[id])
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn coupling(&self, from: usize, to: usize) -> Option<&Coupling> {
        self.edge_id(from, to).map(|id| &self.edges[id].coupling)
    }

    /// Sources and couplings of the edges ending at `id`.
    pub fn incoming(&self, id: usize) -> impl Iterator<Item = (usize, &Coupling)> + '_ {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&e| (self.edges[e].from, &self.edges[e].coupling))
    }

    /// Targets and couplings of the edges starting at `id`.
    pub fn outgoing(&self, id: usize) -> impl Iterator<Item = (usize, &Coupling)> + '_ {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&e| (self.edges[e].to, &self.edges[e].coupling))
    }

    pub fn node_kinds(&self) -> Vec<ElementKind> {
        self.elements.iter().map(Element::kind).collect()
    }

    /// Current value of every node's control parameter.
    pub fn controls(&self) -> Vec<f64> {
        self.elements.iter().map(Element::control).collect()
    }

    /// Vector field `dx/dt` at `(x, t)`.
    pub fn f(&self, x: &[f64], t: f64) -> Result<Vec<f64>> {
        self.check_state(x)?;
        let mut out = vec![0.0; x.len()];
        self.apply(t, x, &mut out);
        Ok(out)
    }

    /// Dense Jacobian at `(x, t)`; entry `[to, from]` holds the off-diagonal
    /// coupling derivative.
    pub fn jac(&self, x: &[f64], t: f64) -> Result<DMatrix<f64>> {
        self.check_state(x)?;
        Ok(self.jacobian(t, x))
    }

    pub fn get_tip_states(&self, x: &[f64]) -> Result<Vec<bool>> {
        self.check_state(x)?;
        Ok(self
            .elements
            .iter()
            .zip(x)
            .map(|(e, &xi)| e.is_tipped(xi))
            .collect())
    }

    pub fn number_tipped(&self, x: &[f64]) -> Result<usize> {
        Ok(self.get_tip_states(x)?.into_iter().filter(|&b| b).count())
    }

    pub fn get_param(&self, node: usize, key: &str) -> Result<f64> {
        self.element(node)?.get_param(key)
    }

    /// Replaces node `node`'s parameter and re-binds every coupling touching
    /// it. Nothing changes if any step fails.
    pub fn set_param(&mut self, node: usize, key: &str, value: f64) -> Result<()> {
        let element = self.element(node)?.with_param(key, value)?;
        self.replace_element(node, element)
    }

    /// Moves node `node`'s control parameter (`c` or `rho`) to `value`.
    pub fn set_control(&mut self, node: usize, value: f64) -> Result<()> {
        let element = self.element(node)?.with_control(value)?;
        self.replace_element(node, element)
    }

    fn replace_element(&mut self, node: usize, element: Element) -> Result<()> {
        let mut rebound = Vec::new();
        for &e in self.incoming[node].iter().chain(&self.outgoing[node]) {
            let edge = &self.edges[e];
            let from = if edge.from == node { &element } else { &self.elements[edge.from] };
            let to = if edge.to == node { &element } else { &self.elements[edge.to] };
            rebound.push((e, edge.coupling.bind(from, to, (edge.from, edge.to))?));
        }
        self.elements[node] = element;
        for (e, coupling) in rebound {
            self.edges[e].coupling = coupling;
        }
        Ok(())
    }

    /// Number of nodes reachable from `from` along directed edges, not
    /// counting `from` itself.
    pub fn out_component_size(&self, from: usize) -> Result<usize> {
        self.check_node(from)?;
        let mut seen = vec![false; self.node_count()];
        let mut queue = VecDeque::from([from]);
        seen[from] = true;
        let mut count = 0;
        while let Some(node) = queue.pop_front() {
            for (next, _) in self.outgoing(node) {
                if !seen[next] {
                    seen[next] = true;
                    count += 1;
                    queue.push_back(next);
                }
            }
        }
        Ok(count)
    }

    /// True when every element has a cubic form and every coupling is
    /// linear in its source, which is what the semi-implicit stochastic
    /// scheme requires.
    pub fn is_cubic_linear(&self) -> bool {
        self.elements.iter().all(|e| e.cubic_form().is_some())
            && self.edges.iter().all(|e| e.coupling.is_linear())
    }

    fn edge_id(&self, from: usize, to: usize) -> Option<usize> {
        self.outgoing
            .get(from)?
            .iter()
            .copied()
            .find(|&e| self.edges[e].to == to)
    }

    fn check_node(&self, id: usize) -> Result<()> {
        if id < self.elements.len() {
            Ok(())
        } else {
            Err(TippingError::UnknownNode {
                id,
                len: self.elements.len(),
            })
        }
    }

    pub(crate) fn check_state(&self, x: &[f64]) -> Result<()> {
        if x.len() == self.elements.len() {
            Ok(())
        } else {
            Err(TippingError::DimensionMismatch {
                expected: self.elements.len(),
                actual: x.len(),
            })
        }
    }
}

impl DynamicalSystem<f64> for TippingNetwork {
    fn dimension(&self) -> usize {
        self.elements.len()
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        for (i, element) in self.elements.iter().enumerate() {
            out[i] = element.rate(t, x[i]);
        }
        for edge in &self.edges {
            out[edge.to] += edge.coupling.coupling(t, x[edge.from], x[edge.to]);
        }
    }
}

impl JacobianSystem for TippingNetwork {
    fn jacobian(&self, t: f64, x: &[f64]) -> DMatrix<f64> {
        let n = self.elements.len();
        let mut jac = DMatrix::zeros(n, n);
        for (i, element) in self.elements.iter().enumerate() {
            jac[(i, i)] = element.d_rate(t, x[i]);
        }
        for edge in &self.edges {
            let (x_from, x_to) = (x[edge.from], x[edge.to]);
            jac[(edge.to, edge.from)] += edge.coupling.d_from(t, x_from, x_to);
            jac[(edge.to, edge.to)] += edge.coupling.d_to(t, x_from, x_to);
        }
        jac
    }
}

impl From<TippingNetwork> for NetworkSpec {
    fn from(value: TippingNetwork) -> Self {
        NetworkSpec {
            elements: value.elements,
            couplings: value.edges,
        }
    }
}

impl TryFrom<NetworkSpec> for TippingNetwork {
    type Error = TippingError;

    fn try_from(value: NetworkSpec) -> Result<Self> {
        TippingNetwork::from_parts(value.elements, value.couplings)
    }
}
