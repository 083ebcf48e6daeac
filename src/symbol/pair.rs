use crate::symbol::abstract_symbol::AbstractSymbol;
use crate::symbol::concrete::ConcreteSymbol;
use serde::Serialize;
use std::fmt::{self, Display};

/// Inputs of one query and the outputs they produced, position by position.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OrderedPair<T> {
    pub inputs: Vec<T>,
    pub outputs: Vec<T>,
}

pub type AbstractOrderedPair = OrderedPair<AbstractSymbol>;
pub type ConcreteOrderedPair = OrderedPair<ConcreteSymbol>;

impl<T> OrderedPair<T> {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn push(&mut self, input: T, output: T) {
        self.inputs.push(input);
        self.outputs.push(output);
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl<T: Display> Display for OrderedPair<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let join = |symbols: &[T]| {
            symbols.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
        };
        write!(f, "([{}],[{}])", join(&self.inputs), join(&self.outputs))
    }
}
