use super::HandlerError;
use crate::model::{ParamKind, Parameter};

/// Positional action parameters as seen by a handler.
///
/// The acting entity is passed separately, so index 0 is the first
/// parameter the agent supplied.
#[derive(Clone, Copy, Debug)]
pub struct Args<'a> {
    params: &'a [Parameter],
}

impl<'a> Args<'a> {
    pub fn new(params: &'a [Parameter]) -> Self {
        Self { params }
    }

    pub fn get(&self, index: usize) -> Result<&'a Parameter, HandlerError> {
        self.params.get(index).ok_or(HandlerError::Argument {
            index,
            expected: ParamKind::Any,
            found: None,
        })
    }

    pub fn ident(&self, index: usize) -> Result<&'a str, HandlerError> {
        match self.get(index)? {
            Parameter::Identifier(s) => Ok(s.as_str()),
            other => Err(mismatch(index, ParamKind::Identifier, other)),
        }
    }

    pub fn number(&self, index: usize) -> Result<f64, HandlerError> {
        match self.get(index)? {
            Parameter::Numeral(n) => Ok(*n),
            other => Err(mismatch(index, ParamKind::Numeral, other)),
        }
    }

    pub fn truth(&self, index: usize) -> Result<bool, HandlerError> {
        match self.get(index)? {
            Parameter::Truth(b) => Ok(*b),
            other => Err(mismatch(index, ParamKind::Truth, other)),
        }
    }

    pub fn list(&self, index: usize) -> Result<&'a [Parameter], HandlerError> {
        match self.get(index)? {
            Parameter::List(items) => Ok(items.as_slice()),
            other => Err(mismatch(index, ParamKind::List, other)),
        }
    }

    /// Function term as `(name, params)`
    pub fn function(&self, index: usize) -> Result<(&'a str, Args<'a>), HandlerError> {
        match self.get(index)? {
            Parameter::Function { name, params } => Ok((name.as_str(), Args::new(params))),
            other => Err(mismatch(index, ParamKind::Function, other)),
        }
    }
}

fn mismatch(index: usize, expected: ParamKind, found: &Parameter) -> HandlerError {
    HandlerError::Argument {
        index,
        expected,
        found: Some(found.kind()),
    }
}
