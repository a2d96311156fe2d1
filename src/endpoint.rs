//! Read-only descriptions of client endpoints and the arguments of one call.

use crate::types::Type;
use std::sync::Arc;

/// Where a parameter's value goes in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Path,
    Query,
    Header,
    Body,
    /// Receives the result asynchronously instead of contributing to the request.
    Callback,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    name: String,
    position: usize,
    ty: Type,
    kind: ParameterKind,
}

impl Parameter {
    pub fn new(name: impl Into<String>, position: usize, ty: Type, kind: ParameterKind) -> Self {
        Self { name: name.into(), position, ty, kind }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }
}

/// Metadata of one declared endpoint.
///
/// Adapters key their decisions on [`Endpoint::return_type`]. When an adapter hands off to the
/// next stage it describes that stage with [`Endpoint::returns`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    name: Arc<str>,
    return_type: Type,
    parameters: Arc<[Parameter]>,
}

impl Endpoint {
    pub fn new(name: impl AsRef<str>, return_type: Type) -> Self {
        Self { name: Arc::from(name.as_ref()), return_type, parameters: Arc::from(Vec::new()) }
    }

    /// Append a parameter.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        let mut parameters = self.parameters.to_vec();
        parameters.push(parameter);
        self.parameters = Arc::from(parameters);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Parameters receiving the result through a callback.
    pub fn callbacks(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.kind == ParameterKind::Callback)
    }

    /// The same endpoint declaring a different return type.
    pub fn returns(&self, return_type: Type) -> Endpoint {
        Endpoint { name: self.name.clone(), return_type, parameters: self.parameters.clone() }
    }
}

/// Arguments of one call, shared by every stage of its pipeline.
#[derive(Debug, Clone)]
pub struct Arguments {
    values: Arc<[serde_json::Value]>,
}

impl Arguments {
    pub fn new(values: Vec<serde_json::Value>) -> Self {
        Self { values: Arc::from(values) }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn get(&self, position: usize) -> Option<&serde_json::Value> {
        self.values.get(position)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, serde_json::Value> {
        self.values.iter()
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Self::empty()
    }
}
