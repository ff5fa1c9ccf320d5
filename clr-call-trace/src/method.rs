//! Method identities and their resolution from function IDs

use log::warn;
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    sync::Arc,
};

/// Opaque runtime identifier of a method
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FunctionId(pub u64);
//
impl Display for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Human-readable identity of a method
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MethodInfo {
    /// Runtime identifier
    pub function_id: FunctionId,

    /// Name of the module (assembly file) that defines the method
    pub module_name: Box<str>,

    /// Fully qualified name of the declaring type
    pub type_name: Box<str>,

    /// Unqualified method name
    pub method_name: Box<str>,
}
//
impl MethodInfo {
    /// Describe a method
    pub fn new(
        function_id: FunctionId,
        module_name: impl Into<Box<str>>,
        type_name: impl Into<Box<str>>,
        method_name: impl Into<Box<str>>,
    ) -> Self {
        Self {
            function_id,
            module_name: module_name.into(),
            type_name: type_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Stand-in for a method whose identity could not be resolved
    pub fn placeholder(function_id: FunctionId) -> Self {
        Self::new(function_id, "", "", format!("<unknown {function_id}>"))
    }

    /// Truth that this is a placeholder for an unresolved method
    pub fn is_placeholder(&self) -> bool {
        self.module_name.is_empty() && self.type_name.is_empty()
    }

    /// Type-qualified method name, as in `Namespace.Type.Method`
    pub fn full_name(&self) -> String {
        if self.type_name.is_empty() {
            self.method_name.to_string()
        } else {
            format!("{}.{}", self.type_name, self.method_name)
        }
    }
}
//
impl Display for MethodInfo {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.full_name())?;
        if !self.module_name.is_empty() {
            write!(f, " [{}]", self.module_name)?;
        }
        Ok(())
    }
}

/// Mechanism for querying method identities from the target runtime
///
/// Used by [`MethodCache`] when a call event references a function ID that
/// no `MethodInfo` event has described.
pub trait MethodResolver {
    /// Look up the identity of a function ID, if possible
    fn resolve(&mut self, function_id: FunctionId) -> Option<MethodInfo>;
}
//
impl<F: FnMut(FunctionId) -> Option<MethodInfo>> MethodResolver for F {
    fn resolve(&mut self, function_id: FunctionId) -> Option<MethodInfo> {
        self(function_id)
    }
}

/// Resolver that never knows anything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoResolver;
//
impl MethodResolver for NoResolver {
    fn resolve(&mut self, _function_id: FunctionId) -> Option<MethodInfo> {
        None
    }
}

/// Function ID to method identity mapping
///
/// Identities are shared with the frames that reference them.
pub struct MethodCache {
    /// Known methods
    methods: HashMap<FunctionId, Arc<MethodInfo>>,

    /// Fallback for function IDs that were not announced
    resolver: Box<dyn MethodResolver + Send>,
}
//
impl MethodCache {
    /// Set up a cache without any fallback resolver
    pub fn new() -> Self {
        Self::with_resolver(NoResolver)
    }

    /// Set up a cache that queries `resolver` for unknown function IDs
    pub fn with_resolver(resolver: impl MethodResolver + Send + 'static) -> Self {
        Self {
            methods: HashMap::new(),
            resolver: Box::new(resolver),
        }
    }

    /// Record a method identity, replacing any previous one
    pub fn insert(&mut self, method: MethodInfo) -> Arc<MethodInfo> {
        let method = Arc::new(method);
        self.methods.insert(method.function_id, method.clone());
        method
    }

    /// Identity of a method, if known
    pub fn get(&self, function_id: FunctionId) -> Option<&Arc<MethodInfo>> {
        self.methods.get(&function_id)
    }

    /// Identity of a method, asking the resolver if needed
    ///
    /// If the resolver does not know the method either, a placeholder is
    /// recorded so that it is not queried again for this function ID.
    pub fn resolve(&mut self, function_id: FunctionId) -> Arc<MethodInfo> {
        if let Some(method) = self.methods.get(&function_id) {
            return method.clone();
        }
        let method = match self.resolver.resolve(function_id) {
            Some(mut method) => {
                method.function_id = function_id;
                method
            }
            None => {
                warn!("Could not resolve method with function ID {function_id}");
                MethodInfo::placeholder(function_id)
            }
        };
        self.insert(method)
    }

    /// Number of known methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Truth that no method is known
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Forget all known methods
    pub fn clear(&mut self) {
        self.methods.clear()
    }
}
//
impl Default for MethodCache {
    fn default() -> Self {
        Self::new()
    }
}
