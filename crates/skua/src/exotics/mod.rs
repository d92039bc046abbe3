//! Exotic object kinds: internal-method overrides for arrays, mapped
//! arguments, string objects, module namespaces, proxies and typed arrays.

pub(crate) mod arguments;
pub(crate) mod array;
pub(crate) mod namespace_object;
pub(crate) mod proxy;
pub(crate) mod string_object;
pub(crate) mod typed_array;
