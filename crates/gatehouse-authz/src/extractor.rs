//! Resource path extraction from request messages
//!
//! The engine never inspects message types directly. Each request type that
//! carries resource identifiers implements [`ResourceFieldExtractor`] (by
//! hand, or generated alongside the protobuf code).

use crate::rbac::ResourceInfo;

/// Value found at a request field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    /// No such field (or the index is out of range)
    #[default]
    Missing,
    /// Singular value rendered as a string
    Scalar(String),
    /// Repeated field; one resource per element
    List(Vec<String>),
}

/// Capability to read resource identifiers out of a request message
pub trait ResourceFieldExtractor: Send + Sync {
    /// Value of the field with number `index`
    ///
    /// When `field` is set, the indexed field is a message and the value of
    /// its sub-field with that name is returned instead.
    fn field_value(&self, index: u32, field: Option<&str>) -> FieldValue;
}

/// Messages without resource fields
impl ResourceFieldExtractor for () {
    fn field_value(&self, _index: u32, _field: Option<&str>) -> FieldValue {
        FieldValue::Missing
    }
}

impl<T: ResourceFieldExtractor + ?Sized> ResourceFieldExtractor for &T {
    fn field_value(&self, index: u32, field: Option<&str>) -> FieldValue {
        (**self).field_value(index, field)
    }
}

/// Bind each descriptor to the path read from `request`
///
/// A list-valued field expands into one bound descriptor per element (an
/// empty list yields none). Missing fields bind an empty path. Paths are
/// percent-decoded; undecodable values are kept verbatim.
pub fn bind_resources(
    infos: &[ResourceInfo],
    request: &dyn ResourceFieldExtractor,
) -> Vec<ResourceInfo> {
    let mut bound = Vec::with_capacity(infos.len());
    for info in infos {
        match request.field_value(info.index, info.field.as_deref()) {
            FieldValue::Missing => bound.push(info.bound(String::new())),
            FieldValue::Scalar(value) => bound.push(info.bound(decode_path(&value))),
            FieldValue::List(values) => {
                bound.extend(values.iter().map(|v| info.bound(decode_path(v))));
            }
        }
    }
    bound
}

fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
