//! Element type inference for flattening selectors.

use dynq_types::Type;

use crate::error::{Error, Result};

/// Element type produced by flattening a selector that returns `ty`.
///
/// Arrays yield their element type and single-argument generic containers
/// yield their type argument. `Any` stays `Any`. Anything else, such as a
/// two-argument map, cannot be flattened.
pub fn flatten_element_type(ty: &Type) -> Result<Type> {
    match ty {
        Type::Array(element) => Ok(element.as_ref().clone()),
        Type::Generic { args, .. } if args.len() == 1 => Ok(args[0].clone()),
        Type::Any => Ok(Type::Any),
        other => Err(Error::inference(format!(
            "cannot infer the element type of '{}': expected an array or a single-argument container",
            other
        ))),
    }
}
