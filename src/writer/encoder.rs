use anyhow::{bail, Result};

use super::constant_pool::WriterConstantPools;
use super::structure::TypedField;
use super::types::{TypeHandle, TypeRegistry};
use super::value::{FieldValue, Scalar, TypedValue, ValueData};
use crate::leb128::Leb128Writer;

/// Inline structs nest at most this deep, which also stops a null inline
/// self-referential field from expanding forever.
const MAX_INLINE_DEPTH: usize = 32;

/// Payload of an event record: the class id, then every field.
pub(crate) fn write_event(
    registry: &TypeRegistry,
    pools: &mut WriterConstantPools,
    event: &TypedValue,
    w: &mut Leb128Writer,
) -> Result<()> {
    w.write_long(registry.id(event.value_type()));
    write_struct(registry, pools, event, w)
}

/// All fields of a struct value in declaration order.
pub(crate) fn write_struct(
    registry: &TypeRegistry,
    pools: &mut WriterConstantPools,
    value: &TypedValue,
    w: &mut Leb128Writer,
) -> Result<()> {
    write_fields(registry, pools, value.value_type(), Some(value), w, 0)
}

fn write_fields(
    registry: &TypeRegistry,
    pools: &mut WriterConstantPools,
    handle: TypeHandle,
    value: Option<&TypedValue>,
    w: &mut Leb128Writer,
    depth: usize,
) -> Result<()> {
    if depth > MAX_INLINE_DEPTH {
        bail!("{} nests inline values too deeply", registry.name(handle));
    }
    let Some(structure) = registry.structure(handle) else {
        bail!("{} is not resolved", registry.name(handle));
    };
    let slots = match value.map(TypedValue::data) {
        Some(ValueData::Fields(slots)) => Some(slots.as_slice()),
        _ => None,
    };
    for (i, field) in structure.fields.iter().enumerate() {
        let field_value = slots.and_then(|s| s.get(i)).and_then(Option::as_ref);
        write_field(registry, pools, field, field_value, w, depth)?;
    }
    Ok(())
}

fn write_field(
    registry: &TypeRegistry,
    pools: &mut WriterConstantPools,
    field: &TypedField,
    value: Option<&FieldValue>,
    w: &mut Leb128Writer,
    depth: usize,
) -> Result<()> {
    if field.is_array {
        let elements: &[TypedValue] = match value {
            Some(FieldValue::Array(elements)) => elements,
            _ => &[],
        };
        w.write_int(elements.len() as i32);
        for element in elements {
            write_single(registry, pools, field.field_type, Some(element), w, depth)?;
        }
        return Ok(());
    }
    let single = match value {
        Some(FieldValue::Single(v)) => Some(v),
        _ => None,
    };
    write_single(registry, pools, field.field_type, single, w, depth)
}

fn write_single(
    registry: &TypeRegistry,
    pools: &mut WriterConstantPools,
    handle: TypeHandle,
    value: Option<&TypedValue>,
    w: &mut Leb128Writer,
    depth: usize,
) -> Result<()> {
    if let Some(builtin) = registry.as_builtin(handle) {
        match value.and_then(TypedValue::scalar) {
            Some(scalar) => write_scalar(scalar, w),
            None => write_scalar(&Scalar::default_for(builtin), w),
        }
        return Ok(());
    }
    if registry.uses_constant_pool(handle) {
        let index = value.map_or(0, |v| pools.add(v));
        w.write_long(index);
        return Ok(());
    }
    let value = value.filter(|v| !v.is_null());
    write_fields(registry, pools, handle, value, w, depth + 1)
}

fn write_scalar(scalar: &Scalar, w: &mut Leb128Writer) {
    match scalar {
        Scalar::Byte(v) => w.write_u8(*v as u8),
        Scalar::Char(c) => {
            let mut units = [0u16; 2];
            w.write_long(c.encode_utf16(&mut units)[0] as i64)
        }
        Scalar::Short(v) => w.write_long(*v as i64),
        Scalar::Int(v) => w.write_int(*v),
        Scalar::Long(v) => w.write_long(*v),
        Scalar::Float(v) => w.write_f32(*v),
        Scalar::Double(v) => w.write_f64(*v),
        Scalar::Boolean(v) => w.write_bool(*v),
        Scalar::String(s) => w.write_string(s.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leb128::{DataInput, RawString};
    use crate::writer::{Builtin, FieldType};

    #[test]
    fn test_unset_fields_write_defaults() {
        let mut registry = TypeRegistry::new(false);
        let t = registry
            .register_type("demo.Sparse", |b| {
                b.add_field("a", Builtin::Int)
                    .add_field("b", Builtin::String)
                    .add_field("c", Builtin::Long);
            })
            .unwrap();
        let value = registry
            .new_value(t, |v| {
                v.put("c", 300i64);
            })
            .unwrap();
        let mut pools = WriterConstantPools::new();
        let mut w = Leb128Writer::new();
        write_struct(&registry, &mut pools, &value, &mut w).unwrap();

        let mut input = DataInput::new(w.as_slice(), true);
        assert_eq!(input.read_int().unwrap(), 0);
        assert_eq!(input.read_string().unwrap(), RawString::Null);
        assert_eq!(input.read_long().unwrap(), 300);
        assert_eq!(input.position(), w.len());
    }

    #[test]
    fn test_inline_self_reference_is_bounded() {
        let mut registry = TypeRegistry::new(false);
        let t = registry
            .get_or_add("demo.Inline", None, false, |b| {
                b.add_field("next", FieldType::SelfType);
            })
            .unwrap();
        let value = registry.new_value(t, |_| {}).unwrap();
        let mut pools = WriterConstantPools::new();
        let mut w = Leb128Writer::new();
        assert!(write_struct(&registry, &mut pools, &value, &mut w).is_err());
    }
}
