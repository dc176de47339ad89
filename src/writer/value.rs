//! Values built against writer types.
//!
//! A [`TypedValue`] is immutable and cheap to clone. Two values are equal
//! when they have the same type and the same content, which is what the
//! constant pools key on.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::structure::TypeStructure;
use super::types::{Builtin, TypeHandle, TypeRegistry};
use crate::error::TypeRegistrationError;

/// Value of a builtin type.
#[derive(Debug, Clone)]
pub enum Scalar {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(Option<String>),
}

impl Scalar {
    pub fn builtin(&self) -> Builtin {
        match self {
            Scalar::Byte(_) => Builtin::Byte,
            Scalar::Char(_) => Builtin::Char,
            Scalar::Short(_) => Builtin::Short,
            Scalar::Int(_) => Builtin::Int,
            Scalar::Long(_) => Builtin::Long,
            Scalar::Float(_) => Builtin::Float,
            Scalar::Double(_) => Builtin::Double,
            Scalar::Boolean(_) => Builtin::Boolean,
            Scalar::String(_) => Builtin::String,
        }
    }

    /// Zero value of `builtin`, written for fields that were never set.
    pub fn default_for(builtin: Builtin) -> Self {
        match builtin {
            Builtin::Byte => Scalar::Byte(0),
            Builtin::Char => Scalar::Char('\0'),
            Builtin::Short => Scalar::Short(0),
            Builtin::Int => Scalar::Int(0),
            Builtin::Long => Scalar::Long(0),
            Builtin::Float => Scalar::Float(0.0),
            Builtin::Double => Scalar::Double(0.0),
            Builtin::Boolean => Scalar::Boolean(false),
            Builtin::String => Scalar::String(None),
        }
    }

    /// Convert to `target` when no information is lost.
    pub fn coerce(self, target: Builtin) -> Option<Scalar> {
        if self.builtin() == target {
            return Some(self);
        }
        let widened = match (self, target) {
            (Scalar::Byte(v), Builtin::Short) => Scalar::Short(v as i16),
            (Scalar::Byte(v), Builtin::Int) => Scalar::Int(v as i32),
            (Scalar::Byte(v), Builtin::Long) => Scalar::Long(v as i64),
            (Scalar::Short(v), Builtin::Int) => Scalar::Int(v as i32),
            (Scalar::Short(v), Builtin::Long) => Scalar::Long(v as i64),
            (Scalar::Int(v), Builtin::Long) => Scalar::Long(v as i64),
            (Scalar::Float(v), Builtin::Double) => Scalar::Double(v as f64),
            (Scalar::Char(c), Builtin::String) => Scalar::String(Some(c.to_string())),
            _ => return None,
        };
        Some(widened)
    }

    fn key(&self) -> (u8, u64, Option<&str>) {
        match self {
            Scalar::Byte(v) => (0, *v as u64, None),
            Scalar::Char(v) => (1, *v as u64, None),
            Scalar::Short(v) => (2, *v as u64, None),
            Scalar::Int(v) => (3, *v as u64, None),
            Scalar::Long(v) => (4, *v as u64, None),
            Scalar::Float(v) => (5, v.to_bits() as u64, None),
            Scalar::Double(v) => (6, v.to_bits(), None),
            Scalar::Boolean(v) => (7, *v as u64, None),
            Scalar::String(v) => (8, v.is_some() as u64, v.as_deref()),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

macro_rules! scalar_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Scalar {
            fn from(v: $t) -> Self {
                Scalar::$variant(v)
            }
        })*
    };
}

scalar_from!(
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    bool => Boolean,
);

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(Some(v.to_string()))
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(Some(v))
    }
}

impl From<Option<&str>> for Scalar {
    fn from(v: Option<&str>) -> Self {
        Scalar::String(v.map(str::to_string))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Single(TypedValue),
    Array(Vec<TypedValue>),
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum ValueData {
    Null,
    Scalar(Scalar),
    /// One slot per declared field; `None` for fields never set.
    Fields(Vec<Option<FieldValue>>),
}

#[derive(Debug)]
struct ValueInner {
    value_type: TypeHandle,
    structure: Option<Arc<TypeStructure>>,
    data: ValueData,
}

impl PartialEq for ValueInner {
    fn eq(&self, other: &Self) -> bool {
        self.value_type == other.value_type && self.data == other.data
    }
}

impl Eq for ValueInner {}

impl Hash for ValueInner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value_type.hash(state);
        self.data.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedValue(Arc<ValueInner>);

impl TypedValue {
    fn from_parts(value_type: TypeHandle, structure: Option<Arc<TypeStructure>>, data: ValueData) -> Self {
        TypedValue(Arc::new(ValueInner {
            value_type,
            structure,
            data,
        }))
    }

    pub fn value_type(&self) -> TypeHandle {
        self.0.value_type
    }

    pub fn is_null(&self) -> bool {
        matches!(self.0.data, ValueData::Null)
    }

    pub fn data(&self) -> &ValueData {
        &self.0.data
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match &self.0.data {
            ValueData::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Value of the named field, `None` when unset or not a struct.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        let index = self.0.structure.as_ref()?.field_index(name)?;
        match &self.0.data {
            ValueData::Fields(values) => values.get(index)?.as_ref(),
            _ => None,
        }
    }
}

impl TypeRegistry {
    /// Build a value of the custom type `handle`. Resolves the type first.
    pub fn new_value<F>(&mut self, handle: TypeHandle, build: F) -> Result<TypedValue, TypeRegistrationError>
    where
        F: FnOnce(&mut TypedValueBuilder<'_>),
    {
        let mut builder = TypedValueBuilder::new(self, handle)?;
        build(&mut builder);
        builder.finish()
    }

    pub fn scalar_value(&self, builtin: Builtin, value: impl Into<Scalar>) -> Result<TypedValue, TypeRegistrationError> {
        let scalar = value.into();
        let found = scalar.builtin();
        let scalar = scalar.coerce(builtin).ok_or_else(|| {
            TypeRegistrationError::illegal(format!(
                "{} value cannot be stored as {}",
                found.type_name(),
                builtin.type_name()
            ))
        })?;
        Ok(TypedValue::from_parts(self.builtin(builtin), None, ValueData::Scalar(scalar)))
    }

    /// The null value of `handle`, usable wherever a value of that type is.
    pub fn null_value(&mut self, handle: TypeHandle) -> Result<TypedValue, TypeRegistrationError> {
        if handle.index() >= self.len() {
            return Err(TypeRegistrationError::illegal("unknown type handle"));
        }
        self.resolve(handle)?;
        Ok(TypedValue::from_parts(handle, None, ValueData::Null))
    }
}

/// Collects field values for one struct value. The first error is kept and
/// returned when the value is finished.
pub struct TypedValueBuilder<'r> {
    registry: &'r mut TypeRegistry,
    value_type: TypeHandle,
    structure: Arc<TypeStructure>,
    values: Vec<Option<FieldValue>>,
    error: Option<TypeRegistrationError>,
}

impl<'r> TypedValueBuilder<'r> {
    fn new(registry: &'r mut TypeRegistry, value_type: TypeHandle) -> Result<Self, TypeRegistrationError> {
        if value_type.index() >= registry.len() {
            return Err(TypeRegistrationError::illegal("unknown type handle"));
        }
        if let Some(b) = registry.as_builtin(value_type) {
            return Err(TypeRegistrationError::illegal(format!(
                "{} is a builtin type, use a scalar value",
                b.type_name()
            )));
        }
        registry.resolve(value_type)?;
        let structure = registry.structure(value_type).cloned().ok_or_else(|| {
            TypeRegistrationError::Unresolved {
                type_name: registry.name(value_type).to_string(),
            }
        })?;
        Ok(Self {
            values: vec![None; structure.fields.len()],
            registry,
            value_type,
            structure,
            error: None,
        })
    }

    pub fn registry(&mut self) -> &mut TypeRegistry {
        self.registry
    }

    fn fail(&mut self, error: TypeRegistrationError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn incompatible(&self, field: &str, message: String) -> TypeRegistrationError {
        TypeRegistrationError::IncompatibleValue {
            type_name: self.registry.name(self.value_type).to_string(),
            field: field.to_string(),
            message,
        }
    }

    fn slot(&self, field: &str) -> Result<usize, TypeRegistrationError> {
        self.structure
            .field_index(field)
            .ok_or_else(|| TypeRegistrationError::UnknownField {
                type_name: self.registry.name(self.value_type).to_string(),
                field: field.to_string(),
            })
    }

    fn set(&mut self, field: &str, value: Result<FieldValue, TypeRegistrationError>) -> &mut Self {
        match value.and_then(|v| Ok((self.slot(field)?, v))) {
            Ok((index, v)) => self.values[index] = Some(v),
            Err(e) => self.fail(e),
        }
        self
    }

    fn check_value(&self, field: &str, value: &TypedValue) -> Result<(), TypeRegistrationError> {
        let index = self.slot(field)?;
        let declared = self.structure.fields[index].field_type;
        if value.value_type() != declared {
            return Err(self.incompatible(
                field,
                format!(
                    "expected {}, got {}",
                    self.registry.name(declared),
                    self.registry.name(value.value_type())
                ),
            ));
        }
        Ok(())
    }

    /// Set a builtin-typed field. Integers widen losslessly.
    pub fn put(&mut self, field: &str, value: impl Into<Scalar>) -> &mut Self {
        let value = self.scalar_for(field, value.into());
        self.set(field, value.map(FieldValue::Single))
    }

    fn scalar_for(&self, field: &str, scalar: Scalar) -> Result<TypedValue, TypeRegistrationError> {
        let index = self.slot(field)?;
        let declared = &self.structure.fields[index];
        if declared.is_array {
            return Err(self.incompatible(field, "field is an array".to_string()));
        }
        let Some(builtin) = self.registry.as_builtin(declared.field_type) else {
            return Err(self.incompatible(
                field,
                format!(
                    "{} is not a builtin type",
                    self.registry.name(declared.field_type)
                ),
            ));
        };
        let found = scalar.builtin();
        let scalar = scalar.coerce(builtin).ok_or_else(|| {
            self.incompatible(
                field,
                format!(
                    "{} value cannot be stored as {}",
                    found.type_name(),
                    builtin.type_name()
                ),
            )
        })?;
        Ok(TypedValue::from_parts(declared.field_type, None, ValueData::Scalar(scalar)))
    }

    /// Set a field to an already built value of the field's type.
    pub fn put_value(&mut self, field: &str, value: TypedValue) -> &mut Self {
        let checked = self.check_value(field, &value).and_then(|_| {
            if self.structure.fields[self.slot(field)?].is_array {
                return Err(self.incompatible(field, "field is an array".to_string()));
            }
            Ok(FieldValue::Single(value))
        });
        self.set(field, checked)
    }

    /// Build a nested struct value in place.
    pub fn put_struct<F>(&mut self, field: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut TypedValueBuilder<'_>),
    {
        let field_type = match self.slot(field) {
            Ok(index) => self.structure.fields[index].field_type,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        match self.registry.new_value(field_type, build) {
            Ok(value) => self.put_value(field, value),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    pub fn put_null(&mut self, field: &str) -> &mut Self {
        let value = self.slot(field).and_then(|index| {
            let declared = &self.structure.fields[index];
            if declared.is_array {
                return Ok(FieldValue::Array(Vec::new()));
            }
            Ok(FieldValue::Single(TypedValue::from_parts(
                declared.field_type,
                None,
                ValueData::Null,
            )))
        });
        self.set(field, value)
    }

    /// Set an array field. Every element must have the element type.
    pub fn put_array(&mut self, field: &str, values: Vec<TypedValue>) -> &mut Self {
        let checked = self.slot(field).and_then(|index| {
            if !self.structure.fields[index].is_array {
                return Err(self.incompatible(field, "field is not an array".to_string()));
            }
            for v in &values {
                self.check_value(field, v)?;
            }
            Ok(FieldValue::Array(values))
        });
        self.set(field, checked)
    }

    /// Set an array of builtin values.
    pub fn put_scalars<T: Into<Scalar>>(&mut self, field: &str, values: impl IntoIterator<Item = T>) -> &mut Self {
        let elements: Result<Vec<TypedValue>, TypeRegistrationError> = match self.slot(field) {
            Ok(index) => {
                let element_type = self.structure.fields[index].field_type;
                match self.registry.as_builtin(element_type) {
                    Some(builtin) => values
                        .into_iter()
                        .map(|v| self.registry.scalar_value(builtin, v))
                        .collect(),
                    None => Err(self.incompatible(field, "elements are not builtin".to_string())),
                }
            }
            Err(e) => Err(e),
        };
        match elements {
            Ok(elements) => self.put_array(field, elements),
            Err(e) => {
                self.fail(e);
                self
            }
        }
    }

    fn finish(self) -> Result<TypedValue, TypeRegistrationError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(TypedValue::from_parts(
            self.value_type,
            Some(self.structure),
            ValueData::Fields(self.values),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::FieldType;

    fn registry_with_point() -> (TypeRegistry, TypeHandle) {
        let mut registry = TypeRegistry::new(false);
        let point = registry
            .register_type("demo.Point", |b| {
                b.add_field("x", Builtin::Long)
                    .add_field("y", Builtin::Long)
                    .add_field("label", Builtin::String)
                    .add_field("next", FieldType::SelfType);
            })
            .unwrap();
        (registry, point)
    }

    #[test]
    fn test_equal_content_is_equal_value() {
        let (mut registry, point) = registry_with_point();
        let a = registry
            .new_value(point, |v| {
                v.put("x", 1i32).put("y", 2i64).put("label", "a");
            })
            .unwrap();
        let b = registry
            .new_value(point, |v| {
                v.put("x", 1i64).put("y", 2i64).put("label", "a");
            })
            .unwrap();
        assert_eq!(a, b);
        match a.field("x") {
            Some(FieldValue::Single(x)) => assert_eq!(x.scalar(), Some(&Scalar::Long(1))),
            other => panic!("unexpected {other:?}"),
        }
        assert!(a.field("next").is_none());
    }

    #[test]
    fn test_nested_self_values() {
        let (mut registry, point) = registry_with_point();
        let chained = registry
            .new_value(point, |v| {
                v.put("x", 1i64).put_struct("next", |n| {
                    n.put("x", 2i64).put_null("next");
                });
            })
            .unwrap();
        let Some(FieldValue::Single(next)) = chained.field("next") else {
            panic!("next not set");
        };
        assert_eq!(next.value_type(), point);
        let Some(FieldValue::Single(tail)) = next.field("next") else {
            panic!("tail not set");
        };
        assert!(tail.is_null());
    }

    #[test]
    fn test_value_errors() {
        let (mut registry, point) = registry_with_point();
        let err = registry
            .new_value(point, |v| {
                v.put("z", 1i64);
            })
            .unwrap_err();
        assert!(matches!(err, TypeRegistrationError::UnknownField { .. }));

        let err = registry
            .new_value(point, |v| {
                v.put("x", 1.5f64);
            })
            .unwrap_err();
        assert!(matches!(err, TypeRegistrationError::IncompatibleValue { .. }));

        // narrowing is not allowed
        assert!(registry.scalar_value(Builtin::Int, 5i64).is_err());
        assert!(registry.scalar_value(Builtin::Long, 5i8).is_ok());
        assert!(registry.new_value(registry.builtin(Builtin::Int), |_| {}).is_err());
    }

    #[test]
    fn test_value_of_type_under_construction() {
        let mut registry = TypeRegistry::new(false);
        let t = registry
            .register_type("demo.Eager", |b| {
                let me = b.self_type();
                let result = b.registry().new_value(me, |_| {});
                assert!(matches!(result, Err(TypeRegistrationError::Unresolved { .. })));
                b.add_field("x", Builtin::Int);
            })
            .unwrap();
        registry.resolve(t).unwrap();
    }

    #[test]
    fn test_arrays() {
        let mut registry = TypeRegistry::new(false);
        let t = registry
            .register_type("demo.Tags", |b| {
                b.add_field_with("tags", Builtin::String, |f| {
                    f.array();
                });
            })
            .unwrap();
        let v = registry
            .new_value(t, |v| {
                v.put_scalars("tags", ["a", "b"]);
            })
            .unwrap();
        let Some(FieldValue::Array(tags)) = v.field("tags") else {
            panic!("tags not set");
        };
        assert_eq!(tags.len(), 2);

        let err = registry
            .new_value(t, |v| {
                v.put("tags", "a");
            })
            .unwrap_err();
        assert!(matches!(err, TypeRegistrationError::IncompatibleValue { .. }));
    }
}
