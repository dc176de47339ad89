use super::annotation::Annotation;
use super::types::{Builtin, JdkType, TypeHandle, TypeRegistry};
use crate::error::TypeRegistrationError;

/// How a field names its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Builtin(Builtin),
    Type(TypeHandle),
    /// Looked up by name when the declaring type is built.
    Named(String),
    Predefined(JdkType),
    /// The type being declared.
    SelfType,
}

impl From<Builtin> for FieldType {
    fn from(b: Builtin) -> Self {
        FieldType::Builtin(b)
    }
}

impl From<TypeHandle> for FieldType {
    fn from(h: TypeHandle) -> Self {
        FieldType::Type(h)
    }
}

impl From<JdkType> for FieldType {
    fn from(t: JdkType) -> Self {
        FieldType::Predefined(t)
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        FieldType::Named(name.to_string())
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        FieldType::Named(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedField {
    pub name: String,
    pub field_type: TypeHandle,
    pub is_array: bool,
    pub annotations: Vec<Annotation>,
}

/// The resolved shape of a custom type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeStructure {
    pub fields: Vec<TypedField>,
    pub annotations: Vec<Annotation>,
}

impl TypeStructure {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Handed to a type's builder closure. Errors are collected and reported
/// when the build finishes, so calls can be chained.
pub struct TypeStructureBuilder<'r> {
    registry: &'r mut TypeRegistry,
    self_handle: TypeHandle,
    type_name: String,
    structure: TypeStructure,
    error: Option<TypeRegistrationError>,
}

impl<'r> TypeStructureBuilder<'r> {
    pub(crate) fn new(registry: &'r mut TypeRegistry, self_handle: TypeHandle, type_name: &str) -> Self {
        Self {
            registry,
            self_handle,
            type_name: type_name.to_string(),
            structure: TypeStructure::default(),
            error: None,
        }
    }

    /// Handle of the type being built, for self-referential fields.
    pub fn self_type(&self) -> TypeHandle {
        self.self_handle
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The registry, for registering types this one refers to.
    pub fn registry(&mut self) -> &mut TypeRegistry {
        self.registry
    }

    fn fail(&mut self, error: TypeRegistrationError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn resolve_field_type(&mut self, field_type: FieldType) -> Result<TypeHandle, TypeRegistrationError> {
        let handle = match field_type {
            FieldType::Builtin(b) => return Ok(self.registry.builtin(b)),
            FieldType::SelfType => return Ok(self.self_handle),
            FieldType::Type(h) => h,
            FieldType::Named(name) => self.registry.get_type(&name).ok_or_else(|| {
                TypeRegistrationError::illegal(format!(
                    "{} refers to unknown type {name}",
                    self.type_name
                ))
            })?,
            FieldType::Predefined(t) => self.registry.predefined(t)?,
        };
        if handle.index() >= self.registry.len() {
            return Err(TypeRegistrationError::illegal(format!(
                "type handle {} is not from this registry",
                handle.index()
            )));
        }
        self.registry.resolve_reference(handle)?;
        Ok(handle)
    }

    pub fn add_field(&mut self, name: &str, field_type: impl Into<FieldType>) -> &mut Self {
        self.add_field_with(name, field_type, |_| {})
    }

    /// Add a field and configure it, for arrays and field annotations.
    pub fn add_field_with<F>(&mut self, name: &str, field_type: impl Into<FieldType>, configure: F) -> &mut Self
    where
        F: FnOnce(&mut TypedFieldBuilder<'_>),
    {
        if self.structure.field_index(name).is_some() {
            let error = TypeRegistrationError::DuplicateField {
                type_name: self.type_name.clone(),
                field: name.to_string(),
            };
            self.fail(error);
            return self;
        }
        let field_type = match self.resolve_field_type(field_type.into()) {
            Ok(h) => h,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        let mut field = TypedFieldBuilder {
            registry: self.registry,
            is_array: false,
            annotations: Vec::new(),
            error: None,
        };
        configure(&mut field);
        let TypedFieldBuilder {
            is_array,
            annotations,
            error,
            ..
        } = field;
        match error {
            Some(e) => self.fail(e),
            None => self.structure.fields.push(TypedField {
                name: name.to_string(),
                field_type,
                is_array,
                annotations,
            }),
        }
        self
    }

    /// Annotate the type itself.
    pub fn add_annotation(&mut self, annotation_type: impl Into<FieldType>, value: Option<&str>) -> &mut Self {
        match annotation_for(self.registry, annotation_type.into(), value) {
            Ok(a) => self.structure.annotations.push(a),
            Err(e) => self.fail(e),
        }
        self
    }

    pub(crate) fn finish(self) -> Result<TypeStructure, TypeRegistrationError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.structure),
        }
    }
}

fn annotation_for(
    registry: &TypeRegistry,
    annotation_type: FieldType,
    value: Option<&str>,
) -> Result<Annotation, TypeRegistrationError> {
    let handle = match annotation_type {
        FieldType::Type(h) => h,
        FieldType::Named(name) => registry
            .get_type(&name)
            .ok_or_else(|| TypeRegistrationError::illegal(format!("unknown annotation type {name}")))?,
        other => {
            return Err(TypeRegistrationError::illegal(format!(
                "{other:?} cannot be an annotation"
            )))
        }
    };
    Annotation::new(registry, handle, value)
}

pub struct TypedFieldBuilder<'b> {
    registry: &'b TypeRegistry,
    is_array: bool,
    annotations: Vec<Annotation>,
    error: Option<TypeRegistrationError>,
}

impl TypedFieldBuilder<'_> {
    pub fn array(&mut self) -> &mut Self {
        self.is_array = true;
        self
    }

    pub fn add_annotation(&mut self, annotation_type: impl Into<FieldType>, value: Option<&str>) -> &mut Self {
        match annotation_for(self.registry, annotation_type.into(), value) {
            Ok(a) => self.annotations.push(a),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{LABEL, TIMESTAMP};

    #[test]
    fn test_self_referential_field() {
        let mut registry = TypeRegistry::new(false);
        let node = registry
            .register_type("demo.Node", |b| {
                b.add_field("value", Builtin::Int)
                    .add_field("next", FieldType::SelfType);
            })
            .unwrap();
        registry.resolve(node).unwrap();
        let structure = registry.structure(node).unwrap();
        assert_eq!(structure.fields[1].field_type, node);
        assert_eq!(structure.field_index("next"), Some(1));
    }

    #[test]
    fn test_field_annotations_and_arrays() {
        let mut registry = TypeRegistry::new(false);
        let t = registry
            .register_type("demo.Annotated", |b| {
                b.add_annotation(LABEL, Some("Annotated"))
                    .add_field_with("when", Builtin::Long, |f| {
                        f.add_annotation(TIMESTAMP, Some("TICKS"));
                    })
                    .add_field_with("tags", Builtin::String, |f| {
                        f.array();
                    });
            })
            .unwrap();
        registry.resolve(t).unwrap();
        let s = registry.structure(t).unwrap();
        assert_eq!(s.annotations[0].value(), Some("Annotated"));
        assert_eq!(s.fields[0].annotations.len(), 1);
        assert!(s.fields[1].is_array);
    }

    #[test]
    fn test_unknown_named_type_fails_build() {
        let mut registry = TypeRegistry::new(false);
        let t = registry
            .register_type("demo.Dangling", |b| {
                b.add_field("x", "demo.Missing");
            })
            .unwrap();
        let err = registry.resolve(t).unwrap_err();
        assert!(matches!(err, TypeRegistrationError::IllegalArgument { .. }));
    }

    #[test]
    fn test_non_annotation_type_rejected() {
        let mut registry = TypeRegistry::new(false);
        let plain = registry.register_type("demo.Plain", |_| {}).unwrap();
        let t = registry
            .register_type("demo.Misannotated", move |b| {
                b.add_annotation(plain, None);
            })
            .unwrap();
        assert!(matches!(
            registry.resolve(t),
            Err(TypeRegistrationError::IllegalArgument { .. })
        ));
    }
}
