use super::types::{TypeHandle, TypeRegistry};
use crate::error::TypeRegistrationError;

/// An annotation attached to a type or a field, with an optional value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Annotation {
    annotation_type: TypeHandle,
    value: Option<String>,
}

impl Annotation {
    /// Fails unless `annotation_type` has the annotation marker as its
    /// supertype.
    pub fn new(
        registry: &TypeRegistry,
        annotation_type: TypeHandle,
        value: Option<&str>,
    ) -> Result<Self, TypeRegistrationError> {
        if annotation_type.index() >= registry.len() || !registry.is_annotation_type(annotation_type) {
            let name = if annotation_type.index() < registry.len() {
                registry.name(annotation_type).to_string()
            } else {
                format!("#{}", annotation_type.index())
            };
            return Err(TypeRegistrationError::illegal(format!(
                "{name} is not an annotation type"
            )));
        }
        Ok(Self {
            annotation_type,
            value: value.map(str::to_string),
        })
    }

    pub fn annotation_type(&self) -> TypeHandle {
        self.annotation_type
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DESCRIPTION, EXPERIMENTAL};
    use crate::writer::Builtin;

    #[test]
    fn test_annotation_requires_annotation_type() {
        let mut registry = TypeRegistry::new(false);
        let description = registry.get_type(DESCRIPTION).unwrap();
        let a = Annotation::new(&registry, description, Some("what it is")).unwrap();
        assert_eq!(a.value(), Some("what it is"));
        assert_eq!(a.annotation_type(), description);

        let experimental = registry.get_type(EXPERIMENTAL).unwrap();
        assert_eq!(Annotation::new(&registry, experimental, None).unwrap().value(), None);

        let custom = registry
            .register_annotation_type("demo.Marker", |_| {})
            .unwrap();
        assert!(Annotation::new(&registry, custom, None).is_ok());

        let long = registry.builtin(Builtin::Long);
        let err = Annotation::new(&registry, long, None).unwrap_err();
        assert_eq!(err.to_string(), "illegal argument: long is not an annotation type");
    }
}
