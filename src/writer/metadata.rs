use super::annotation::Annotation;
use super::types::{TypeHandle, TypeRegistry};
use crate::parser::metadata::Element;

fn annotation_element(registry: &TypeRegistry, annotation: &Annotation) -> Element {
    let element = Element::new("annotation").attribute("class", registry.id(annotation.annotation_type()).to_string());
    match annotation.value() {
        Some(value) => element.attribute("value", value),
        None => element,
    }
}

fn class_element(registry: &TypeRegistry, handle: TypeHandle) -> Element {
    let mut class = Element::new("class")
        .attribute("name", registry.name(handle))
        .attribute("id", registry.id(handle).to_string());
    if let Some(super_type) = registry.super_type(handle) {
        class = class.attribute("superType", super_type);
    }
    let Some(structure) = registry.structure(handle) else {
        return class;
    };
    for annotation in &structure.annotations {
        class = class.child(annotation_element(registry, annotation));
    }
    for field in &structure.fields {
        let mut element = Element::new("field")
            .attribute("name", field.name.as_str())
            .attribute("class", registry.id(field.field_type).to_string());
        if field.is_array {
            element = element.attribute("dimension", "1");
        }
        if registry.uses_constant_pool(field.field_type) {
            element = element.attribute("constantPool", "true");
        }
        for annotation in &field.annotations {
            element = element.child(annotation_element(registry, annotation));
        }
        class = class.child(element);
    }
    class
}

/// Metadata tree describing `types`.
pub(crate) fn metadata_root(registry: &TypeRegistry, types: &[TypeHandle]) -> Element {
    let metadata = types
        .iter()
        .fold(Element::new("metadata"), |m, h| m.child(class_element(registry, *h)));
    Element::new("root")
        .child(metadata)
        .child(Element::new("region").attribute("locale", "en_US"))
}
