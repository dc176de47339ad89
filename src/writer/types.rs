//! The writer's type registry.
//!
//! Types live in an arena indexed by [`TypeHandle`]. Registering a custom
//! type only records its name and a builder closure; the closure runs the
//! first time the type is needed, either because a value of it is built or
//! because another type declares a field of it. That way types can refer to
//! each other in any declaration order, and a type can refer to itself
//! through [`TypeStructureBuilder::self_type`].
//!
//! A type goes `Pending -> Building -> Resolved`, or ends up `Failed` when
//! its builder reports an error. A failed type is dropped from the name
//! index so it can be registered again; resolved types are never touched.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::annotation::Annotation;
use super::structure::{FieldType, TypeStructure, TypeStructureBuilder};
use crate::constants::*;
use crate::error::TypeRegistrationError;

/// First class id handed out. Lower ids are kept clear of the record type
/// ids of metadata and checkpoint records.
const FIRST_TYPE_ID: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeHandle(usize);

impl TypeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Builtin {
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    String,
}

impl Builtin {
    /// In registration order, so `ALL[i]` has handle `i`.
    pub const ALL: [Builtin; 9] = [
        Builtin::Byte,
        Builtin::Char,
        Builtin::Short,
        Builtin::Int,
        Builtin::Long,
        Builtin::Float,
        Builtin::Double,
        Builtin::Boolean,
        Builtin::String,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            Builtin::Byte => "byte",
            Builtin::Char => "char",
            Builtin::Short => "short",
            Builtin::Int => "int",
            Builtin::Long => "long",
            Builtin::Float => "float",
            Builtin::Double => "double",
            Builtin::Boolean => "boolean",
            Builtin::String => STRING_CLASS,
        }
    }

    pub fn of_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.type_name() == name)
    }
}

/// Types the runtime predefines, registered when a recording asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JdkType {
    ThreadGroup,
    Thread,
    Symbol,
    ClassLoader,
    Module,
    Package,
    Class,
    Method,
    FrameType,
    StackFrame,
    StackTrace,
}

impl JdkType {
    pub const ALL: [JdkType; 11] = [
        JdkType::ThreadGroup,
        JdkType::Thread,
        JdkType::Symbol,
        JdkType::ClassLoader,
        JdkType::Module,
        JdkType::Package,
        JdkType::Class,
        JdkType::Method,
        JdkType::FrameType,
        JdkType::StackFrame,
        JdkType::StackTrace,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            JdkType::ThreadGroup => "jdk.types.ThreadGroup",
            JdkType::Thread => "java.lang.Thread",
            JdkType::Symbol => "jdk.types.Symbol",
            JdkType::ClassLoader => "jdk.types.ClassLoader",
            JdkType::Module => "jdk.types.Module",
            JdkType::Package => "jdk.types.Package",
            JdkType::Class => "java.lang.Class",
            JdkType::Method => "jdk.types.Method",
            JdkType::FrameType => "jdk.types.FrameType",
            JdkType::StackFrame => "jdk.types.StackFrame",
            JdkType::StackTrace => "jdk.types.StackTrace",
        }
    }
}

pub type TypeBuilderFn = Box<dyn FnOnce(&mut TypeStructureBuilder<'_>) + Send>;

fn builder<F>(f: F) -> TypeBuilderFn
where
    F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
{
    Box::new(f)
}

enum TypeState {
    Builtin(Builtin),
    Pending(TypeBuilderFn),
    Building,
    Resolved(Arc<TypeStructure>),
    Failed(String),
}

impl fmt::Debug for TypeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeState::Builtin(b) => write!(f, "Builtin({b:?})"),
            TypeState::Pending(_) => write!(f, "Pending"),
            TypeState::Building => write!(f, "Building"),
            TypeState::Resolved(s) => write!(f, "Resolved({} fields)", s.fields.len()),
            TypeState::Failed(msg) => write!(f, "Failed({msg})"),
        }
    }
}

#[derive(Debug)]
struct TypeDef {
    name: String,
    id: i64,
    super_type: Option<String>,
    uses_constant_pool: bool,
    state: TypeState,
}

#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<TypeDef>,
    by_name: HashMap<String, TypeHandle>,
    jdk_types: bool,
}

impl TypeRegistry {
    pub fn new(initialize_jdk_types: bool) -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
            jdk_types: false,
        };
        for builtin in Builtin::ALL {
            registry.push(builtin.type_name(), None, false, TypeState::Builtin(builtin));
        }
        registry.register_annotation_types();
        if initialize_jdk_types {
            registry.register_jdk_types();
            registry.jdk_types = true;
        }
        registry
    }

    fn push(&mut self, name: &str, super_type: Option<&str>, uses_constant_pool: bool, state: TypeState) -> TypeHandle {
        let handle = TypeHandle(self.types.len());
        self.types.push(TypeDef {
            name: name.to_string(),
            id: FIRST_TYPE_ID + handle.0 as i64,
            super_type: super_type.map(str::to_string),
            uses_constant_pool,
            state,
        });
        self.by_name.insert(name.to_string(), handle);
        handle
    }

    fn register_annotation_types(&mut self) {
        for name in [LABEL, DESCRIPTION, CATEGORY, TIMESTAMP, TIMESPAN, NAME] {
            let with_value = builder(|b| {
                b.add_field("value", Builtin::String);
            });
            self.push(name, Some(ANNOTATION_SUPER_TYPE), false, TypeState::Pending(with_value));
        }
        for name in [EXPERIMENTAL, UNSIGNED, CONTENT_TYPE] {
            self.push(name, Some(ANNOTATION_SUPER_TYPE), false, TypeState::Pending(builder(|_| {})));
        }
    }

    fn register_jdk_types(&mut self) {
        use JdkType::*;
        let symbol = FieldType::Predefined(Symbol);
        let defs: [(JdkType, bool, TypeBuilderFn); 11] = [
            (
                ThreadGroup,
                true,
                builder(|b| {
                    let me = b.self_type();
                    b.add_field("parent", me).add_field("name", Builtin::String);
                }),
            ),
            (
                Thread,
                true,
                builder(|b| {
                    b.add_field("osName", Builtin::String)
                        .add_field("osThreadId", Builtin::Long)
                        .add_field("javaName", Builtin::String)
                        .add_field("javaThreadId", Builtin::Long)
                        .add_field("group", ThreadGroup);
                }),
            ),
            (
                Symbol,
                true,
                builder(|b| {
                    b.add_field("string", Builtin::String);
                }),
            ),
            (ClassLoader, true, {
                let symbol = symbol.clone();
                builder(move |b| {
                    b.add_field("type", Class).add_field("name", symbol);
                })
            }),
            (Module, true, {
                let symbol = symbol.clone();
                builder(move |b| {
                    b.add_field("name", symbol.clone())
                        .add_field("version", symbol.clone())
                        .add_field("location", symbol)
                        .add_field("classLoader", ClassLoader);
                })
            }),
            (Package, true, {
                let symbol = symbol.clone();
                builder(move |b| {
                    b.add_field("name", symbol)
                        .add_field("module", Module)
                        .add_field("exported", Builtin::Boolean);
                })
            }),
            (Class, true, {
                let symbol = symbol.clone();
                builder(move |b| {
                    b.add_field("classLoader", ClassLoader)
                        .add_field("name", symbol)
                        .add_field("package", Package)
                        .add_field("modifiers", Builtin::Int)
                        .add_field("hidden", Builtin::Boolean);
                })
            }),
            (Method, true, {
                let symbol = symbol.clone();
                builder(move |b| {
                    b.add_field("type", Class)
                        .add_field("name", symbol.clone())
                        .add_field("descriptor", symbol)
                        .add_field("modifiers", Builtin::Int)
                        .add_field("hidden", Builtin::Boolean);
                })
            }),
            (
                FrameType,
                true,
                builder(|b| {
                    b.add_field("description", Builtin::String);
                }),
            ),
            // frames are stored inline in their stack trace
            (
                StackFrame,
                false,
                builder(|b| {
                    b.add_field("method", Method)
                        .add_field("lineNumber", Builtin::Int)
                        .add_field("bytecodeIndex", Builtin::Int)
                        .add_field("type", FrameType);
                }),
            ),
            (
                StackTrace,
                true,
                builder(|b| {
                    b.add_field("truncated", Builtin::Boolean)
                        .add_field_with("frames", StackFrame, |f| {
                            f.array();
                        });
                }),
            ),
        ];
        for (jdk_type, uses_constant_pool, builder) in defs {
            self.push(
                jdk_type.type_name(),
                None,
                uses_constant_pool,
                TypeState::Pending(builder),
            );
        }
    }

    /// Return the type registered as `name`, or register a new one whose
    /// structure `builder` defines the first time the type is needed.
    pub fn get_or_add<F>(
        &mut self,
        name: &str,
        super_type: Option<&str>,
        uses_constant_pool: bool,
        builder: F,
    ) -> Result<TypeHandle, TypeRegistrationError>
    where
        F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
    {
        if name.is_empty() {
            return Err(TypeRegistrationError::illegal("empty type name"));
        }
        if let Some(handle) = self.by_name.get(name) {
            return Ok(*handle);
        }
        if super_type == Some(name) {
            return Err(TypeRegistrationError::illegal(format!(
                "{name} cannot be its own supertype"
            )));
        }
        Ok(self.push(
            name,
            super_type,
            uses_constant_pool,
            TypeState::Pending(self::builder(builder)),
        ))
    }

    /// Register an event type. Events carry an implicit `startTime` field in
    /// ticks, plus `eventThread` and `stackTrace` when the JDK types exist.
    pub fn register_event_type<F>(&mut self, name: &str, builder: F) -> Result<TypeHandle, TypeRegistrationError>
    where
        F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
    {
        let jdk_types = self.jdk_types;
        self.get_or_add(name, Some(EVENT_SUPER_TYPE), false, move |b| {
            b.add_field_with("startTime", Builtin::Long, |f| {
                f.add_annotation(TIMESTAMP, Some(TIMESTAMP_TICKS));
            });
            if jdk_types {
                b.add_field("eventThread", JdkType::Thread)
                    .add_field("stackTrace", JdkType::StackTrace);
            }
            builder(b);
        })
    }

    pub fn register_annotation_type<F>(&mut self, name: &str, builder: F) -> Result<TypeHandle, TypeRegistrationError>
    where
        F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
    {
        self.get_or_add(name, Some(ANNOTATION_SUPER_TYPE), false, builder)
    }

    /// Register a plain structured type, stored in the constant pool.
    pub fn register_type<F>(&mut self, name: &str, builder: F) -> Result<TypeHandle, TypeRegistrationError>
    where
        F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
    {
        self.get_or_add(name, None, true, builder)
    }

    pub fn builtin(&self, builtin: Builtin) -> TypeHandle {
        TypeHandle(builtin as usize)
    }

    pub fn get_type(&self, name: &str) -> Option<TypeHandle> {
        self.by_name.get(name).copied()
    }

    pub fn predefined(&self, jdk_type: JdkType) -> Result<TypeHandle, TypeRegistrationError> {
        if !self.jdk_types {
            return Err(TypeRegistrationError::illegal(format!(
                "{} requested but JDK types were not initialized",
                jdk_type.type_name()
            )));
        }
        self.get_type(jdk_type.type_name()).ok_or_else(|| {
            TypeRegistrationError::illegal(format!("{} is not registered", jdk_type.type_name()))
        })
    }

    pub fn has_jdk_types(&self) -> bool {
        self.jdk_types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn name(&self, handle: TypeHandle) -> &str {
        &self.types[handle.0].name
    }

    /// Class id written to chunk metadata.
    pub fn id(&self, handle: TypeHandle) -> i64 {
        self.types[handle.0].id
    }

    pub fn super_type(&self, handle: TypeHandle) -> Option<&str> {
        self.types[handle.0].super_type.as_deref()
    }

    pub fn uses_constant_pool(&self, handle: TypeHandle) -> bool {
        self.types[handle.0].uses_constant_pool
    }

    pub fn as_builtin(&self, handle: TypeHandle) -> Option<Builtin> {
        match self.types[handle.0].state {
            TypeState::Builtin(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_resolved(&self, handle: TypeHandle) -> bool {
        matches!(
            self.types[handle.0].state,
            TypeState::Builtin(_) | TypeState::Resolved(_)
        )
    }

    pub fn is_pending(&self, handle: TypeHandle) -> bool {
        matches!(self.types[handle.0].state, TypeState::Pending(_))
    }

    fn is_building(&self, handle: TypeHandle) -> bool {
        matches!(self.types[handle.0].state, TypeState::Building)
    }

    fn has_super_type(&self, handle: TypeHandle, marker: &str) -> bool {
        let mut current = handle;
        for _ in 0..self.types.len() {
            match self.super_type(current) {
                Some(name) if name == marker => return true,
                Some(name) => match self.get_type(name) {
                    Some(next) => current = next,
                    None => return false,
                },
                None => return false,
            }
        }
        false
    }

    /// Whether the event marker is a direct or indirect supertype.
    pub fn is_event_type(&self, handle: TypeHandle) -> bool {
        self.has_super_type(handle, EVENT_SUPER_TYPE)
    }

    pub fn is_annotation_type(&self, handle: TypeHandle) -> bool {
        self.has_super_type(handle, ANNOTATION_SUPER_TYPE)
    }

    /// Structure of a resolved custom type.
    pub fn structure(&self, handle: TypeHandle) -> Option<&Arc<TypeStructure>> {
        match &self.types[handle.0].state {
            TypeState::Resolved(s) => Some(s),
            _ => None,
        }
    }

    /// Run the builder of `handle` if it has not run yet.
    pub fn resolve(&mut self, handle: TypeHandle) -> Result<(), TypeRegistrationError> {
        let def = &mut self.types[handle.0];
        match &def.state {
            TypeState::Builtin(_) | TypeState::Resolved(_) => return Ok(()),
            TypeState::Building => {
                return Err(TypeRegistrationError::Unresolved {
                    type_name: def.name.clone(),
                })
            }
            TypeState::Failed(msg) => {
                return Err(TypeRegistrationError::illegal(format!(
                    "type {} failed to build: {msg}",
                    def.name
                )))
            }
            TypeState::Pending(_) => {}
        }
        let builder = match std::mem::replace(&mut def.state, TypeState::Building) {
            TypeState::Pending(builder) => builder,
            other => {
                def.state = other;
                return Ok(());
            }
        };
        let name = def.name.clone();

        let mut structure_builder = TypeStructureBuilder::new(self, handle, &name);
        builder(&mut structure_builder);
        match structure_builder.finish() {
            Ok(structure) => {
                self.types[handle.0].state = TypeState::Resolved(Arc::new(structure));
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Type {} failed to build: {}", name, e);
                self.types[handle.0].state = TypeState::Failed(e.to_string());
                if self.by_name.get(&name) == Some(&handle) {
                    self.by_name.remove(&name);
                }
                Err(e)
            }
        }
    }

    /// Resolve a type referenced by a field. A type that is still being
    /// built counts as resolved so that types can refer to each other.
    pub(crate) fn resolve_reference(&mut self, handle: TypeHandle) -> Result<(), TypeRegistrationError> {
        if self.is_building(handle) {
            return Ok(());
        }
        self.resolve(handle)
    }

    /// Resolve every pending type, then fail the types that ended up
    /// referring to a failed one. Returns the handles that can be written.
    pub fn resolve_all(&mut self) -> Vec<TypeHandle> {
        loop {
            let pending: Vec<TypeHandle> = (0..self.types.len())
                .map(TypeHandle)
                .filter(|h| self.is_pending(*h))
                .collect();
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                // failures are logged and leave the type out of the output
                let _ = self.resolve(handle);
            }
        }
        loop {
            let broken: Vec<(TypeHandle, String)> = (0..self.types.len())
                .map(TypeHandle)
                .filter_map(|h| {
                    let structure = self.structure(h)?;
                    let references = structure
                        .fields
                        .iter()
                        .map(|f| f.field_type)
                        .chain(structure.annotations.iter().map(Annotation::annotation_type))
                        .chain(
                            structure
                                .fields
                                .iter()
                                .flat_map(|f| f.annotations.iter().map(Annotation::annotation_type)),
                        );
                    for reference in references {
                        if !self.is_resolved(reference) {
                            return Some((h, self.name(reference).to_string()));
                        }
                    }
                    None
                })
                .collect();
            if broken.is_empty() {
                break;
            }
            for (handle, missing) in broken {
                tracing::warn!(
                    "Type {} refers to unusable type {}, leaving it out",
                    self.name(handle),
                    missing
                );
                self.types[handle.0].state =
                    TypeState::Failed(format!("refers to unusable type {missing}"));
            }
        }
        (0..self.types.len())
            .map(TypeHandle)
            .filter(|h| self.is_resolved(*h))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builtins_have_fixed_handles() {
        let registry = TypeRegistry::new(false);
        for b in Builtin::ALL {
            let handle = registry.builtin(b);
            assert_eq!(registry.name(handle), b.type_name());
            assert_eq!(registry.as_builtin(handle), Some(b));
            assert_eq!(registry.get_type(b.type_name()), Some(handle));
        }
        assert_eq!(Builtin::of_name(STRING_CLASS), Some(Builtin::String));
    }

    #[test]
    fn test_annotation_types_always_registered() {
        let mut registry = TypeRegistry::new(false);
        let label = registry.get_type(LABEL).unwrap();
        let experimental = registry.get_type(EXPERIMENTAL).unwrap();
        assert!(registry.is_annotation_type(label));
        assert!(registry.is_annotation_type(experimental));
        registry.resolve(label).unwrap();
        registry.resolve(experimental).unwrap();
        assert_eq!(registry.structure(label).unwrap().fields.len(), 1);
        assert!(registry.structure(experimental).unwrap().fields.is_empty());
    }

    #[test]
    fn test_builder_runs_once_on_first_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = TypeRegistry::new(false);
        let counter = calls.clone();
        let handle = registry
            .register_type("demo.Lazy", move |b| {
                counter.fetch_add(1, Ordering::SeqCst);
                b.add_field("x", Builtin::Int);
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_pending(handle));

        // registering the same name again hands back the existing type
        let again = registry.register_type("demo.Lazy", |_| {}).unwrap();
        assert_eq!(again, handle);

        registry.resolve(handle).unwrap();
        registry.resolve(handle).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.structure(handle).unwrap().fields.len(), 1);
    }

    #[test]
    fn test_mutual_references_in_any_order() {
        let mut registry = TypeRegistry::new(false);
        // A refers to B before B is registered; it is looked up at build time
        let a = registry
            .register_type("demo.A", |b| {
                b.add_field("b", "demo.B");
            })
            .unwrap();
        let b = registry
            .register_type("demo.B", |b| {
                b.add_field("a", "demo.A");
            })
            .unwrap();
        registry.resolve(a).unwrap();
        assert!(registry.is_resolved(b));
        assert_eq!(registry.structure(a).unwrap().fields[0].field_type, b);
        assert_eq!(registry.structure(b).unwrap().fields[0].field_type, a);
    }

    #[test]
    fn test_predefined_requires_initialization() {
        let registry = TypeRegistry::new(false);
        let err = registry.predefined(JdkType::Thread).unwrap_err();
        assert!(matches!(err, TypeRegistrationError::IllegalArgument { .. }));

        let mut registry = TypeRegistry::new(true);
        let thread = registry.predefined(JdkType::Thread).unwrap();
        registry.resolve(thread).unwrap();
        let group = registry.predefined(JdkType::ThreadGroup).unwrap();
        assert!(registry.is_resolved(group));
        let parent = &registry.structure(group).unwrap().fields[0];
        assert_eq!(parent.field_type, group);
    }

    #[test]
    fn test_failed_type_leaves_others_alone() {
        let mut registry = TypeRegistry::new(false);
        let good = registry
            .register_type("demo.Good", |b| {
                b.add_field("x", Builtin::Long);
            })
            .unwrap();
        registry.resolve(good).unwrap();
        let bad = registry
            .register_type("demo.Bad", |b| {
                b.add_field("x", Builtin::Long).add_field("x", Builtin::Int);
            })
            .unwrap();
        let err = registry.resolve(bad).unwrap_err();
        assert!(matches!(err, TypeRegistrationError::DuplicateField { .. }));
        assert!(registry.is_resolved(good));
        assert_eq!(registry.get_type("demo.Bad"), None);

        let user = registry
            .register_type("demo.User", move |b| {
                b.add_field("good", good);
            })
            .unwrap();
        // a type pointing at the failed one fails as well
        let dependent = registry
            .register_type("demo.Dependent", move |b| {
                b.add_field("bad", bad);
            })
            .unwrap();
        let emitted = registry.resolve_all();
        assert!(emitted.contains(&good));
        assert!(emitted.contains(&user));
        assert!(!emitted.contains(&bad));
        assert!(!emitted.contains(&dependent));
    }

    #[test]
    fn test_event_marker_is_transitive() {
        let mut registry = TypeRegistry::new(false);
        let base = registry.register_event_type("demo.Base", |_| {}).unwrap();
        let derived = registry
            .get_or_add("demo.Derived", Some("demo.Base"), false, |_| {})
            .unwrap();
        let plain = registry.register_type("demo.Plain", |_| {}).unwrap();
        assert!(registry.is_event_type(base));
        assert!(registry.is_event_type(derived));
        assert!(!registry.is_event_type(plain));
        assert!(registry.is_annotation_type(registry.get_type(LABEL).unwrap()));
    }
}
