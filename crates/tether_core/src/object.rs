//! Objects and their property tables
//!
//! An object is a named instance of an [`ObjectClass`]: a fixed table of
//! typed properties. Each property slot stores its value, the bindings
//! subscribed to it and an optional write interceptor. The object also owns
//! the head of its binding list and its value-type proxies.

use rustc_hash::FxHashMap;
use slotmap::new_key_type;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::binding::BindingId;
use crate::engine::Engine;
use crate::property::{PropertyHandle, PropertyIndex, ValueInterceptor};
use crate::value::{TypeTag, Value};

new_key_type! {
    /// Unique identifier for an object
    pub struct ObjectId;
}

/// Declaration of a single property
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyMeta {
    pub name: String,
    pub ty: TypeTag,
    /// Initial value, and the value restored by a reset
    pub default: Value,
    pub resettable: bool,
}

impl PropertyMeta {
    pub fn new(name: impl Into<String>, ty: TypeTag) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Value::default_for(ty),
            resettable: false,
        }
    }

    /// Set the initial/reset value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Allow the property to be reset to its default
    pub fn resettable(mut self) -> Self {
        self.resettable = true;
        self
    }
}

/// A reusable property table shared by objects of the same kind
///
/// ```rust
/// use tether_core::{Engine, ObjectClass, PropertyMeta, TypeTag};
///
/// let class = ObjectClass::new("Rectangle")
///     .property(PropertyMeta::new("x", TypeTag::Real))
///     .property(PropertyMeta::new("width", TypeTag::Real).with_default(100.0));
///
/// let mut engine = Engine::new();
/// let rect = engine.create_object(&class, "rect");
/// let width = engine.property(rect, "width").unwrap();
/// assert_eq!(engine.read(width).and_then(|v| v.as_real()), Some(100.0));
/// ```
#[derive(Clone, Debug)]
pub struct ObjectClass {
    name: String,
    properties: Arc<Vec<PropertyMeta>>,
}

impl ObjectClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Arc::new(Vec::new()),
        }
    }

    /// Append a property declaration
    pub fn property(mut self, meta: PropertyMeta) -> Self {
        Arc::make_mut(&mut self.properties).push(meta);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyMeta] {
        &self.properties
    }
}

pub(crate) struct PropertySlot {
    pub(crate) value: Value,
    pub(crate) subscribers: SmallVec<[BindingId; 4]>,
    pub(crate) interceptor: Option<Box<dyn ValueInterceptor>>,
}

pub(crate) struct ObjectNode {
    pub(crate) name: String,
    pub(crate) properties: Arc<Vec<PropertyMeta>>,
    pub(crate) slots: Vec<PropertySlot>,
    /// Head of the object's binding list
    pub(crate) bindings_head: Option<BindingId>,
    /// Value-type proxies by core property index, kept for the object's lifetime
    pub(crate) proxies: FxHashMap<u16, BindingId>,
    pub(crate) needs_repaint: bool,
}

impl ObjectNode {
    pub(crate) fn meta(&self, core: u16) -> Option<&PropertyMeta> {
        self.properties.get(core as usize)
    }
}

impl Engine {
    /// Create an object with every property at its declared default
    pub fn create_object(&mut self, class: &ObjectClass, name: impl Into<String>) -> ObjectId {
        let slots = class
            .properties
            .iter()
            .map(|meta| PropertySlot {
                value: meta.default.clone(),
                subscribers: SmallVec::new(),
                interceptor: None,
            })
            .collect();

        self.objects.insert(ObjectNode {
            name: name.into(),
            properties: Arc::clone(&class.properties),
            slots,
            bindings_head: None,
            proxies: FxHashMap::default(),
            needs_repaint: false,
        })
    }

    /// Destroy an object together with every binding in its list
    ///
    /// Bindings that target the object but are not attached to it (for
    /// example ones held by a pending transition) stay alive and inert.
    pub fn destroy_object(&mut self, object: ObjectId) {
        let Some(node) = self.objects.get(object) else {
            return;
        };
        let proxies: Vec<BindingId> = node.proxies.values().copied().collect();
        let attached = self.list_ids(crate::binding::ListOwner::Object(object));

        for id in attached {
            if !proxies.contains(&id) {
                self.destroy_binding(id);
            }
        }
        for proxy in proxies {
            self.remove_proxy(proxy);
        }

        self.objects.remove(object);
        tracing::trace!(?object, "object destroyed");
    }

    pub fn object_exists(&self, object: ObjectId) -> bool {
        self.objects.contains_key(object)
    }

    pub fn object_name(&self, object: ObjectId) -> Option<&str> {
        self.objects.get(object).map(|n| n.name.as_str())
    }

    /// Resolve a property by name
    ///
    /// Sub-properties of value types are addressed as `"core.field"`, for
    /// example `"margins.left"`.
    pub fn property(&self, object: ObjectId, name: &str) -> Option<PropertyHandle> {
        let node = self.objects.get(object)?;
        let (core_name, field) = match name.split_once('.') {
            Some((core, field)) => (core, Some(field)),
            None => (name, None),
        };

        let core = node.properties.iter().position(|m| m.name == core_name)?;
        let core = u16::try_from(core).ok()?;

        match field {
            None => Some(PropertyHandle::new(object, PropertyIndex::core(core))),
            Some(field) => match node.properties[core as usize].ty {
                TypeTag::Group(kind) => {
                    let sub = kind.field_index(field)?;
                    Some(PropertyHandle::new(
                        object,
                        PropertyIndex::value_type(core, sub),
                    ))
                }
                _ => None,
            },
        }
    }

    /// Drain the objects written since the last call
    pub fn take_repaint_requests(&mut self) -> Vec<ObjectId> {
        self.objects
            .iter_mut()
            .filter(|(_, node)| node.needs_repaint)
            .map(|(id, node)| {
                node.needs_repaint = false;
                id
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::GroupKind;

    fn item_class() -> ObjectClass {
        ObjectClass::new("Item")
            .property(PropertyMeta::new("x", TypeTag::Real))
            .property(PropertyMeta::new("margins", TypeTag::Group(GroupKind::Margins)))
            .property(PropertyMeta::new("label", TypeTag::String).with_default("item"))
    }

    #[test]
    fn test_property_lookup() {
        let mut engine = Engine::new();
        let item = engine.create_object(&item_class(), "item");

        let x = engine.property(item, "x").unwrap();
        assert_eq!(x.index(), PropertyIndex::core(0));

        let top = engine.property(item, "margins.top").unwrap();
        assert!(top.index().is_value_type());
        assert_eq!(top.index().core_index(), 1);
        assert_eq!(top.index().value_type_index(), Some(1));

        assert!(engine.property(item, "margins.depth").is_none());
        assert!(engine.property(item, "x.y").is_none());
        assert!(engine.property(item, "missing").is_none());
    }

    #[test]
    fn test_defaults_applied() {
        let mut engine = Engine::new();
        let item = engine.create_object(&item_class(), "item");
        let label = engine.property(item, "label").unwrap();
        assert_eq!(engine.read(label), Some(Value::from("item")));
    }

    #[test]
    fn test_destroy_object() {
        let mut engine = Engine::new();
        let item = engine.create_object(&item_class(), "item");
        let x = engine.property(item, "x").unwrap();

        engine.destroy_object(item);

        assert!(!engine.object_exists(item));
        assert_eq!(engine.read(x), None);
        assert!(!engine.write(x, Value::Real(1.0), Default::default()));
    }

    #[test]
    fn test_repaint_requests() {
        let mut engine = Engine::new();
        let item = engine.create_object(&item_class(), "item");
        let x = engine.property(item, "x").unwrap();

        assert!(engine.take_repaint_requests().is_empty());
        engine.write(x, Value::Real(4.0), Default::default());
        assert_eq!(engine.take_repaint_requests(), vec![item]);
        assert!(engine.take_repaint_requests().is_empty());
    }
}
