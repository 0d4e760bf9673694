//! Property handles and property access
//!
//! A [`PropertyHandle`] names one property of one object and is the unit that
//! bindings and animations target. Handles are cheap to copy and confer no
//! ownership; every access goes through the [`Engine`] and fails softly once
//! the object is gone.

use bitflags::bitflags;

use crate::binding::BindingId;
use crate::engine::Engine;
use crate::error::{PropertyError, Result};
use crate::object::{ObjectId, PropertyMeta};
use crate::value::{TypeTag, Value};

const VALUE_TYPE_FLAG: u32 = 1 << 31;
const CORE_MASK: u32 = 0xFFFF;
const SUB_SHIFT: u32 = 16;
const SUB_MASK: u32 = 0xFF;

/// Encoded property index
///
/// Core properties use the plain index. Value-type sub-properties set the
/// high bit, keep the owning core index in the low 16 bits and store the
/// field offset in bits 16..24.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyIndex(u32);

impl PropertyIndex {
    pub const fn core(index: u16) -> Self {
        PropertyIndex(index as u32)
    }

    pub const fn value_type(core: u16, sub: u8) -> Self {
        PropertyIndex(VALUE_TYPE_FLAG | ((sub as u32) << SUB_SHIFT) | core as u32)
    }

    pub fn is_value_type(self) -> bool {
        self.0 & VALUE_TYPE_FLAG != 0
    }

    pub fn core_index(self) -> u16 {
        (self.0 & CORE_MASK) as u16
    }

    pub fn value_type_index(self) -> Option<u8> {
        self.is_value_type()
            .then(|| ((self.0 >> SUB_SHIFT) & SUB_MASK) as u8)
    }

    /// The core property this index belongs to
    pub fn to_core(self) -> Self {
        PropertyIndex::core(self.core_index())
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for PropertyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value_type_index() {
            Some(sub) => write!(f, "PropertyIndex({}.{})", self.core_index(), sub),
            None => write!(f, "PropertyIndex({})", self.core_index()),
        }
    }
}

/// Reference to a single property of an object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyHandle {
    object: ObjectId,
    index: PropertyIndex,
}

impl PropertyHandle {
    pub fn new(object: ObjectId, index: PropertyIndex) -> Self {
        Self { object, index }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn index(&self) -> PropertyIndex {
        self.index
    }

    /// Handle of the owning core property (itself for core handles)
    pub fn core(&self) -> PropertyHandle {
        PropertyHandle::new(self.object, self.index.to_core())
    }
}

bitflags! {
    /// Modifiers for a single property write
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct WriteFlags: u8 {
        /// Skip any value interceptor installed on the property
        const BYPASS_INTERCEPTOR = 1;
        /// Keep a binding on the property alive across this write
        const DONT_REMOVE_BINDING = 1 << 1;
    }
}

/// Result of a value interceptor
#[derive(Clone, Debug, PartialEq)]
pub enum Intercept {
    /// Store this value
    Write(Value),
    /// Drop the write; the interceptor takes over the property
    Swallow,
}

/// Hook that sees every non-bypassed write to a core property and its fields
pub trait ValueInterceptor: Send {
    fn intercept(&mut self, target: PropertyHandle, current: &Value, incoming: Value) -> Intercept;
}

impl Engine {
    /// Current value, or `None` when the object or property is gone
    pub fn read(&self, handle: PropertyHandle) -> Option<Value> {
        let node = self.objects.get(handle.object)?;
        let slot = node.slots.get(handle.index.core_index() as usize)?;
        match handle.index.value_type_index() {
            Some(sub) => slot.value.field(sub).map(Value::Real),
            None => Some(slot.value.clone()),
        }
    }

    /// Declared type; value-type fields are reals
    pub fn property_type(&self, handle: PropertyHandle) -> Option<TypeTag> {
        let meta = self.property_meta(handle)?;
        match handle.index.is_value_type() {
            true => Some(TypeTag::Real),
            false => Some(meta.ty),
        }
    }

    /// Whether the handle names a structured core property
    pub fn is_value_type_category(&self, handle: PropertyHandle) -> bool {
        !handle.index.is_value_type()
            && matches!(self.property_type(handle), Some(TypeTag::Group(_)))
    }

    /// Meta of the core property behind a handle
    pub fn property_meta(&self, handle: PropertyHandle) -> Option<&PropertyMeta> {
        self.objects
            .get(handle.object)?
            .meta(handle.index.core_index())
    }

    /// Dotted property name, e.g. `"margins.left"`
    pub fn property_name(&self, handle: PropertyHandle) -> String {
        let Some(meta) = self.property_meta(handle) else {
            return format!("{:?}", handle.index);
        };
        match (handle.index.value_type_index(), meta.ty) {
            (Some(sub), TypeTag::Group(kind)) => {
                format!("{}.{}", meta.name, kind.field_name(sub).unwrap_or("?"))
            }
            _ => meta.name.clone(),
        }
    }

    /// Write a value, returning whether it was accepted
    pub fn write(&mut self, handle: PropertyHandle, value: Value, flags: WriteFlags) -> bool {
        self.try_write(handle, value, flags).is_ok()
    }

    /// Write a value
    ///
    /// Unless [`WriteFlags::DONT_REMOVE_BINDING`] is given, any binding on the
    /// handle is removed and destroyed first. Unless
    /// [`WriteFlags::BYPASS_INTERCEPTOR`] is given, an installed interceptor
    /// may replace or swallow the value.
    pub fn try_write(&mut self, handle: PropertyHandle, value: Value, flags: WriteFlags) -> Result<()> {
        let value = self.coerce_for(handle, value)?;

        if !flags.contains(WriteFlags::DONT_REMOVE_BINDING) {
            self.remove_binding_for_write(handle);
        }

        let value = if flags.contains(WriteFlags::BYPASS_INTERCEPTOR) {
            value
        } else {
            match self.intercept(handle, value) {
                Some(value) => self.coerce_for(handle, value)?,
                None => return Ok(()),
            }
        };

        self.store(handle, value, None);
        Ok(())
    }

    /// Reset to the declared default, returning whether the property supports it
    pub fn reset(&mut self, handle: PropertyHandle) -> bool {
        self.try_reset(handle).is_ok()
    }

    pub fn try_reset(&mut self, handle: PropertyHandle) -> Result<()> {
        let meta = self
            .property_meta(handle)
            .ok_or(PropertyError::ObjectDestroyed)?;
        if !meta.resettable || handle.index.is_value_type() {
            return Err(PropertyError::NotResettable);
        }
        let default = meta.default.clone();
        self.store(handle, default, None);
        Ok(())
    }

    /// Install a write interceptor on the core property behind `handle`
    pub fn set_interceptor(&mut self, handle: PropertyHandle, interceptor: Box<dyn ValueInterceptor>) {
        if let Some(slot) = self
            .objects
            .get_mut(handle.object)
            .and_then(|n| n.slots.get_mut(handle.index.core_index() as usize))
        {
            slot.interceptor = Some(interceptor);
        }
    }

    pub fn clear_interceptor(&mut self, handle: PropertyHandle) -> Option<Box<dyn ValueInterceptor>> {
        self.objects
            .get_mut(handle.object)
            .and_then(|n| n.slots.get_mut(handle.index.core_index() as usize))
            .and_then(|slot| slot.interceptor.take())
    }

    fn coerce_for(&self, handle: PropertyHandle, value: Value) -> Result<Value> {
        let node = self
            .objects
            .get(handle.object)
            .ok_or(PropertyError::ObjectDestroyed)?;
        let meta = node
            .meta(handle.index.core_index())
            .ok_or(PropertyError::UnknownProperty(handle.index))?;

        if handle.index.is_value_type() {
            return value
                .as_real()
                .map(Value::Real)
                .ok_or(PropertyError::TypeMismatch {
                    expected: TypeTag::Real,
                    found: value.type_name(),
                });
        }

        value.coerce(meta.ty).map_err(|rejected| PropertyError::TypeMismatch {
            expected: meta.ty,
            found: rejected.type_name(),
        })
    }

    fn intercept(&mut self, handle: PropertyHandle, value: Value) -> Option<Value> {
        let Some(current) = self.read(handle) else {
            return Some(value);
        };
        let Some(slot) = self
            .objects
            .get_mut(handle.object)
            .and_then(|n| n.slots.get_mut(handle.index.core_index() as usize))
        else {
            return Some(value);
        };
        match slot.interceptor.as_mut() {
            None => Some(value),
            Some(interceptor) => match interceptor.intercept(handle, &current, value) {
                Intercept::Write(value) => Some(value),
                Intercept::Swallow => None,
            },
        }
    }

    /// Store an already coerced value and notify subscribers other than `except`
    ///
    /// Returns whether the stored value changed.
    pub(crate) fn store(&mut self, handle: PropertyHandle, value: Value, except: Option<BindingId>) -> bool {
        let core = handle.index.core_index();
        let Some(node) = self.objects.get_mut(handle.object) else {
            return false;
        };
        let Some(slot) = node.slots.get_mut(core as usize) else {
            return false;
        };

        let value = match handle.index.value_type_index() {
            Some(sub) => match value.as_real().and_then(|v| slot.value.with_field(sub, v)) {
                Some(group) => group,
                None => return false,
            },
            None => value,
        };

        if slot.value == value {
            return false;
        }
        slot.value = value;
        node.needs_repaint = true;

        self.notify_property(handle.object, core, except);
        true
    }

    pub(crate) fn notify_property(&mut self, object: ObjectId, core: u16, except: Option<BindingId>) {
        let Some(slot) = self
            .objects
            .get(object)
            .and_then(|n| n.slots.get(core as usize))
        else {
            return;
        };
        let subscribers = slot.subscribers.clone();
        for subscriber in subscribers {
            if Some(subscriber) != except {
                self.schedule_update(subscriber);
            }
        }
    }
}
