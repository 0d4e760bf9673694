//! Integration tests for the binding engine, value-type proxies and transitions
//!
//! These tests verify that:
//! - Field bindings never add more than one entry per core property
//! - Binding loops leave the target untouched and are reported once
//! - Cancelling a transition restores values and bindings
//! - Batching defers re-evaluation until the batch ends

use std::sync::{Arc, Mutex};

use tether_core::{
    Action, AnimationStatus, BindingError, Diagnostic, Engine, EngineConfig, Evaluation,
    GroupKind, Intercept, ObjectClass, PropertyHandle, PropertyMeta, SourceLocation,
    TransitionAnimation, TransitionManager, TypeTag, Value, ValueInterceptor, WriteFlags,
};

fn widget_class() -> ObjectClass {
    ObjectClass::new("Widget")
        .property(PropertyMeta::new("x", TypeTag::Real))
        .property(PropertyMeta::new("y", TypeTag::Real))
        .property(PropertyMeta::new("geometry", TypeTag::Group(GroupKind::Rect)))
        .property(PropertyMeta::new("padding", TypeTag::Group(GroupKind::Margins)))
        .property(PropertyMeta::new("model", TypeTag::Variant))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test that binding every field of two value types keeps one entry per core property
#[test]
fn test_no_double_apply_through_proxies() {
    let mut engine = Engine::new();
    let context = engine.create_context(None);
    let widget = engine.create_object(&widget_class(), "widget");
    let x = engine.property(widget, "x").unwrap();

    for core in ["geometry", "padding"] {
        let kind = match core {
            "geometry" => GroupKind::Rect,
            _ => GroupKind::Margins,
        };
        for field in kind.field_names() {
            let handle = engine.property(widget, &format!("{core}.{field}")).unwrap();
            let binding = engine.create_binding(handle, context, "x", move |s| Evaluation::Value(s.read(x)));
            engine.set_binding(handle, Some(binding), WriteFlags::empty());
            // Enabling again must not link a second time
            engine.enable_binding(binding, WriteFlags::empty());
        }
    }

    let entries = engine.object_bindings(widget);
    assert_eq!(entries.len(), 2);

    engine.write(x, Value::Real(3.0), WriteFlags::empty());
    let geometry = engine.property(widget, "geometry").unwrap();
    assert_eq!(
        engine.read(geometry),
        Some(Value::group(GroupKind::Rect, &[3.0, 3.0, 3.0, 3.0]))
    );
}

/// Test that `x: x + 1` is detected once and leaves `x` at its pre-binding value
#[test]
fn test_self_increment_loop() {
    init_tracing();
    let mut engine = Engine::with_config(EngineConfig::testing());
    let context = engine.create_context(None);
    let widget = engine.create_object(&widget_class(), "widget");
    let x = engine.property(widget, "x").unwrap();
    engine.write(x, Value::Real(7.0), WriteFlags::empty());

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = seen.clone();
    engine.set_diagnostic_sink(Some(Box::new(move |d: &Diagnostic| {
        sink.lock().unwrap().push(d.to_string());
    })));

    let binding = engine.create_binding(x, context, "x + 1", move |s| {
        Evaluation::value(s.read_real(x).unwrap_or(0.0) + 1.0)
    });
    engine.set_binding_location(binding, SourceLocation::new("Widget.ui", 3, 8));
    engine.set_binding(x, Some(binding), WriteFlags::empty());

    assert_eq!(engine.read(x), Some(Value::Real(7.0)));
    assert_eq!(engine.binding_error(binding), Some(&BindingError::Loop));
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &["Widget.ui:3:8: binding loop detected for property \"widget.x\"".to_string()]
    );
}

/// Test that a side-effect write to the binding's own target is a loop
#[test]
fn test_evaluator_write_back_loop() {
    let mut engine = Engine::new();
    let widget = engine.create_object(&widget_class(), "widget");
    let y = engine.property(widget, "y").unwrap();
    engine.write(y, Value::Real(1.0), WriteFlags::empty());

    let binding = engine.create_native_binding(y, None, move |s| {
        s.write(y, Value::Real(100.0));
        Evaluation::value(2.0)
    });
    engine.set_binding(y, Some(binding), WriteFlags::empty());

    assert_eq!(engine.read(y), Some(Value::Real(1.0)));
    assert_eq!(engine.diagnostics().filter(|d| d.is_loop()).count(), 1);
}

/// Test that undefined written to a variant property stores null
#[test]
fn test_undefined_to_variant() {
    let mut engine = Engine::new();
    let context = engine.create_context(None);
    let widget = engine.create_object(&widget_class(), "widget");
    let model = engine.property(widget, "model").unwrap();
    engine.write(model, Value::from("rows"), WriteFlags::empty());

    let binding = engine.create_binding(model, context, "undefined", |_| Evaluation::Undefined);
    engine.set_binding(model, Some(binding), WriteFlags::empty());

    assert_eq!(engine.read(model), Some(Value::Null));
    assert_eq!(engine.diagnostic_count(), 0);
}

/// Test that updates inside a batch run once, at the end of the batch
#[test]
fn test_batching_defers_updates() {
    let mut engine = Engine::new();
    let context = engine.create_context(None);
    let widget = engine.create_object(&widget_class(), "widget");
    let x = engine.property(widget, "x").unwrap();
    let y = engine.property(widget, "y").unwrap();

    let runs = Arc::new(Mutex::new(0));
    let counter = runs.clone();
    let binding = engine.create_binding(y, context, "x * 2", move |s| {
        *counter.lock().unwrap() += 1;
        Evaluation::value(s.read_real(x).unwrap_or(0.0) * 2.0)
    });
    engine.set_binding(y, Some(binding), WriteFlags::empty());
    assert_eq!(*runs.lock().unwrap(), 1);

    engine.batch(|engine| {
        engine.write(x, Value::Real(1.0), WriteFlags::empty());
        engine.write(x, Value::Real(2.0), WriteFlags::empty());
        engine.write(x, Value::Real(3.0), WriteFlags::empty());
        assert_eq!(engine.stats().pending_updates, 1);
        assert_eq!(engine.read(y), Some(Value::Real(0.0)));
    });

    assert_eq!(*runs.lock().unwrap(), 2);
    assert_eq!(engine.read(y), Some(Value::Real(6.0)));
}

struct Doubler;

impl ValueInterceptor for Doubler {
    fn intercept(&mut self, _target: PropertyHandle, _current: &Value, incoming: Value) -> Intercept {
        match incoming.as_real() {
            Some(v) => Intercept::Write(Value::Real(v * 2.0)),
            None => Intercept::Write(incoming),
        }
    }
}

/// Test that binding results pass through interceptors unless bypassed
#[test]
fn test_binding_writes_are_intercepted() {
    let mut engine = Engine::new();
    let context = engine.create_context(None);
    let widget = engine.create_object(&widget_class(), "widget");
    let x = engine.property(widget, "x").unwrap();
    engine.set_interceptor(x, Box::new(Doubler));

    let binding = engine.create_binding(x, context, "5", |_| Evaluation::value(5.0));
    engine.set_binding(x, Some(binding), WriteFlags::empty());
    assert_eq!(engine.read(x), Some(Value::Real(10.0)));

    engine.update_binding(binding, WriteFlags::BYPASS_INTERCEPTOR);
    assert_eq!(engine.read(x), Some(Value::Real(5.0)));
}

struct Hold;

impl TransitionAnimation for Hold {
    fn prepare(&mut self, _engine: &mut Engine, actions: &mut [Action], touched: &mut Vec<PropertyHandle>) {
        touched.extend(actions.iter().filter_map(|a| a.property));
    }

    fn advance(&mut self, _engine: &mut Engine, _dt_ms: f64) -> AnimationStatus {
        AnimationStatus::Running
    }

    fn stop(&mut self, _engine: &mut Engine) {}
}

/// Test that cancelling before completion restores every value and binding
#[test]
fn test_transition_round_trip_on_field_bindings() {
    let mut engine = Engine::new();
    let context = engine.create_context(None);
    let widget = engine.create_object(&widget_class(), "widget");
    let x = engine.property(widget, "x").unwrap();
    let left = engine.property(widget, "padding.left").unwrap();
    let padding = engine.property(widget, "padding").unwrap();

    engine.write(x, Value::Real(4.0), WriteFlags::empty());
    let original = engine.create_binding(left, context, "x", move |s| Evaluation::Value(s.read(x)));
    engine.set_binding(left, Some(original), WriteFlags::empty());
    let before = engine.read(padding);

    let replacement = engine.create_binding(left, context, "x * 10", move |s| {
        Evaluation::value(s.read_real(x).unwrap_or(0.0) * 10.0)
    });
    let actions = vec![
        Action::binding_change(&engine, left, replacement),
        Action::value_change(&engine, x, 9.0),
    ];

    let hold: Box<dyn TransitionAnimation> = Box::new(Hold);
    let mut manager = TransitionManager::new();
    manager.transition(&mut engine, actions, Some(hold));
    manager.advance(&mut engine, 16.0);
    manager.cancel(&mut engine);

    assert_eq!(engine.read(x), Some(Value::Real(4.0)));
    assert_eq!(engine.read(padding), before);
    assert_eq!(engine.binding(left), Some(original));
    assert!(!engine.binding_exists(replacement));

    engine.write(x, Value::Real(6.0), WriteFlags::empty());
    assert_eq!(engine.read(left), Some(Value::Real(6.0)));
}

/// Test that configuration loads from TOML and bounds retained diagnostics
#[test]
fn test_config_bounds_diagnostics() {
    let config = EngineConfig::from_toml_str(
        "max_diagnostics = 2\nlog_binding_errors = false\n",
    )
    .unwrap();
    let mut engine = Engine::with_config(config);
    let context = engine.create_context(None);
    let widget = engine.create_object(&widget_class(), "widget");
    let x = engine.property(widget, "x").unwrap();

    for i in 0..5 {
        let binding = engine.create_binding(x, context, "fail", move |_| {
            Evaluation::error(format!("failure {i}"))
        });
        engine.set_binding(x, Some(binding), WriteFlags::empty());
    }

    assert_eq!(engine.diagnostic_count(), 5);
    let kept: Vec<_> = engine.take_diagnostics().into_iter().map(|d| d.error).collect();
    assert_eq!(
        kept,
        vec![
            BindingError::Evaluation("failure 3".into()),
            BindingError::Evaluation("failure 4".into()),
        ]
    );
    assert_eq!(engine.diagnostics().count(), 0);
}
