//! End-to-end tests over types reflected with `#[reflect]`
//!
//! Arguments are encoded with `ArgumentPack` and decoded the way a boundary
//! call decodes them, so these cover marshal -> dispatch -> handle table.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tether_core::reflect::internal_call;
use tether_core::{
    ArgumentPack, Bridge, BridgeError, BridgeOptions, CreateRequest, DispatchError, Fault,
    HandleError, HandleMode, InteropString, ManagedValue, ModuleLoadStatus, NativePtr,
    ObjectCreateInfo, TypeModule, TypeRegistry,
};
use tether_native::reflect;

static FINALIZED: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
pub struct Counter {
    count: i64,
}

#[reflect(name = "Demo.Counter")]
impl Counter {
    #[constructor]
    pub fn new() -> Self {
        Self::default()
    }

    #[constructor]
    pub fn starting_at(start: i64) -> Self {
        Counter { count: start }
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    pub fn increment_by(&mut self, amount: i32) {
        self.count += i64::from(amount);
    }

    #[rename("Get")]
    pub fn value(&self) -> i64 {
        self.count
    }

    pub fn checked_add(&mut self, amount: i64) -> Result<i64, Fault> {
        self.count = self
            .count
            .checked_add(amount)
            .ok_or_else(|| Fault::new("counter overflow"))?;
        Ok(self.count)
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    pub fn clear(&mut self) {
        self.reset();
    }
}

pub struct Buffer {
    base: NativePtr,
    len: u32,
}

#[reflect(name = "Demo.Buffer")]
impl Buffer {
    #[constructor]
    pub fn wrap(base: NativePtr, len: u32) -> Result<Self, Fault> {
        if base.is_null() {
            return Err(Fault::new("buffer base is null"));
        }
        Ok(Buffer { base, len })
    }

    pub fn address(&self) -> NativePtr {
        self.base
    }

    pub fn len(&self) -> u32 {
        self.len
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        FINALIZED.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Conflicted;

#[reflect(name = "Demo.Conflicted")]
impl Conflicted {
    #[constructor]
    pub fn new() -> Self {
        Conflicted
    }

    #[rename("Pick")]
    pub fn pick_int(&self, _value: i32) -> i32 {
        1
    }

    #[rename("Pick")]
    pub fn pick_double(&self, _value: f64) -> i32 {
        2
    }
}

type ScaleFn = extern "C" fn(i32) -> i32;

extern "C" fn native_triple(value: i32) -> i32 {
    value * 3
}

pub struct Scaler;

#[reflect(name = "Hooks.Scaler")]
impl Scaler {
    #[constructor]
    pub fn new() -> Self {
        Scaler
    }

    pub fn scale(&self, value: i32) -> Result<i32, Fault> {
        let entry = internal_call("Hooks.Scaler", "Triple", "Hooks")
            .ok_or_else(|| Fault::new("internal call Triple not uploaded"))?;
        // Registered below as a ScaleFn
        let triple: ScaleFn = unsafe { std::mem::transmute::<usize, ScaleFn>(entry.0) };
        Ok(triple(value))
    }
}

fn bridge() -> Bridge {
    let registry = TypeRegistry::new();
    registry.load_module(
        TypeModule::new("Demo", "1.0.0")
            .with_type::<Counter>()
            .with_type::<Buffer>()
            .with_type::<Conflicted>(),
    );
    Bridge::with_options(
        BridgeOptions {
            gc_threshold: 0,
            ..BridgeOptions::default()
        },
        Arc::new(registry),
    )
}

fn decode(pack: &ArgumentPack) -> Vec<ManagedValue> {
    unsafe { pack.as_encoded().decode() }.unwrap()
}

#[test]
fn test_counter_increments_by_one() {
    let bridge = bridge();
    let handle = bridge
        .create_object("Demo.Counter", &[], HandleMode::Owning)
        .unwrap()
        .expect("type is registered");

    assert_eq!(bridge.invoke_method(handle, "Get", &[]).unwrap(), Some(ManagedValue::Long(0)));
    bridge.invoke_method(handle, "Increment", &[]).unwrap();
    assert_eq!(bridge.invoke_method(handle, "Get", &[]).unwrap(), Some(ManagedValue::Long(1)));
}

#[test]
fn test_arguments_decoded_positionally() {
    let bridge = bridge();

    let mut ctor_args = ArgumentPack::new();
    ctor_args.push(ManagedValue::Long(40));
    let handle = bridge
        .create_object("Demo.Counter", &decode(&ctor_args), HandleMode::Owning)
        .unwrap()
        .unwrap();

    let mut args = ArgumentPack::new();
    args.push(ManagedValue::Byte(2));
    bridge.invoke_method(handle, "IncrementBy", &decode(&args)).unwrap();
    assert_eq!(bridge.invoke_method(handle, "Get", &[]).unwrap(), Some(ManagedValue::Long(42)));

    bridge.invoke_method(handle, "Clear", &[]).unwrap();
    assert_eq!(bridge.invoke_method(handle, "Get", &[]).unwrap(), Some(ManagedValue::Long(0)));
}

#[test]
fn test_private_methods_not_exported() {
    let bridge = bridge();
    let handle = bridge.create_object("Demo.Counter", &[], HandleMode::Owning).unwrap().unwrap();
    let err = bridge.invoke_method(handle, "Reset", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Dispatch(DispatchError::MissingMethod { .. })));
}

#[test]
fn test_fault_from_method_body() {
    let bridge = bridge();
    let mut args = ArgumentPack::new();
    args.push(ManagedValue::Long(i64::MAX));
    let handle = bridge
        .create_object("Demo.Counter", &decode(&args), HandleMode::Owning)
        .unwrap()
        .unwrap();

    let err = bridge
        .invoke_method(handle, "CheckedAdd", &[ManagedValue::Long(1)])
        .unwrap_err();
    match err {
        BridgeError::Invocation { target, source } => {
            assert_eq!(target, "Demo.Counter.CheckedAdd(long)");
            assert_eq!(source.message(), "counter overflow");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_fallible_constructor_and_pointer_passthrough() {
    let bridge = bridge();
    let mut storage = [0u8; 16];
    let base = storage.as_mut_ptr() as usize;

    let handle = bridge
        .create_object(
            "Demo.Buffer",
            &[ManagedValue::Pointer(base), ManagedValue::UShort(16)],
            HandleMode::Owning,
        )
        .unwrap()
        .unwrap();
    assert_eq!(
        bridge.invoke_method(handle, "Address", &[]).unwrap(),
        Some(ManagedValue::Pointer(base))
    );
    assert_eq!(bridge.invoke_method(handle, "Len", &[]).unwrap(), Some(ManagedValue::UInt(16)));

    let err = bridge
        .create_object(
            "Demo.Buffer",
            &[ManagedValue::Pointer(0), ManagedValue::UInt(1)],
            HandleMode::Owning,
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::Invocation { .. }));
}

#[test]
fn test_releasing_owning_handle_lets_collector_finalize() {
    let bridge = bridge();
    let mut storage = [0u8; 4];
    let args = [ManagedValue::Pointer(storage.as_mut_ptr() as usize), ManagedValue::UInt(4)];

    let handle = bridge.create_object("Demo.Buffer", &args, HandleMode::Owning).unwrap().unwrap();
    bridge.collect_garbage();
    assert!(bridge.resolve(handle).is_ok());

    let before = FINALIZED.load(Ordering::SeqCst);
    bridge.destroy_object(handle).unwrap();
    let stats = bridge.collect_garbage();
    assert_eq!(stats.collected, 1);
    assert!(FINALIZED.load(Ordering::SeqCst) > before);
}

#[test]
fn test_weak_handle_fails_cleanly_after_collection() {
    let bridge = bridge();
    let weak = bridge.create_object("Demo.Counter", &[], HandleMode::Weak).unwrap().unwrap();
    bridge.invoke_method(weak, "Increment", &[]).unwrap();

    bridge.collect_garbage();
    let err = bridge.invoke_method(weak, "Increment", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Handle(HandleError::Collected(_))));
}

#[test]
fn test_name_arity_collision_first_declared_wins() {
    let bridge = bridge();
    let handle = bridge.create_object("Demo.Conflicted", &[], HandleMode::Owning).unwrap().unwrap();

    // Both overloads are Pick/1; the first declared one takes the call
    assert_eq!(
        bridge.invoke_method(handle, "Pick", &[ManagedValue::Int(5)]).unwrap(),
        Some(ManagedValue::Int(1))
    );
    // ...and a double cannot narrow into it
    let err = bridge
        .invoke_method(handle, "Pick", &[ManagedValue::Double(5.0)])
        .unwrap_err();
    assert!(matches!(err, BridgeError::Dispatch(DispatchError::ArgumentMismatch { .. })));
}

#[test]
fn test_create_from_native_request() {
    let bridge = bridge();
    let name = InteropString::from_str("Demo.Counter");
    let mut args = ArgumentPack::new();
    args.push(ManagedValue::Int(7));
    let info = ObjectCreateInfo::new(&name, HandleMode::Owning, &args);

    let request = unsafe { CreateRequest::read(&info) }.unwrap();
    let handle = bridge.create_from_request(&request).unwrap().unwrap();
    assert_eq!(bridge.invoke_method(handle, "Get", &[]).unwrap(), Some(ManagedValue::Long(7)));

    unsafe { name.free() };
}

#[test]
fn test_reflected_body_calls_uploaded_internal_call() {
    let registry = TypeRegistry::new();
    let module = TypeModule::new("Hooks", "1.0.0")
        .with_type::<Scaler>()
        .with_internal_call("Hooks.Scaler", "Triple", NativePtr(native_triple as ScaleFn as usize));
    assert_eq!(module.upload_internal_calls(), 1);
    assert_eq!(registry.load_module(module), ModuleLoadStatus::Success);

    let bridge = Bridge::new(Arc::new(registry));
    let handle = bridge.create_object("Hooks.Scaler", &[], HandleMode::Owning).unwrap().unwrap();
    assert_eq!(
        bridge.invoke_method(handle, "Scale", &[ManagedValue::Int(14)]).unwrap(),
        Some(ManagedValue::Int(42))
    );
}

#[test]
fn test_duplicate_module_keeps_first_types() {
    let registry = TypeRegistry::new();
    assert_eq!(
        registry.load_module(TypeModule::new("Demo", "1.0.0").with_type::<Counter>()),
        ModuleLoadStatus::Success
    );
    assert_eq!(
        registry.load_module(TypeModule::new("Demo", "1.0.0").with_type::<Buffer>()),
        ModuleLoadStatus::AlreadyLoaded
    );

    let bridge = Bridge::new(Arc::new(registry));
    assert!(bridge.create_object("Demo.Buffer", &[], HandleMode::Owning).unwrap().is_none());

    let modules = &bridge.diagnose()[0].modules;
    assert_eq!(modules[0].types, vec!["Demo.Counter".to_string()]);
    assert_eq!(modules[1].status, ModuleLoadStatus::AlreadyLoaded);
}
