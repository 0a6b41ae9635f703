//! Boundary export tests
//!
//! Drives the C API exactly as a native host would: requests built in
//! native layout, raw handles, and an `extern "C"` exception callback.
//! The callback is process-global, so tests take `SERIAL` first.

use std::ffi::c_void;
use std::ptr;
use std::sync::{Arc, Once};

use parking_lot::{const_mutex, Mutex};
use tether_core::{
    ArgumentPack, Bridge, BridgeOptions, Fault, HandleMode, InteropString, ManagedValue,
    ObjectCreateInfo, ObjectHandle, TypeModule, TypeRegistry, TypeTag,
};
use tether_ffi::{
    tether_create_object, tether_destroy_object, tether_initialize, tether_invoke_method,
    tether_set_exception_callback,
};
use tether_native::reflect;

static SERIAL: Mutex<()> = const_mutex(());
static RECEIVED: Mutex<Vec<String>> = const_mutex(Vec::new());
static SETUP: Once = Once::new();

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
    pub fn starting_at(start: i32) -> Self {
        Counter { count: i64::from(start) }
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    pub fn add(&mut self, amount: i16, twice: bool) {
        let amount = i64::from(amount);
        self.count += if twice { amount * 2 } else { amount };
    }

    #[rename("Add")]
    pub fn add_one(&mut self) {
        self.count += 1;
    }

    pub fn get(&self) -> i64 {
        self.count
    }

    pub fn explode(&mut self) {
        panic!("counter exploded");
    }
}

pub struct Account {
    balance: f64,
}

#[reflect(name = "Demo.Account")]
impl Account {
    #[constructor]
    pub fn open(balance: f64) -> Self {
        Account { balance }
    }

    pub fn withdraw(&mut self, amount: f64) -> Result<(), Fault> {
        if amount > self.balance {
            return Err(Fault::new("insufficient funds"));
        }
        self.balance -= amount;
        Ok(())
    }
}

extern "C" fn record(message: InteropString) {
    let text = unsafe { message.to_string() }.unwrap_or_default();
    RECEIVED.lock().push(text);
}

fn setup() -> parking_lot::MutexGuard<'static, ()> {
    SETUP.call_once(|| {
        let registry = TypeRegistry::new();
        registry.load_module(
            TypeModule::new("Demo", "1.0.0")
                .with_type::<Counter>()
                .with_type::<Account>(),
        );
        let bridge = Bridge::with_options(
            BridgeOptions {
                gc_threshold: 0,
                ..BridgeOptions::default()
            },
            Arc::new(registry),
        );
        assert!(tether_ffi::install(bridge).is_ok(), "bridge installed twice");
    });

    let guard = SERIAL.lock();
    RECEIVED.lock().clear();
    tether_set_exception_callback(Some(record));
    guard
}

fn received() -> Vec<String> {
    RECEIVED.lock().clone()
}

fn create(type_name: &str, mode: HandleMode, args: &ArgumentPack) -> usize {
    let name = InteropString::from_str(type_name);
    let info = ObjectCreateInfo::new(&name, mode, args);
    let handle = unsafe { tether_create_object(&info) };
    unsafe { name.free() };
    handle
}

fn invoke(handle: usize, method: &str, args: &ArgumentPack) {
    let name = InteropString::from_str(method);
    unsafe { tether_invoke_method(handle, name, args.tags(), args.values(), args.count()) };
    unsafe { name.free() };
}

fn count_of(handle: usize) -> i64 {
    let handle = ObjectHandle::from_raw(handle).unwrap();
    match tether_ffi::bridge().invoke_method(handle, "Get", &[]).unwrap() {
        Some(ManagedValue::Long(v)) => v,
        other => panic!("unexpected return: {other:?}"),
    }
}

#[test]
fn test_create_resolve_destroy() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());
    assert_ne!(handle, 0);

    let bridge = tether_ffi::bridge();
    let token = ObjectHandle::from_raw(handle).unwrap();
    assert!(bridge.resolve(token).is_ok());

    tether_destroy_object(handle);
    assert!(bridge.resolve(token).is_err());
    assert!(received().is_empty());
}

#[test]
fn test_increment_changes_state() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());

    invoke(handle, "Increment", &ArgumentPack::new());
    assert_eq!(count_of(handle), 1);

    let mut args = ArgumentPack::new();
    args.push(ManagedValue::Short(5)).push(ManagedValue::Bool(true));
    invoke(handle, "Add", &args);
    assert_eq!(count_of(handle), 11);

    assert!(received().is_empty());
    tether_destroy_object(handle);
}

#[test]
fn test_constructor_arguments_from_raw_buffers() {
    let _guard = setup();

    // Hand-built native buffers, as a C caller would lay them out
    let start: i32 = 41;
    let values: [*const c_void; 1] = [&start as *const i32 as *const c_void];
    let tags: [i32; 1] = [TypeTag::Int as i32];
    let name = InteropString::from_str("Demo.Counter");
    let info = ObjectCreateInfo {
        type_name: name,
        is_weak_ref: false,
        parameters: values.as_ptr(),
        parameter_types: tags.as_ptr(),
        length: 1,
    };

    let handle = unsafe { tether_create_object(&info) };
    unsafe { name.free() };
    assert_ne!(handle, 0);

    invoke(handle, "Increment", &ArgumentPack::new());
    assert_eq!(count_of(handle), 42);
    tether_destroy_object(handle);
}

#[test]
fn test_unknown_type_is_silent() {
    let _guard = setup();
    let handle = create("Demo.DoesNotExist", HandleMode::Owning, &ArgumentPack::new());
    assert_eq!(handle, 0);
    assert!(received().is_empty());
}

#[test]
fn test_missing_parameterless_constructor_reported() {
    let _guard = setup();
    let handle = create("Demo.Account", HandleMode::Owning, &ArgumentPack::new());
    assert_eq!(handle, 0);

    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("No constructor on 'Demo.Account' accepts 0 argument(s)"));
}

#[test]
fn test_nonexistent_method_delivers_exactly_one_message() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());

    invoke(handle, "Decrement", &ArgumentPack::new());

    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Method 'Decrement' with 0 parameter(s) not found on 'Demo.Counter'"));
    tether_destroy_object(handle);
}

#[test]
fn test_destroy_twice_reports_once() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());

    tether_destroy_object(handle);
    assert!(received().is_empty());

    tether_destroy_object(handle);
    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Invalid object handle"));
}

#[test]
fn test_invoke_on_destroyed_handle_reported() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());
    tether_destroy_object(handle);

    invoke(handle, "Increment", &ArgumentPack::new());
    invoke(0, "Increment", &ArgumentPack::new());

    let messages = received();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.contains("Invalid object handle")));
}

#[test]
fn test_method_fault_carries_cause() {
    let _guard = setup();
    let mut args = ArgumentPack::new();
    args.push(ManagedValue::Double(10.0));
    let handle = create("Demo.Account", HandleMode::Owning, &args);
    assert_ne!(handle, 0);

    let mut amount = ArgumentPack::new();
    amount.push(ManagedValue::Int(50));
    invoke(handle, "Withdraw", &amount);

    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Demo.Account.Withdraw(double)"));
    assert!(messages[0].contains("Caused by:"));
    assert!(messages[0].contains("insufficient funds"));
    tether_destroy_object(handle);
}

#[test]
fn test_panic_in_method_reported_and_object_usable() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());

    invoke(handle, "Explode", &ArgumentPack::new());
    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("counter exploded"));

    invoke(handle, "Increment", &ArgumentPack::new());
    assert_eq!(count_of(handle), 1);
    tether_destroy_object(handle);
}

#[test]
fn test_unknown_tag_reported() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());

    let mut args = ArgumentPack::new();
    args.push_raw(99, ptr::null());
    invoke(handle, "Increment", &args);

    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Unknown argument type tag 99 at position 0"));
    tether_destroy_object(handle);
}

#[test]
fn test_null_buffers_with_count_do_not_fall_back_to_other_overload() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Owning, &ArgumentPack::new());

    let name = InteropString::from_str("Add");
    unsafe { tether_invoke_method(handle, name, ptr::null(), ptr::null(), 2) };
    unsafe { name.free() };

    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Null argument buffers for 2 argument(s)"));
    assert_eq!(count_of(handle), 0);

    // The parameterless overload is still reachable with a zero count
    invoke(handle, "Add", &ArgumentPack::new());
    assert_eq!(count_of(handle), 1);
    tether_destroy_object(handle);
}

#[test]
fn test_create_with_null_buffers_uses_default_constructor() {
    let _guard = setup();
    let name = InteropString::from_str("Demo.Counter");
    let info = ObjectCreateInfo {
        type_name: name,
        is_weak_ref: false,
        parameters: ptr::null(),
        parameter_types: ptr::null(),
        length: 1,
    };

    let handle = unsafe { tether_create_object(&info) };
    unsafe { name.free() };
    assert_ne!(handle, 0);
    assert_eq!(count_of(handle), 0);
    assert!(received().is_empty());
    tether_destroy_object(handle);
}

#[test]
fn test_malformed_token_reported_as_invalid_handle() {
    let _guard = setup();
    let raw = 1usize << (usize::BITS / 2);

    invoke(raw, "Increment", &ArgumentPack::new());
    tether_destroy_object(raw);

    let messages = received();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.contains("Invalid object handle")));
    assert!(messages.iter().all(|m| !m.contains("Panic")));
}

#[test]
fn test_weak_handle_stale_after_collection() {
    let _guard = setup();
    let handle = create("Demo.Counter", HandleMode::Weak, &ArgumentPack::new());
    assert_ne!(handle, 0);

    tether_ffi::bridge().collect_garbage();
    invoke(handle, "Increment", &ArgumentPack::new());

    let messages = received();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("has been collected"));
    tether_destroy_object(handle);
}

#[test]
fn test_without_callback_faults_are_dropped() {
    let _guard = setup();
    tether_set_exception_callback(None);

    invoke(0, "Increment", &ArgumentPack::new());
    assert!(received().is_empty());
}

#[test]
fn test_initialize_lists_contexts() {
    let _guard = setup();
    tether_initialize();
    let contexts = tether_ffi::bridge().diagnose();
    assert_eq!(contexts[0].module_names(), vec!["Demo, Version=1.0.0"]);
    assert_eq!(
        contexts[0].modules[0].types,
        vec!["Demo.Counter".to_string(), "Demo.Account".to_string()]
    );
    assert!(received().is_empty());
}
